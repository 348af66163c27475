//! Platform selection.
//!
//! Each target family implements the same surface: `map`, `map_anon`,
//! `sync_file` and `page_size`, a `RawMapping` with address/length/slice
//! accessors plus lock/unlock/sync/release, and the `RELEASE_WRITES_BACK`
//! constant. The variant is chosen here at build time.



#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::*;

#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use windows::*;
