//! Memory mapped files.
//!
//! A [`Mapper`] turns a borrowed file handle (or nothing, for anonymous
//! memory) into [`Mapping`]s: live, contiguous byte regions with explicit
//! flush, lock and unmap lifecycles. [`read_chunks`] walks files too large
//! for a single mapping.



pub mod mapper;
pub mod mapping;
pub mod reader;
mod os;

pub use mapper::*;
pub use mapping::*;
pub use reader::*;

pub use os::page_size;



pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backing file could not be inspected.
    #[error("mmap {size} at {offset}: {source}")]
    Stat { size: i64, offset: i64, source: std::io::Error },

    /// Only regular files can be mapped.
    #[error("mmap {size} at {offset}: not a regular file")]
    NotRegular { size: i64, offset: i64 },

    #[error("mmap {size} at {offset}: empty file")]
    EmptyFile { size: i64, offset: i64 },

    /// The request resolved to a length of zero.
    #[error("mmap {size} at {offset}: nothing to map")]
    ZeroSize { size: i64, offset: i64 },

    #[error("mmap {size} at {offset}: out of bounds")]
    OutOfBounds { size: i64, offset: i64, file_size: u64 },

    /// The request exceeds this build's single-mapping ceiling.
    #[error("mmap {size} at {offset}: too large (limit {max})")]
    TooLarge { size: i64, offset: i64, max: u64 },

    /// Attempted to write through a mapping created without [`Prot::WRITE`].
    #[error("mapping is not writable")]
    NotWritable,

    /// The mapping primitive itself failed.
    #[error("mmap {size} at {offset}: {source}")]
    Map { size: u64, offset: i64, source: std::io::Error },

    /// An operation on a live mapped region failed.
    #[error("{op} {len} bytes at {addr:#x}: {source}")]
    Region { op: &'static str, len: usize, addr: usize, source: std::io::Error },

    /// Forcing the backing file's buffers to stable storage failed.
    #[error("{op}: {source}")]
    FileSync { op: &'static str, source: std::io::Error },

    /// A chunk consumer failed; `processed` bytes were fully consumed first.
    #[error("read chunks: consumer failed after {processed} bytes: {source}")]
    Consumer { processed: u64, source: Box<dyn std::error::Error + Send + Sync> },
}
