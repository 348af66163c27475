//! Live mappings.



use std::fs::File;

use crate::{os, Error, Prot, Result};



/// One live memory mapping.
///
/// Byte views borrow from the mapping, so they cannot outlive it, and
/// [`Mapping::unmap`] consumes it, so a released mapping cannot be touched
/// again. Dropping a mapping releases it too, quietly; call `unmap` when
/// the outcome matters.
#[derive(Debug)]
pub struct Mapping<'f> {
    raw: os::RawMapping,
    file: Option<&'f File>,
    writable: bool,
    released: bool,
}

// The raw address is only reachable through `&self`/`&mut self` borrows,
// and the pages themselves have no thread affinity.
unsafe impl Send for Mapping<'_> {}
unsafe impl Sync for Mapping<'_> {}

impl<'f> Mapping<'f> {
    pub(crate) fn new(raw: os::RawMapping, file: Option<&'f File>, prot: Prot) -> Self {
        Self {
            raw,
            file,
            writable: prot.contains(Prot::WRITE),
            released: false,
        }
    }

    /// The mapped bytes.
    pub fn bytes(&self) -> &[u8] {
        // Live for at least the borrow of `self`.
        unsafe { self.raw.slice() }
    }

    /// The mapped bytes, writable.
    ///
    /// Refused for mappings created without [`Prot::WRITE`]; a mutable view
    /// of read-protected pages would fault on first use.
    pub fn bytes_mut(&mut self) -> Result<&mut [u8]> {
        if !self.writable {
            return Err(Error::NotWritable);
        }
        Ok(unsafe { self.raw.slice_mut() })
    }

    /// Length of the mapped region in bytes.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    /// Starting address of the mapped region.
    pub fn addr(&self) -> usize {
        self.raw.addr()
    }

    /// Whether the mapping was created with write access.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Flush dirty pages to the backing medium.
    ///
    /// File-backed writable mappings sync in two steps: the pages
    /// themselves, then the file's own buffers, so the data has reached
    /// stable storage when this returns. Anonymous mappings only sync
    /// against the paging mechanism.
    pub fn flush(&self) -> Result<()> {
        self.raw.sync()?;

        if self.writable {
            if let Some(file) = self.file {
                os::sync_file(file)?;
            }
        }
        Ok(())
    }

    /// Lock the mapped pages into memory, preventing page-out.
    pub fn lock(&self) -> Result<()> {
        self.raw.lock()
    }

    /// Allow the mapped pages to be paged out again.
    pub fn unlock(&self) -> Result<()> {
        self.raw.unlock()
    }

    /// Release the mapping.
    ///
    /// Where the OS does not write dirty pages back on release, the mapping
    /// is flushed first; if that flush fails, the returned [`UnmapError`]
    /// hands the still-live mapping back so the caller can retry.
    pub fn unmap(mut self) -> std::result::Result<(), UnmapError<'f>> {
        if !os::RELEASE_WRITES_BACK {
            if let Err(source) = self.flush() {
                return Err(UnmapError { mapping: Some(self), source });
            }
        }

        // One release attempt, ever: even a failed one leaves the OS state
        // unknown, so the drop guard must not try again.
        self.released = true;
        log::trace!("unmapped {} bytes at {:#x}", self.raw.len(), self.raw.addr());
        match unsafe { self.raw.release() } {
            Ok(()) => Ok(()),
            Err(source) => Err(UnmapError { mapping: None, source }),
        }
    }
}

impl Drop for Mapping<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = unsafe { self.raw.release() } {
            log::debug!("failed to release dropped mapping: {e}");
        }
    }
}

impl std::ops::Deref for Mapping<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes()
    }
}

impl AsRef<[u8]> for Mapping<'_> {
    fn as_ref(&self) -> &[u8] {
        self.bytes()
    }
}


/// Failure from [`Mapping::unmap`].
#[derive(Debug)]
pub struct UnmapError<'f> {
    mapping: Option<Mapping<'f>>,
    source: Error,
}

impl<'f> UnmapError<'f> {
    /// The mapping, if it survived.
    ///
    /// A pre-release flush failure leaves it live so the release can be
    /// retried; a failure of the release itself does not.
    pub fn into_mapping(self) -> Option<Mapping<'f>> {
        self.mapping
    }
}

impl std::fmt::Display for UnmapError<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unmap: {}", self.source)
    }
}

impl std::error::Error for UnmapError<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl From<UnmapError<'_>> for Error {
    fn from(e: UnmapError<'_>) -> Self {
        e.source
    }
}
