//! Mapping requests.



use std::fs::File;

use bitflags::bitflags;

use crate::{os, Error, Mapping, Result};



/// The largest single mapping this build will attempt, in bytes.
///
/// Wide-pointer targets get a far higher ceiling than 32-bit and wasm-class
/// ones. Files beyond the ceiling go through [`crate::read_chunks`].
#[cfg(target_pointer_width = "64")]
pub const MAX_MAP_SIZE: u64 = 1024 * 1024 * 1048576;
#[cfg(not(target_pointer_width = "64"))]
pub const MAX_MAP_SIZE: u64 = 1024 * 1048576;


bitflags! {
    /// Protection bits for a mapping. Read access is always implied.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Prot: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }

    /// Behavior hints for a mapping.
    ///
    /// All of these are advisory except [`Flag::COW`], which keeps writes
    /// out of the backing file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flag: u32 {
        /// Writes stay private to this mapping and are never written back.
        const COW = 1 << 0;
        /// Ask for huge/large page backing where the OS supports it.
        const LARGE_PAGES = 1 << 1;
        /// Hint that the mapping will be read sequentially.
        const READAHEAD = 1 << 2;
    }
}


/// Creates mappings over one backing file, or over anonymous memory.
///
/// The file handle stays borrowed from the caller; the mapper never opens
/// or closes anything itself.
pub struct Mapper<'f> {
    file: Option<&'f File>,
}

impl<'f> Mapper<'f> {
    /// A mapper bound to the given file.
    pub fn new(file: &'f File) -> Self {
        Self { file: Some(file) }
    }

    /// A mapper for anonymous (zero-filled, file-less) mappings.
    pub fn anon() -> Mapper<'static> {
        Mapper { file: None }
    }

    /// Map `size` bytes at `offset`.
    ///
    /// A `size` of zero or less maps the whole remaining file from
    /// `offset`. Anonymous mappings take their size at face value and must
    /// use offset zero. Every check runs before the OS is asked for
    /// anything, so a failed call never leaves a mapping behind.
    pub fn map(&self, size: i64, offset: i64, prot: Prot, flags: Flag) -> Result<Mapping<'f>> {
        let file = match self.file {
            Some(file) => file,
            None => return self.map_anon(size, offset, prot, flags),
        };

        let meta = file
            .metadata()
            .map_err(|source| Error::Stat { size, offset, source })?;
        if !meta.file_type().is_file() {
            return Err(Error::NotRegular { size, offset });
        }

        let file_size = meta.len();
        if file_size == 0 {
            return Err(Error::EmptyFile { size, offset });
        }
        if offset < 0 {
            return Err(Error::OutOfBounds { size, offset, file_size });
        }

        let resolved = if size <= 0 {
            // Everything from `offset` to the end of the file.
            (file_size as i64).saturating_sub(offset)
        } else {
            size
        };
        if resolved <= 0 {
            return Err(Error::ZeroSize { size, offset });
        }

        let end = match resolved.checked_add(offset) {
            Some(end) => end as u64,
            // Overflowing i64 is as out of bounds as it gets.
            None => return Err(Error::OutOfBounds { size, offset, file_size }),
        };
        if resolved as u64 > file_size || end > file_size {
            return Err(Error::OutOfBounds { size, offset, file_size });
        }
        if resolved as u64 > MAX_MAP_SIZE {
            return Err(Error::TooLarge { size, offset, max: MAX_MAP_SIZE });
        }

        let raw = os::map(file, resolved as u64, offset, prot, flags)?;
        log::trace!("mapped {} bytes at {} (addr {:#x})", resolved, offset, raw.addr());

        Ok(Mapping::new(raw, Some(file), prot))
    }

    fn map_anon(&self, size: i64, offset: i64, prot: Prot, flags: Flag) -> Result<Mapping<'f>> {
        if size <= 0 {
            return Err(Error::ZeroSize { size, offset });
        }
        if offset != 0 {
            // There is no backing object for an offset to index into.
            return Err(Error::OutOfBounds { size, offset, file_size: 0 });
        }
        if size as u64 > MAX_MAP_SIZE {
            return Err(Error::TooLarge { size, offset, max: MAX_MAP_SIZE });
        }

        let raw = os::map_anon(size as u64, prot, flags)?;
        log::trace!("mapped {} anonymous bytes (addr {:#x})", size, raw.addr());

        Ok(Mapping::new(raw, None, prot))
    }
}
