//! Unix implementation.



use std::{ffi::c_void, fs::File, num::NonZeroUsize, os::fd::AsRawFd, ptr::NonNull};

use nix::sys::mman::{
    mlock, mmap, mmap_anonymous, msync, munlock, munmap, MapFlags, MsFlags, ProtFlags,
};

use crate::{Error, Flag, Prot, Result};



// Hint flags that only exist on some unixes are the empty set elsewhere, so
// requesting them stays a no-op instead of becoming an error.
#[cfg(any(target_os="linux", target_os="android"))]
const MAP_LARGE_PAGES: MapFlags = MapFlags::MAP_HUGETLB;
#[cfg(not(any(target_os="linux", target_os="android")))]
const MAP_LARGE_PAGES: MapFlags = MapFlags::empty();

#[cfg(any(target_os="linux", target_os="android"))]
const MAP_READAHEAD: MapFlags = MapFlags::MAP_POPULATE;
#[cfg(not(any(target_os="linux", target_os="android")))]
const MAP_READAHEAD: MapFlags = MapFlags::empty();

/// `munmap` carries dirty pages to the backing file on its own, so release
/// needs no flush beforehand.
pub const RELEASE_WRITES_BACK: bool = true;



/// A raw memory mapping: one address range returned by `mmap`.
#[derive(Debug)]
pub struct RawMapping {
    addr: NonNull<c_void>,
    len: usize,
}

pub fn map(file: &File, size: u64, offset: i64, prot: Prot, flags: Flag) -> Result<RawMapping> {
    let (mprot, mflag) = convert(prot, flags);
    let len = nonzero(size, offset)?;

    let addr = unsafe { mmap(None, len, mprot, mflag, file, offset as libc::off_t) }
        .map_err(|errno| Error::Map { size, offset, source: errno.into() })?;

    Ok(RawMapping { addr, len: len.get() })
}

pub fn map_anon(size: u64, prot: Prot, flags: Flag) -> Result<RawMapping> {
    let (mprot, mflag) = convert(prot, flags);
    let len = nonzero(size, 0)?;

    // `mmap_anonymous` adds MAP_ANONYMOUS itself.
    let addr = unsafe { mmap_anonymous(None, len, mprot, mflag) }
        .map_err(|errno| Error::Map { size, offset: 0, source: errno.into() })?;

    Ok(RawMapping { addr, len: len.get() })
}

/// Step two of a flush for writable file mappings: force the file's own
/// buffers down to stable storage.
pub fn sync_file(file: &File) -> Result<()> {
    if unsafe { libc::fsync(file.as_raw_fd()) } != 0 {
        return Err(Error::FileSync {
            op: "fsync",
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// The system page size in bytes.
pub fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

impl RawMapping {
    pub fn addr(&self) -> usize {
        self.addr.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// # Safety
    /// The mapping must still be live for the returned borrow.
    pub unsafe fn slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.addr.as_ptr() as *const u8, self.len) }
    }

    /// # Safety
    /// The mapping must still be live and mapped with write protection.
    pub unsafe fn slice_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.addr.as_ptr() as *mut u8, self.len) }
    }

    pub fn lock(&self) -> Result<()> {
        unsafe { mlock(self.addr, self.len) }.map_err(|errno| self.region_err("mlock", errno))
    }

    pub fn unlock(&self) -> Result<()> {
        unsafe { munlock(self.addr, self.len) }.map_err(|errno| self.region_err("munlock", errno))
    }

    /// Sync the mapped pages themselves (step one of a flush).
    pub fn sync(&self) -> Result<()> {
        unsafe { msync(self.addr, self.len, MsFlags::MS_SYNC) }
            .map_err(|errno| self.region_err("msync", errno))
    }

    /// Release the mapping.
    ///
    /// # Safety
    /// Must be called at most once, with no views into the region alive.
    pub unsafe fn release(&mut self) -> Result<()> {
        unsafe { munmap(self.addr, self.len) }.map_err(|errno| self.region_err("munmap", errno))
    }

    fn region_err(&self, op: &'static str, errno: nix::errno::Errno) -> Error {
        Error::Region {
            op,
            len: self.len,
            addr: self.addr(),
            source: errno.into(),
        }
    }
}

fn nonzero(size: u64, offset: i64) -> Result<NonZeroUsize> {
    NonZeroUsize::new(size as usize).ok_or(Error::ZeroSize {
        size: size as i64,
        offset,
    })
}

/// Convert canonical protection/flags to what `mmap` wants.
///
/// Read access and shared writeback are the baseline; COW together with
/// write access switches the mapping to private.
fn convert(prot: Prot, flags: Flag) -> (ProtFlags, MapFlags) {
    let mut mprot = ProtFlags::PROT_READ;
    let mut mflag = MapFlags::MAP_SHARED;

    if prot.contains(Prot::WRITE) {
        mprot |= ProtFlags::PROT_WRITE;

        // A private mapping only means something when writes can happen.
        if flags.contains(Flag::COW) {
            mflag = MapFlags::MAP_PRIVATE;
        }
    }
    if prot.contains(Prot::EXEC) {
        mprot |= ProtFlags::PROT_EXEC;
    }

    if flags.contains(Flag::LARGE_PAGES) {
        mflag |= MAP_LARGE_PAGES;
    }
    if flags.contains(Flag::READAHEAD) {
        mflag |= MAP_READAHEAD;
    }

    (mprot, mflag)
}



#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_defaults_to_shared_reads() {
        let (mprot, mflag) = convert(Prot::READ, Flag::empty());
        assert_eq!(mprot, ProtFlags::PROT_READ);
        assert_eq!(mflag, MapFlags::MAP_SHARED);
    }

    #[test]
    fn convert_write_stays_shared() {
        let (mprot, mflag) = convert(Prot::READ | Prot::WRITE, Flag::empty());
        assert!(mprot.contains(ProtFlags::PROT_WRITE));
        assert!(mflag.contains(MapFlags::MAP_SHARED));
        assert!(!mflag.contains(MapFlags::MAP_PRIVATE));
    }

    #[test]
    fn convert_cow_goes_private() {
        let (mprot, mflag) = convert(Prot::READ | Prot::WRITE, Flag::COW);
        assert!(mprot.contains(ProtFlags::PROT_WRITE));
        assert!(mflag.contains(MapFlags::MAP_PRIVATE));
        assert!(!mflag.contains(MapFlags::MAP_SHARED));
    }

    #[test]
    fn convert_cow_needs_write() {
        let (_, mflag) = convert(Prot::READ, Flag::COW);
        assert!(mflag.contains(MapFlags::MAP_SHARED));
        assert!(!mflag.contains(MapFlags::MAP_PRIVATE));
    }

    #[test]
    fn convert_exec_is_additive() {
        let (mprot, _) = convert(Prot::READ | Prot::WRITE | Prot::EXEC, Flag::empty());
        assert!(mprot.contains(ProtFlags::PROT_READ | ProtFlags::PROT_WRITE | ProtFlags::PROT_EXEC));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn convert_readahead_populates() {
        let (_, mflag) = convert(Prot::READ, Flag::READAHEAD);
        assert!(mflag.contains(MapFlags::MAP_POPULATE));
    }
}
