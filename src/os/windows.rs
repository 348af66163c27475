//! Windows implementation.



use std::{ffi::c_void, fs::File, os::windows::io::AsRawHandle, ptr};

use windows_sys::Win32::{
    Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE},
    Storage::FileSystem::FlushFileBuffers,
    System::{
        Memory::{
            CreateFileMappingW, FlushViewOfFile, MapViewOfFile, UnmapViewOfFile, VirtualLock,
            VirtualUnlock, FILE_MAP_COPY, FILE_MAP_EXECUTE, FILE_MAP_READ, FILE_MAP_WRITE,
            MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READONLY, PAGE_READWRITE, PAGE_WRITECOPY,
            SEC_LARGE_PAGES, SEC_RESERVE,
        },
        SystemInformation::{GetSystemInfo, SYSTEM_INFO},
    },
};

use crate::{Error, Flag, Prot, Result};



/// `UnmapViewOfFile` does not write dirty pages back, so release has to be
/// preceded by a flush.
pub const RELEASE_WRITES_BACK: bool = false;



/// A raw memory mapping: one mapped view plus the section object behind it.
#[derive(Debug)]
pub struct RawMapping {
    ptr: *mut c_void,
    len: usize,
    mapping: HANDLE,
}

pub fn map(file: &File, size: u64, offset: i64, prot: Prot, flags: Flag) -> Result<RawMapping> {
    let (page, access) = convert(prot, flags);
    do_map(file.as_raw_handle() as HANDLE, size, offset, page, access)
}

pub fn map_anon(size: u64, prot: Prot, flags: Flag) -> Result<RawMapping> {
    let (mut page, access) = convert(prot, flags);

    // These section flags only apply to anonymous mappings; large pages in
    // particular are never available for file-backed ones here.
    page |= SEC_RESERVE;
    if flags.contains(Flag::LARGE_PAGES) {
        page |= SEC_LARGE_PAGES;
    }

    do_map(INVALID_HANDLE_VALUE, size, 0, page, access)
}

fn do_map(fd: HANDLE, size: u64, offset: i64, page: u32, access: u32) -> Result<RawMapping> {
    // The section has to span the requested window; high/low halves of the
    // 64-bit values go in separately.
    let max = size + offset as u64;

    let mapping = unsafe {
        CreateFileMappingW(fd, ptr::null(), page, (max >> 32) as u32, max as u32, ptr::null())
    };
    if mapping.is_null() {
        return Err(Error::Map {
            size,
            offset,
            source: std::io::Error::last_os_error(),
        });
    }

    let off = offset as u64;
    let view = unsafe { MapViewOfFile(mapping, access, (off >> 32) as u32, off as u32, size as usize) };
    if view.Value.is_null() {
        let source = std::io::Error::last_os_error();
        unsafe { CloseHandle(mapping) };
        return Err(Error::Map { size, offset, source });
    }

    Ok(RawMapping {
        ptr: view.Value,
        len: size as usize,
        mapping,
    })
}

/// Step two of a flush for writable file mappings: force the file's own
/// buffers down to stable storage.
pub fn sync_file(file: &File) -> Result<()> {
    if unsafe { FlushFileBuffers(file.as_raw_handle() as HANDLE) } == 0 {
        return Err(Error::FileSync {
            op: "FlushFileBuffers",
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// The system page size in bytes.
pub fn page_size() -> usize {
    let mut info: SYSTEM_INFO = unsafe { std::mem::zeroed() };
    unsafe { GetSystemInfo(&mut info) };
    info.dwPageSize as usize
}

impl RawMapping {
    pub fn addr(&self) -> usize {
        self.ptr as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// # Safety
    /// The mapping must still be live for the returned borrow.
    pub unsafe fn slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr as *const u8, self.len) }
    }

    /// # Safety
    /// The mapping must still be live and mapped with write access.
    pub unsafe fn slice_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr as *mut u8, self.len) }
    }

    pub fn lock(&self) -> Result<()> {
        if unsafe { VirtualLock(self.ptr, self.len) } == 0 {
            return Err(self.region_err("VirtualLock"));
        }
        Ok(())
    }

    pub fn unlock(&self) -> Result<()> {
        if unsafe { VirtualUnlock(self.ptr, self.len) } == 0 {
            return Err(self.region_err("VirtualUnlock"));
        }
        Ok(())
    }

    /// Sync the mapped pages themselves (step one of a flush).
    pub fn sync(&self) -> Result<()> {
        if unsafe { FlushViewOfFile(self.ptr, self.len) } == 0 {
            return Err(self.region_err("FlushViewOfFile"));
        }
        Ok(())
    }

    /// Release the view and the section object behind it.
    ///
    /// # Safety
    /// Must be called at most once, with no views into the region alive.
    /// Dirty pages are lost unless flushed first.
    pub unsafe fn release(&mut self) -> Result<()> {
        if unsafe { UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS { Value: self.ptr }) } == 0 {
            return Err(self.region_err("UnmapViewOfFile"));
        }
        if unsafe { CloseHandle(self.mapping) } == 0 {
            return Err(self.region_err("CloseHandle"));
        }
        Ok(())
    }

    fn region_err(&self, op: &'static str) -> Error {
        Error::Region {
            op,
            len: self.len,
            addr: self.ptr as usize,
            source: std::io::Error::last_os_error(),
        }
    }
}

/// Convert canonical protection/flags to what the mapping calls want.
///
/// `CreateFileMappingW` takes a page-protection value while `MapViewOfFile`
/// takes an access bitfield. The `PAGE_EXECUTE_*` values mirror the
/// non-exec ones shifted left by four bits, which is how exec protection is
/// applied. There is no readahead hint to translate to.
fn convert(prot: Prot, flags: Flag) -> (u32, u32) {
    let mut page = PAGE_READONLY;
    let mut access = FILE_MAP_READ;

    if prot.contains(Prot::WRITE) {
        if flags.contains(Flag::COW) {
            page = PAGE_WRITECOPY;
            access |= FILE_MAP_COPY;
        } else {
            page = PAGE_READWRITE;
            access |= FILE_MAP_WRITE;
        }
    }
    if prot.contains(Prot::EXEC) {
        access |= FILE_MAP_EXECUTE;
        page <<= 4;
    }

    (page, access)
}



#[cfg(test)]
mod tests {
    use windows_sys::Win32::System::Memory::{
        PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY,
    };

    use super::*;

    #[test]
    fn convert_defaults_to_readonly() {
        let (page, access) = convert(Prot::READ, Flag::empty());
        assert_eq!(page, PAGE_READONLY);
        assert_eq!(access, FILE_MAP_READ);
    }

    #[test]
    fn convert_write_and_cow() {
        let (page, access) = convert(Prot::READ | Prot::WRITE, Flag::empty());
        assert_eq!(page, PAGE_READWRITE);
        assert_eq!(access, FILE_MAP_READ | FILE_MAP_WRITE);

        let (page, access) = convert(Prot::READ | Prot::WRITE, Flag::COW);
        assert_eq!(page, PAGE_WRITECOPY);
        assert_eq!(access, FILE_MAP_READ | FILE_MAP_COPY);
    }

    #[test]
    fn convert_exec_mirrors_shifted_pages() {
        assert_eq!(convert(Prot::READ | Prot::EXEC, Flag::empty()).0, PAGE_EXECUTE_READ);
        assert_eq!(
            convert(Prot::READ | Prot::WRITE | Prot::EXEC, Flag::empty()).0,
            PAGE_EXECUTE_READWRITE,
        );
        assert_eq!(
            convert(Prot::READ | Prot::WRITE | Prot::EXEC, Flag::COW).0,
            PAGE_EXECUTE_WRITECOPY,
        );
    }
}
