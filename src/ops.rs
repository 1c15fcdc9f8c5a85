// Reparse point operations
// Stateless, synchronous calls. Each one acquires at most one handle and
// one transmission buffer, both released before it returns, on every path.

use std::path::Path;

use crate::buffer::{ReparseGuid, ReparseGuidDataBuffer, MAXIMUM_REPARSE_PAYLOAD_SIZE};
use crate::error::{ReparseError, ReparseResult};

/// Check if `path` currently carries the reparse point attribute.
///
/// Pure attribute lookup; no handle is opened and no device I/O occurs.
/// A path whose attributes cannot be read at all (missing, access denied)
/// also reports `false`; use [`query_reparse_point`] when the distinction
/// matters.
pub fn reparse_point_exists(path: &Path) -> bool {
    imp::reparse_point_exists(path)
}

/// Read the full reparse buffer attached to `path`: tag, guid, and the raw
/// tag-specific payload bytes.
///
/// The path is opened read-only without traversing the reparse point itself,
/// with backup semantics when it is a directory.
pub fn query_reparse_point(path: &Path) -> ReparseResult<ReparseGuidDataBuffer> {
    imp::query_reparse_point(path)
}

/// Reparse tag of `path`.
pub fn get_reparse_tag(path: &Path) -> ReparseResult<u32> {
    Ok(query_reparse_point(path)?.tag)
}

/// Reparse guid of `path`.
///
/// Microsoft-defined reparse points carry no guid; the value returned for
/// them is whatever the driver left in the buffer and must not be relied on.
pub fn get_reparse_guid(path: &Path) -> ReparseResult<ReparseGuid> {
    Ok(query_reparse_point(path)?.guid)
}

/// Delete the reparse point attached to `path`.
///
/// Tries a header-only delete request first (accepted for system-class
/// tags), then retries once with the guid populated for drivers that
/// require it echoed back. The attempt order matters and is fixed.
pub fn delete_reparse_point(path: &Path) -> ReparseResult<()> {
    if !reparse_point_exists(path) {
        return Err(ReparseError::NotAReparsePoint);
    }

    // Deleting a reparse point blind is unsafe: both identifiers must be
    // determinable before any delete request is issued.
    let guid = get_reparse_guid(path)?;
    let tag = get_reparse_tag(path)?;

    imp::delete_with_fallback(path, tag, guid)
}

/// Attach a reparse point to an existing file or directory, replacing any
/// prior reparse content wholesale.
///
/// The underlying filesystem entry is never created here; a plain directory
/// being converted into a reparse point must already exist, which is why the
/// open uses existing-only semantics.
pub fn create_reparse_point(
    path: &Path,
    payload: &[u8],
    guid: ReparseGuid,
    tag: u32,
) -> ReparseResult<()> {
    if payload.is_empty() {
        return Err(ReparseError::InvalidArgument(
            "empty reparse payload".to_string(),
        ));
    }
    if payload.len() > MAXIMUM_REPARSE_PAYLOAD_SIZE {
        return Err(ReparseError::InvalidArgument(format!(
            "reparse payload of {} bytes exceeds the {} byte maximum",
            payload.len(),
            MAXIMUM_REPARSE_PAYLOAD_SIZE
        )));
    }

    let point = ReparseGuidDataBuffer::new(tag, guid, payload.to_vec())?;
    imp::set_reparse_point(path, &point)
}

#[cfg(target_os = "windows")]
mod imp {
    use std::iter::once;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;
    use std::ptr::null_mut;

    use log::{debug, trace};
    use winapi::shared::minwindef::{DWORD, FALSE};
    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::fileapi::{
        CreateFileW, GetFileAttributesW, INVALID_FILE_ATTRIBUTES, OPEN_EXISTING,
    };
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::ioapiset::DeviceIoControl;
    use winapi::um::winbase::{FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_OPEN_REPARSE_POINT};
    use winapi::um::winioctl::{
        FSCTL_DELETE_REPARSE_POINT, FSCTL_GET_REPARSE_POINT, FSCTL_SET_REPARSE_POINT,
    };
    use winapi::um::winnt::{
        FILE_ATTRIBUTE_DIRECTORY, FILE_ATTRIBUTE_REPARSE_POINT, FILE_SHARE_READ,
        FILE_SHARE_WRITE, GENERIC_READ, GENERIC_WRITE, HANDLE,
    };

    use crate::buffer::{
        ReparseGuid, ReparseGuidDataBuffer, MAXIMUM_REPARSE_DATA_BUFFER_SIZE,
        REPARSE_GUID_DATA_BUFFER_HEADER_SIZE,
    };
    use crate::error::{ReparseError, ReparseResult};

    /// Owned file handle, closed on drop.
    struct OwnedHandle(HANDLE);

    impl Drop for OwnedHandle {
        fn drop(&mut self) {
            unsafe {
                CloseHandle(self.0);
            }
        }
    }

    fn wide_path(path: &Path) -> Vec<u16> {
        path.as_os_str().encode_wide().chain(once(0)).collect()
    }

    fn attributes(path: &Path) -> Option<DWORD> {
        let wide = wide_path(path);
        let attrs = unsafe { GetFileAttributesW(wide.as_ptr()) };
        if attrs == INVALID_FILE_ATTRIBUTES {
            None
        } else {
            Some(attrs)
        }
    }

    pub fn reparse_point_exists(path: &Path) -> bool {
        attributes(path).map_or(false, |a| a & FILE_ATTRIBUTE_REPARSE_POINT != 0)
    }

    /// Open `path` without traversing the reparse point itself. Directories
    /// additionally need backup semantics for metadata-level access.
    fn open_no_traverse(path: &Path, access: DWORD, share: DWORD) -> ReparseResult<OwnedHandle> {
        let is_directory = attributes(path).map_or(false, |a| a & FILE_ATTRIBUTE_DIRECTORY != 0);
        let flags = if is_directory {
            FILE_FLAG_OPEN_REPARSE_POINT | FILE_FLAG_BACKUP_SEMANTICS
        } else {
            FILE_FLAG_OPEN_REPARSE_POINT
        };

        let wide = wide_path(path);
        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                access,
                share,
                null_mut(),
                OPEN_EXISTING,
                flags,
                null_mut(),
            )
        };

        if handle == INVALID_HANDLE_VALUE {
            let code = unsafe { GetLastError() };
            debug!("Failed to open {:?}: error code {}", path, code);
            return Err(ReparseError::OpenFailed { code });
        }

        Ok(OwnedHandle(handle))
    }

    fn open_for_read(path: &Path) -> ReparseResult<OwnedHandle> {
        open_no_traverse(path, GENERIC_READ, FILE_SHARE_READ)
    }

    fn open_for_write(path: &Path) -> ReparseResult<OwnedHandle> {
        open_no_traverse(path, GENERIC_WRITE, FILE_SHARE_READ | FILE_SHARE_WRITE)
    }

    pub fn query_reparse_point(path: &Path) -> ReparseResult<ReparseGuidDataBuffer> {
        if !reparse_point_exists(path) {
            return Err(ReparseError::NotAReparsePoint);
        }

        let handle = open_for_read(path)?;

        let mut out = vec![0u8; MAXIMUM_REPARSE_DATA_BUFFER_SIZE];
        let mut returned: DWORD = 0;
        let ok = unsafe {
            DeviceIoControl(
                handle.0,
                FSCTL_GET_REPARSE_POINT,
                null_mut(),
                0,
                out.as_mut_ptr() as *mut _,
                out.len() as DWORD,
                &mut returned,
                null_mut(),
            )
        };

        if ok == FALSE {
            let code = unsafe { GetLastError() };
            debug!("FSCTL_GET_REPARSE_POINT failed for {:?}: error code {}", path, code);
            return Err(ReparseError::DeviceControlFailed { code });
        }

        out.truncate(returned as usize);
        let point = ReparseGuidDataBuffer::decode(&out)?;
        trace!(
            "Queried reparse point on {:?}: tag 0x{:08X}, {} payload bytes",
            path,
            point.tag,
            point.payload.len()
        );
        Ok(point)
    }

    pub fn delete_with_fallback(path: &Path, tag: u32, guid: ReparseGuid) -> ReparseResult<()> {
        let handle = open_for_write(path)?;

        // System-class tags accept a header-only delete request
        let header_only = ReparseGuidDataBuffer::header_only(tag);
        if issue_delete(&handle, &header_only.encode()).is_ok() {
            debug!("Deleted reparse point on {:?} (tag 0x{:08X})", path, tag);
            return Ok(());
        }

        // Generic-class tags require the guid echoed back. This must stay
        // the second attempt: some drivers reject a qualified delete for
        // system-class tags.
        let mut qualified = header_only;
        qualified.guid = guid;
        issue_delete(&handle, &qualified.encode())?;

        debug!(
            "Deleted reparse point on {:?} with guid fallback (tag 0x{:08X})",
            path, tag
        );
        Ok(())
    }

    fn issue_delete(handle: &OwnedHandle, request: &[u8]) -> ReparseResult<()> {
        debug_assert_eq!(request.len(), REPARSE_GUID_DATA_BUFFER_HEADER_SIZE);

        let mut returned: DWORD = 0;
        let ok = unsafe {
            DeviceIoControl(
                handle.0,
                FSCTL_DELETE_REPARSE_POINT,
                request.as_ptr() as *mut _,
                request.len() as DWORD,
                null_mut(),
                0,
                &mut returned,
                null_mut(),
            )
        };

        if ok == FALSE {
            let code = unsafe { GetLastError() };
            return Err(ReparseError::DeviceControlFailed { code });
        }
        Ok(())
    }

    pub fn set_reparse_point(path: &Path, point: &ReparseGuidDataBuffer) -> ReparseResult<()> {
        let handle = open_for_write(path)?;
        let request = point.encode();

        let mut returned: DWORD = 0;
        let ok = unsafe {
            DeviceIoControl(
                handle.0,
                FSCTL_SET_REPARSE_POINT,
                request.as_ptr() as *mut _,
                request.len() as DWORD,
                null_mut(),
                0,
                &mut returned,
                null_mut(),
            )
        };

        if ok == FALSE {
            let code = unsafe { GetLastError() };
            debug!("FSCTL_SET_REPARSE_POINT failed for {:?}: error code {}", path, code);
            return Err(ReparseError::DeviceControlFailed { code });
        }

        trace!(
            "Set reparse point on {:?}: tag 0x{:08X}, {} bytes",
            path,
            point.tag,
            request.len()
        );
        Ok(())
    }
}

// Non-Windows stub implementation
#[cfg(not(target_os = "windows"))]
mod imp {
    use std::path::Path;

    use crate::buffer::{ReparseGuid, ReparseGuidDataBuffer};
    use crate::error::{ReparseError, ReparseResult};

    pub fn reparse_point_exists(_path: &Path) -> bool {
        false
    }

    pub fn query_reparse_point(_path: &Path) -> ReparseResult<ReparseGuidDataBuffer> {
        Err(ReparseError::UnsupportedPlatform)
    }

    pub fn delete_with_fallback(
        _path: &Path,
        _tag: u32,
        _guid: ReparseGuid,
    ) -> ReparseResult<()> {
        Err(ReparseError::UnsupportedPlatform)
    }

    pub fn set_reparse_point(
        _path: &Path,
        _point: &ReparseGuidDataBuffer,
    ) -> ReparseResult<()> {
        Err(ReparseError::UnsupportedPlatform)
    }
}
