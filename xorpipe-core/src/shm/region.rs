//! SharedMemoryRegion - POSIX shared memory wrapper.
//!
//! Provides safe abstraction over mmap and shm_open for cross-process IPC.
//! All unsafe operations are encapsulated with bounds checking.

use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;

use crate::error::SharedMemoryError;
use crate::types::SegmentName;

/// Represents a mapped view of a named shared memory object.
///
/// The view is unmapped on drop. The object itself outlives every view and is
/// only removed by an explicit [`SharedMemoryRegion::unlink`].
pub struct SharedMemoryRegion {
    /// Name of the shared memory object.
    name: SegmentName,
    /// Pointer to the mapped memory.
    ptr: NonNull<u8>,
    /// Size of the mapped view in bytes.
    size: usize,
    /// File descriptor for the shared memory object.
    fd: OwnedFd,
}

// SAFETY: SharedMemoryRegion can be sent between threads as it owns its mapping.
unsafe impl Send for SharedMemoryRegion {}

// SAFETY: The region itself holds no interior state; all access to the mapped
// bytes goes through the segment's semaphores.
unsafe impl Sync for SharedMemoryRegion {}

impl SharedMemoryRegion {
    /// Create a fresh, zero-filled shared memory object of `size` bytes.
    ///
    /// A stale object with the same name is unlinked first, so a crashed
    /// previous session never blocks a new one.
    ///
    /// # Errors
    /// Returns SharedMemoryError if creation, sizing or mapping fails.
    pub fn create(name: &SegmentName, size: usize) -> Result<Self, SharedMemoryError> {
        if size == 0 {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: "Size cannot be zero".to_string(),
            });
        }

        let c_name = Self::c_name(name)?;

        // Ignore the result: most of the time there is nothing to remove.
        // SAFETY: c_name is a valid CString
        unsafe { libc::shm_unlink(c_name.as_ptr()) };

        // SAFETY: c_name is a valid CString, flags are valid POSIX flags
        let raw_fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_RDWR | libc::O_EXCL,
                0o666,
            )
        };

        if raw_fd < 0 {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", std::io::Error::last_os_error()),
            });
        }

        // SAFETY: raw_fd was just returned by shm_open and is owned by nobody else
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        // SAFETY: fd is a valid file descriptor
        let result = unsafe { libc::ftruncate(fd.as_raw_fd(), size as libc::off_t) };
        if result < 0 {
            let errno = std::io::Error::last_os_error();
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("ftruncate failed: {}", errno),
            });
        }

        let ptr = match Self::map(&fd, size) {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                return Err(e);
            }
        };

        // ftruncate already zero-fills, but a reused page must not leak old state.
        // SAFETY: ptr is valid for size bytes
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, size);
        }

        tracing::debug!(name = %name, size = size, "Created shared memory region");

        Ok(Self {
            name: name.clone(),
            ptr,
            size,
            fd,
        })
    }

    /// Open an existing shared memory object and map its first `size` bytes.
    ///
    /// # Errors
    /// `SegmentNotFound` if no object with that name exists, `InvalidLayout`
    /// if the object is smaller than the requested view.
    pub fn open(name: &SegmentName, size: usize) -> Result<Self, SharedMemoryError> {
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString
        let raw_fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };

        if raw_fd < 0 {
            let errno = std::io::Error::last_os_error();
            if errno.raw_os_error() == Some(libc::ENOENT) {
                return Err(SharedMemoryError::SegmentNotFound {
                    name: name.to_string(),
                });
            }
            return Err(SharedMemoryError::AttachFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", errno),
            });
        }

        // SAFETY: raw_fd was just returned by shm_open and is owned by nobody else
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        Self::check_object_size(name, &fd, size)?;
        let ptr = Self::map(&fd, size)?;

        tracing::debug!(name = %name, size = size, "Opened shared memory region");

        Ok(Self {
            name: name.clone(),
            ptr,
            size,
            fd,
        })
    }

    /// Replace the current view with one of `size` bytes over the same object.
    ///
    /// Used for the two-phase attach: map the fixed header, learn the ring
    /// capacity, then remap the whole segment.
    pub fn remap(&mut self, size: usize) -> Result<(), SharedMemoryError> {
        Self::check_object_size(&self.name, &self.fd, size)?;
        let ptr = Self::map(&self.fd, size)?;

        // SAFETY: ptr and size describe the previous mapping
        unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size) };

        tracing::debug!(name = %self.name, from = self.size, to = size, "Remapped shared memory region");

        self.ptr = ptr;
        self.size = size;
        Ok(())
    }

    /// Remove the named object so the name can be reused.
    ///
    /// Existing mappings stay valid until they are dropped.
    pub fn unlink(name: &SegmentName) -> Result<(), SharedMemoryError> {
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString
        let result = unsafe { libc::shm_unlink(c_name.as_ptr()) };
        if result < 0 {
            return Err(SharedMemoryError::AttachFailed {
                name: name.to_string(),
                reason: format!("shm_unlink failed: {}", std::io::Error::last_os_error()),
            });
        }

        tracing::debug!(name = %name, "Unlinked shared memory region");
        Ok(())
    }

    /// Get the name of this shared memory region.
    pub fn name(&self) -> &SegmentName {
        &self.name
    }

    /// Get the size of the current view.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get a raw pointer to the shared memory.
    ///
    /// Caller must ensure proper synchronization when accessing the memory.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn c_name(name: &SegmentName) -> Result<CString, SharedMemoryError> {
        CString::new(name.os_name()).map_err(|e| SharedMemoryError::AttachFailed {
            name: name.to_string(),
            reason: format!("Invalid name: {}", e),
        })
    }

    fn check_object_size(
        name: &SegmentName,
        fd: &OwnedFd,
        size: usize,
    ) -> Result<(), SharedMemoryError> {
        // SAFETY: zeroed stat is a valid out-parameter
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: fd is valid, stat is a valid pointer
        if unsafe { libc::fstat(fd.as_raw_fd(), &mut stat) } < 0 {
            return Err(SharedMemoryError::AttachFailed {
                name: name.to_string(),
                reason: format!("fstat failed: {}", std::io::Error::last_os_error()),
            });
        }

        if (stat.st_size as u64) < size as u64 {
            return Err(SharedMemoryError::InvalidLayout {
                reason: format!(
                    "Segment {} is {} bytes, expected at least {}",
                    name, stat.st_size, size
                ),
            });
        }
        Ok(())
    }

    fn map(fd: &OwnedFd, size: usize) -> Result<NonNull<u8>, SharedMemoryError> {
        // SAFETY: fd is valid, size has been checked against the object size
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(SharedMemoryError::MapFailed {
                reason: format!("mmap failed: {}", std::io::Error::last_os_error()),
            });
        }

        NonNull::new(ptr as *mut u8).ok_or_else(|| SharedMemoryError::MapFailed {
            reason: "mmap returned a null mapping".to_string(),
        })
    }
}

impl Drop for SharedMemoryRegion {
    fn drop(&mut self) {
        // SAFETY: ptr and size were set by the last successful map
        let result = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size) };
        if result < 0 {
            tracing::error!(
                name = %self.name,
                error = %std::io::Error::last_os_error(),
                "Failed to unmap shared memory"
            );
        }
        // fd closes itself
    }
}
