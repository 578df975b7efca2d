//! Anonymous memory mappings with holes, for handing the kernel user buffers
//! that are only partially valid.

use std::io;
use std::ptr::{self, NonNull};

use crate::error::Error;
use crate::transport::page_size;

/// A private anonymous read/write mapping, unmapped on drop.
#[derive(Debug)]
pub struct Mapping {
    base: NonNull<u8>,
    len: usize,
}

impl Mapping {
    /// Map `pages` pages.
    pub fn anonymous(pages: usize) -> Result<Self, Error> {
        let len = pages * page_size();
        // SAFETY: a fresh private mapping; no existing memory is affected.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::last_os("mmap"));
        }
        let base = NonNull::new(ptr.cast()).ok_or_else(|| Error::last_os("mmap"))?;
        Ok(Self { base, len })
    }

    /// Unmap page `index`, leaving a hole that faults on access.
    pub fn punch_hole(&mut self, index: usize) -> Result<(), Error> {
        let page = page_size();
        if (index + 1) * page > self.len {
            return Err(Error::io(
                "munmap",
                io::Error::new(io::ErrorKind::InvalidInput, "page outside the mapping"),
            ));
        }
        // SAFETY: the page lies inside our own mapping and no reference into
        // it is outstanding.
        let rc = unsafe { libc::munmap(self.base.as_ptr().add(index * page).cast(), page) };
        if rc != 0 {
            return Err(Error::last_os("munmap"));
        }
        Ok(())
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.base.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // Unmapping a range with holes in it is fine.
        // SAFETY: the range is exactly what `anonymous` mapped.
        unsafe { libc::munmap(self.base.as_ptr().cast(), self.len) };
    }
}
