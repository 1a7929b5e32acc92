//! Executable memory arena for JITs.
//!
//! Hands out read-execute allocations of finalized machine code. Allocations
//! are never freed individually; the arena grows in page-mapped regions and
//! everything lives until the arena is dropped (which, for a JIT, is the
//! lifetime of the compiler itself).

use std::ptr::NonNull;

#[cfg(target_family = "unix")]
use rustix::mm::{self as mman, MapFlags, MprotectFlags, ProtFlags};
#[cfg(target_family = "windows")]
use windows::Win32::System::{
    Diagnostics::Debug::FlushInstructionCache, Memory, Threading::GetCurrentProcess,
};

#[cfg(target_os = "macos")]
unsafe extern "C" {
    unsafe fn sys_icache_invalidate(start: *mut std::ffi::c_void, len: usize);
}

const REGION_MIN_LEN: usize = 64 * bytesize::KIB as usize;
const CODE_ALIGN: usize = 64;

/// A finalized read-execute allocation.
///
/// # Safety considerations
/// The arena this allocation comes from must not be allocating while the
/// allocation is executed: the page protection of the active region is
/// temporarily writable during [`CodeArena::push`].
pub struct CodeAlloc(NonNull<[u8]>);

impl CodeAlloc {
    /// Returns a pointer to the code.
    ///
    /// # Safety
    /// Executing the code requires that the owning arena is not pushing, as
    /// stated in the type docs.
    #[inline(always)]
    pub unsafe fn as_ptr(&self) -> NonNull<[u8]> {
        self.0
    }
}

// SAFETY: safe to send across threads as long as execution is synchronized
// with the arena, which is the user's responsibility
unsafe impl Send for CodeAlloc {}

/// A page-mapped region of the arena.
#[derive(Clone, Copy)]
struct Region {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: protection changes can be issued from any thread
unsafe impl Send for Region {}

impl Region {
    fn map(len: usize) -> Self {
        let len = len.max(REGION_MIN_LEN);

        #[cfg(target_family = "unix")]
        // SAFETY: anonymous mapping at no particular address
        let ptr = unsafe {
            mman::mmap_anonymous(
                std::ptr::null_mut(),
                len,
                ProtFlags::empty(),
                MapFlags::PRIVATE,
            )
        }
        .unwrap();

        #[cfg(target_family = "windows")]
        // SAFETY: fresh reservation at no particular address
        let ptr = unsafe {
            Memory::VirtualAlloc(
                None,
                len,
                Memory::MEM_RESERVE | Memory::MEM_COMMIT,
                Memory::PAGE_NOACCESS,
            )
        };

        Self {
            ptr: ptr.cast(),
            len,
        }
    }

    /// Switches the first `len` bytes between writable (for pushing code)
    /// and executable (for running it).
    fn protect(&self, len: usize, exec: bool) {
        assert!(len <= self.len);

        #[cfg(target_family = "unix")]
        {
            let flags = if exec {
                MprotectFlags::READ | MprotectFlags::EXEC
            } else {
                MprotectFlags::READ | MprotectFlags::WRITE
            };

            // SAFETY: the range was mapped by `map`
            unsafe { mman::mprotect(self.ptr.cast(), len, flags).unwrap() }
        }

        #[cfg(target_family = "windows")]
        {
            let flags = if exec {
                Memory::PAGE_EXECUTE_READ
            } else {
                Memory::PAGE_READWRITE
            };

            let mut prev = Memory::PAGE_PROTECTION_FLAGS(0);
            // SAFETY: the range was reserved and committed by `map`
            unsafe { Memory::VirtualProtect(self.ptr.cast(), len, flags, &raw mut prev).unwrap() }
        }
    }
}

/// An arena of read-execute code allocations.
pub struct CodeArena {
    regions: Vec<Region>,
    offset: usize,
}

impl CodeArena {
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
            offset: 0,
        }
    }

    fn current(&mut self, len: usize) -> Region {
        let needs_region = match self.regions.last() {
            Some(region) => region
                .len
                .checked_sub(self.offset.next_multiple_of(CODE_ALIGN))
                .is_none_or(|remaining| remaining < len),
            None => true,
        };

        if needs_region {
            self.regions.push(Region::map(len.next_multiple_of(CODE_ALIGN)));
            self.offset = 0;
        }

        *self.regions.last().unwrap()
    }

    /// Copies `code` into the arena and returns its finalized allocation.
    ///
    /// # Safety considerations
    /// While pushing is safe, previously returned allocations must _not_ be
    /// executed while a push is in progress: the active region is made
    /// writable for the duration of the copy. This is enforced as a safety
    /// requirement of [`CodeAlloc::as_ptr`].
    pub fn push(&mut self, code: &[u8]) -> CodeAlloc {
        assert!(!code.is_empty());

        let region = self.current(code.len());
        let start = self.offset.next_multiple_of(CODE_ALIGN);
        let end = start + code.len();

        region.protect(end, false);

        // SAFETY: `start..end` lies within the region and is writable
        let ptr = unsafe {
            let ptr = region.ptr.add(start);
            std::ptr::copy_nonoverlapping(code.as_ptr(), ptr, code.len());
            ptr
        };

        region.protect(end, true);

        #[cfg(target_family = "windows")]
        // SAFETY: flushing the icache over a valid range
        unsafe {
            let process = GetCurrentProcess();
            FlushInstructionCache(process, Some(ptr.cast()), code.len()).unwrap();
        }

        #[cfg(target_os = "macos")]
        // SAFETY: flushing the icache over a valid range
        unsafe {
            sys_icache_invalidate(ptr.cast(), code.len());
        }

        self.offset = end;

        CodeAlloc(NonNull::slice_from_raw_parts(
            NonNull::new(ptr).unwrap(),
            code.len(),
        ))
    }
}
