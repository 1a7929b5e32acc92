use std::ffi::c_void;
use std::ptr::NonNull;

use dspcore::Registers;
use jitmem::CodeAlloc;

use crate::Sequence;
use crate::hooks::Context;

/// Meta information regarding a block.
#[derive(Debug, Clone)]
pub struct Meta {
    /// The sequence of instructions this block contains.
    pub seq: Sequence,
    /// The Cranelift IR of this block. Only available if `cfg!(debug_assertions)` is true.
    pub clir: Option<String>,
}

/// A handle representing a compiled block of DSP instructions. This struct
/// does not manage the memory behind the block.
///
/// In order to call the block, use [`Jit::call`](super::Jit::call).
pub struct Block {
    code: CodeAlloc,
    meta: Meta,
}

/// A opaque handle representing the function of a compiled [`Block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct BlockFn(NonNull<c_void>);

impl Block {
    pub(crate) fn new(code: CodeAlloc, meta: Meta) -> Self {
        Self { code, meta }
    }

    /// Meta information regarding this block.
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Returns a pointer to the function of this block.
    pub fn as_ptr(&self) -> BlockFn {
        // SAFETY: the pointer isn't accessed by anything other than Jit::call
        BlockFn(unsafe { self.code.as_ptr().cast() })
    }
}

impl BlockFn {
    /// # Safety
    /// The arena behind the block must not be pushing code while the block
    /// runs, `ctx` must match the hooks the block was compiled against, and
    /// `regs` must be valid for the duration of the call.
    pub(crate) unsafe fn invoke(self, ctx: *mut Context, regs: *mut Registers) {
        type Entry = extern "C-unwind" fn(*mut Context, *mut Registers);

        let entry: Entry = unsafe { std::mem::transmute(self.0.as_ptr()) };
        entry(ctx, regs)
    }
}
