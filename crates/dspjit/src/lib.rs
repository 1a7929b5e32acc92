//! JIT compilation of GameCube DSP extension ops using Cranelift.
//!
//! Extendable DSP instructions carry a second micro-op in their low bits,
//! executing in the same cycle as the main op but observing the register
//! state from before it. This crate compiles those extension ops into host
//! code: decoding, register staging and deferred write-back, runtime
//! same-page resolution for the dual-load family, and address-register
//! wraparound stepping. The main op's own code is emitted by the caller,
//! between the stage and commit calls.

mod builder;
mod cache;

#[cfg(test)]
mod test;

pub mod block;
pub mod hooks;

use std::sync::Arc;

use cranelift::codegen::isa::TargetIsa;
use cranelift::codegen::settings::Configurable;
use cranelift::codegen::{self, ir};
use cranelift::{frontend, native};
use dspcore::{Ins, Registers};
use easyerr::{Error, ResultExt};

use crate::block::{Block, BlockFn, Meta};
use crate::hooks::{Context, Hooks};

#[rustfmt::skip]
pub use crate::builder::{BlockBuilder, Extension};

/// A sequence of DSP instruction words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequence(pub Vec<Ins>);

impl Sequence {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub(crate) struct Codegen {
    hooks: Hooks,
    isa: Arc<dyn TargetIsa>,
    code_ctx: codegen::Context,
}

impl Codegen {
    fn new(isa: codegen::isa::Builder, hooks: Hooks) -> Self {
        let verifier = if cfg!(debug_assertions) {
            "true"
        } else {
            "false"
        };

        let mut flags = codegen::settings::builder();
        flags.set("preserve_frame_pointers", "true").unwrap();
        flags.set("use_colocated_libcalls", "false").unwrap();
        flags.set("unwind_info", "false").unwrap();
        flags.set("is_pic", "false").unwrap();

        // affect runtime performance
        flags.set("opt_level", "speed").unwrap();
        flags.set("enable_verifier", verifier).unwrap();
        flags.set("enable_alias_analysis", "true").unwrap();
        flags
            .set("enable_heap_access_spectre_mitigation", "false")
            .unwrap();
        flags
            .set("enable_table_access_spectre_mitigation", "false")
            .unwrap();

        let flags = codegen::settings::Flags::new(flags);
        let isa = isa.finish(flags).unwrap();

        Codegen {
            hooks,
            isa,
            code_ctx: codegen::Context::new(),
        }
    }

    fn block_signature(&self) -> ir::Signature {
        let ptr = self.isa.pointer_type();
        ir::Signature {
            // ctx, regs
            params: vec![ir::AbiParam::new(ptr); 2],
            returns: vec![],
            call_conv: self.isa.default_call_conv(),
        }
    }

    /// Compiles a cranelift function in the code context into machine code.
    fn compile(&mut self, func: ir::Function) -> Result<Vec<u8>, codegen::CodegenError> {
        self.code_ctx.clear();
        self.code_ctx.func = func;
        self.code_ctx
            .compile(&*self.isa, &mut Default::default())
            .map_err(|e| e.inner)?;

        let compiled = self.code_ctx.take_compiled_code().unwrap();

        // hook calls go through baked-in constants, nothing should relocate
        debug_assert!(compiled.buffer.relocs().is_empty());

        Ok(compiled.code_buffer().to_owned())
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("block contains no instructions")]
    EmptyBlock,
    #[error(transparent)]
    Codegen { source: codegen::CodegenError },
}

/// A JIT compiler for DSP extension ops, producing [`Block`]s.
///
/// Translation is single threaded: one block is built start to finish on the
/// calling thread, and concurrent compilation requires independent [`Jit`]
/// instances.
pub struct Jit {
    codegen: Codegen,
    func_ctx: frontend::FunctionBuilderContext,
    arena: jitmem::CodeArena,
    compiled_count: u64,
}

impl Jit {
    pub(crate) fn with_isa(isa: codegen::isa::Builder, hooks: Hooks) -> Self {
        Self {
            codegen: Codegen::new(isa, hooks),
            func_ctx: frontend::FunctionBuilderContext::new(),
            arena: jitmem::CodeArena::new(),
            compiled_count: 0,
        }
    }

    /// Creates a new [`Jit`] instance with the host's ISA.
    pub fn new(hooks: Hooks) -> Self {
        let isa_builder = native::builder().unwrap_or_else(|msg| {
            panic!("host machine is not supported: {}", msg);
        });

        Self::with_isa(isa_builder, hooks)
    }

    /// Builds a block from the given instructions.
    ///
    /// `main_op` is the main-opcode emission step: it is invoked once per
    /// instruction, strictly between the emission of that instruction's
    /// extension op and the commit of the extension's deferred writes.
    pub fn build<F>(
        &mut self,
        instructions: impl IntoIterator<Item = Ins>,
        main_op: F,
    ) -> Result<Block, BuildError>
    where
        F: for<'a> FnMut(&mut BlockBuilder<'a>, Ins),
    {
        let mut func = ir::Function::new();
        func.signature = self.codegen.block_signature();

        let func_builder = frontend::FunctionBuilder::new(&mut func, &mut self.func_ctx);
        let builder = BlockBuilder::new(&mut self.codegen, func_builder);
        let sequence = builder.build(instructions.into_iter(), main_op);

        if sequence.is_empty() {
            return Err(BuildError::EmptyBlock);
        }

        let clir = cfg!(debug_assertions).then(|| func.display().to_string());
        let code = self.codegen.compile(func).context(BuildCtx::Codegen)?;
        let alloc = self.arena.push(&code);

        self.compiled_count += 1;
        tracing::debug!(
            instructions = sequence.len(),
            compiled = self.compiled_count,
            "built DSP block"
        );

        Ok(Block::new(alloc, Meta {
            seq: sequence,
            clir,
        }))
    }

    /// Calls the given block with the given context and register file.
    ///
    /// # Safety
    /// `ctx` must match the type expected by the hooks of this JIT instance,
    /// `regs` must be valid for the duration of the call, and `block` must
    /// have been produced by this instance.
    pub unsafe fn call(&mut self, ctx: *mut Context, regs: *mut Registers, block: BlockFn) {
        // SAFETY: the exclusive borrow guarantees the arena is not pushing
        // while the block runs; the rest is on the caller
        unsafe { block.invoke(ctx, regs) }
    }
}
