mod arith;
mod ext;
mod memory;

use cranelift::codegen::ir;
use cranelift::frontend;
use cranelift::prelude::InstBuilder;
use dspcore::{Ins, Reg, Status};

use crate::cache::{HostCache, Scratch};
use crate::hooks::Hooks;
use crate::{Codegen, Sequence};

pub(crate) const MEMFLAGS: ir::MemFlags = ir::MemFlags::trusted();

// the accumulator-mid registers read through the saturation logic, so a raw
// loaded value must not be reused for them
fn is_cacheable(reg: Reg) -> bool {
    !reg.is_acc40_mid()
}

/// How the upper bits of a 16-bit register value are treated in its 32-bit
/// carrier when read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    /// Upper bits are not meaningful to the consumer. Emits the same load as
    /// [`Extension::Zero`].
    None,
    Zero,
    Sign,
}

/// A staged deferred register write.
struct Staged {
    dest: Reg,
    value: Scratch,
}

/// The two deferred write-back slots of the current instruction.
///
/// The destination of an extension op must stay invisible to the main op
/// emitted for the same instruction, so results are staged here at emission
/// and written out by [`BlockBuilder::commit_extended_op`].
#[derive(Default)]
struct WriteBack {
    primary: Option<Staged>,
    /// Status register captured when the primary was staged. Populated only
    /// for accumulator-mid destinations, whose commit tests the captured
    /// 40-bit mode bit at run time.
    primary_status: Option<Scratch>,
    secondary: Option<Staged>,
}

/// Phase of the per-instruction stage/commit pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Committed,
    Emitting,
}

struct Signatures {
    read_dmem: ir::SigRef,
    write_dmem: ir::SigRef,
}

/// Constants used through block building.
struct Consts {
    ptr_type: ir::Type,

    ctx_ptr: ir::Value,
    regs_ptr: ir::Value,

    signatures: Signatures,
}

/// Structure to build JIT blocks.
///
/// The extension-op entry points are [`emit_extended_op`] and
/// [`commit_extended_op`]; the main-op emission step runs between the two
/// and accesses register and memory state through [`read_reg`],
/// [`write_reg`], [`dmem_read`] and [`dmem_write`].
///
/// [`emit_extended_op`]: Self::emit_extended_op
/// [`commit_extended_op`]: Self::commit_extended_op
/// [`read_reg`]: Self::read_reg
/// [`write_reg`]: Self::write_reg
/// [`dmem_read`]: Self::dmem_read
/// [`dmem_write`]: Self::dmem_write
pub struct BlockBuilder<'ctx> {
    codegen: &'ctx mut Codegen,
    bd: frontend::FunctionBuilder<'ctx>,
    cache: HostCache,
    consts: Consts,
    writeback: WriteBack,
    phase: Phase,

    emitted: u32,
}

impl<'ctx> BlockBuilder<'ctx> {
    pub(crate) fn new(
        codegen: &'ctx mut Codegen,
        mut builder: frontend::FunctionBuilder<'ctx>,
    ) -> Self {
        let entry_bb = builder.create_block();
        builder.append_block_params_for_function_params(entry_bb);
        builder.switch_to_block(entry_bb);
        builder.seal_block(entry_bb);

        let ptr_type = codegen.isa.pointer_type();
        let default = codegen.isa.default_call_conv();
        let params = builder.block_params(entry_bb);
        let ctx_ptr = params[0];
        let regs_ptr = params[1];

        let signatures = Signatures {
            read_dmem: builder.import_signature(Hooks::read_dmem_sig(ptr_type, default)),
            write_dmem: builder.import_signature(Hooks::write_dmem_sig(ptr_type, default)),
        };

        let cache = HostCache::new(&mut builder);

        Self {
            codegen,
            bd: builder,
            cache,
            consts: Consts {
                ptr_type,
                ctx_ptr,
                regs_ptr,
                signatures,
            },
            writeback: WriteBack::default(),
            phase: Phase::Committed,

            emitted: 0,
        }
    }

    fn switch_to_bb(&mut self, bb: ir::Block) {
        self.bd.switch_to_block(bb);
        self.bd.set_srcloc(ir::SourceLoc::new(self.emitted));
    }

    fn load_reg(&mut self, reg: Reg) -> ir::Value {
        self.bd.ins().uload16(
            ir::types::I32,
            MEMFLAGS,
            self.consts.regs_ptr,
            reg.offset() as i32,
        )
    }

    fn store_reg(&mut self, reg: Reg, value: ir::Value) {
        self.bd.ins().istore16(
            MEMFLAGS,
            value,
            self.consts.regs_ptr,
            reg.offset() as i32,
        );
    }

    /// Gets the current value of the given register, zero extended into its
    /// I32 carrier.
    fn get(&mut self, reg: Reg) -> ir::Value {
        if let Some(cached) = self.cache.lookup(reg) {
            return cached.value;
        }

        let dumped = self.load_reg(reg);
        if is_cacheable(reg) {
            self.cache.insert(reg, dumped, false);
        }

        dumped
    }

    /// Sets the value of the given register. `value` must be a canonical
    /// zero-extended 16-bit I32.
    fn set(&mut self, reg: Reg, value: ir::Value) {
        if let Some(cached) = self.cache.lookup_mut(reg) {
            cached.value = value;
            cached.modified = true;
            return;
        }

        if is_cacheable(reg) {
            self.cache.insert(reg, value, true);
        } else {
            self.store_reg(reg, value);
        }
    }

    /// Flushes the register cache to the registers struct. This does not
    /// invalidate the register cache.
    pub(crate) fn flush(&mut self) {
        for (reg, val) in self.cache.iter() {
            if !val.modified {
                continue;
            }

            self.bd.ins().istore16(
                MEMFLAGS,
                val.value,
                self.consts.regs_ptr,
                reg.offset() as i32,
            );
        }
    }

    /// Reads a register through the access shim, with the given extension
    /// mode. Accumulator-mid registers read through the saturation logic.
    pub fn read_reg(&mut self, reg: Reg, extension: Extension) -> ir::Value {
        let value = if reg.is_acc40_mid() {
            self.read_acc_mid_saturating(reg)
        } else {
            self.get(reg)
        };

        match extension {
            Extension::None | Extension::Zero => value,
            Extension::Sign => {
                let shifted = self.bd.ins().ishl_imm(value, 16);
                self.bd.ins().sshr_imm(shifted, 16)
            }
        }
    }

    /// Writes a register through the access shim. `value` must be a
    /// canonical zero-extended 16-bit I32.
    pub fn write_reg(&mut self, reg: Reg, value: ir::Value) {
        self.set(reg, value);
    }

    /// Creates a constant in the canonical 16-bit I32 carrier form.
    pub fn constant(&mut self, value: u16) -> ir::Value {
        self.bd.ins().iconst(ir::types::I32, value as i64)
    }

    /// Reads an accumulator-mid register with the hardware's saturation: in
    /// 40-bit mode, an accumulator whose value does not fit in 32 bits reads
    /// as `0x7FFF`/`0x8000` depending on its sign. Branchless.
    fn read_acc_mid_saturating(&mut self, reg: Reg) -> ir::Value {
        let (low_reg, high_reg) = match reg {
            Reg::Acc40Mid0 => (Reg::Acc40Low0, Reg::Acc40High0),
            _ => (Reg::Acc40Low1, Reg::Acc40High1),
        };

        let low = self.get(low_reg);
        let mid = self.load_reg(reg);
        let high = self.get(high_reg);
        let sr = self.get(Reg::Status);

        let low = self.bd.ins().uextend(ir::types::I64, low);
        let mid_wide = self.bd.ins().uextend(ir::types::I64, mid);
        let high = self.bd.ins().uextend(ir::types::I64, high);

        // only the low 8 bits of the high part are architectural
        let high = self.bd.ins().band_imm(high, 0xFF);

        let high = self.bd.ins().ishl_imm(high, 32);
        let mid_shifted = self.bd.ins().ishl_imm(mid_wide, 16);
        let acc = self.bd.ins().bor(high, mid_shifted);
        let acc = self.bd.ins().bor(acc, low);

        let full = self.bd.ins().ishl_imm(acc, 24);
        let full = self.bd.ins().sshr_imm(full, 24);
        let truncated = self.bd.ins().ishl_imm(acc, 32);
        let truncated = self.bd.ins().sshr_imm(truncated, 32);

        let mismatch = self
            .bd
            .ins()
            .icmp(ir::condcodes::IntCC::NotEqual, full, truncated);
        let negative = self
            .bd
            .ins()
            .icmp_imm(ir::condcodes::IntCC::SignedLessThan, full, 0);

        let mode = self
            .bd
            .ins()
            .band_imm(sr, Status::SIGN_EXTEND_TO_40 as i64);
        let mode_set = self
            .bd
            .ins()
            .icmp_imm(ir::condcodes::IntCC::NotEqual, mode, 0);

        let max = self.constant(0x7FFF);
        let min = self.constant(0x8000);
        let saturated = self.bd.ins().select(negative, min, max);

        let use_saturated = self.bd.ins().band(mismatch, mode_set);
        self.bd.ins().select(use_saturated, saturated, mid)
    }

    pub(crate) fn build(
        mut self,
        instructions: impl Iterator<Item = Ins>,
        mut main_op: impl FnMut(&mut Self, Ins),
    ) -> Sequence {
        let mut sequence = Sequence::default();
        for ins in instructions {
            self.bd.set_srcloc(ir::SourceLoc::new(self.emitted));
            sequence.0.push(ins);

            self.emit_extended_op(ins);
            main_op(&mut self, ins);
            self.commit_extended_op();

            self.emitted += 1;
        }

        self.bd.set_srcloc(ir::SourceLoc::new(u32::MAX));
        self.flush();
        self.bd.ins().return_(&[]);
        self.bd.finalize();

        sequence
    }
}
