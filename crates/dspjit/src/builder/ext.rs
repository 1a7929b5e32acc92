//! The extension-op emission engine.
//!
//! Extendable instructions issue a second micro-op in the same cycle as the
//! main op; the main op must still observe the register state from before
//! it. Register results of the extension are therefore staged into scratch
//! slots at emission time and written out only by the commit call, which the
//! block-build loop issues after the main op's code.
//!
//! Address registers are safe to write directly: no extendable main op reads
//! or writes them. The same holds for memory, so stores are not deferred.

use cranelift::codegen::ir;
use cranelift::prelude::InstBuilder;
use dspcore::ins::{Adjustment, ExtOp, Stride};
use dspcore::{Ins, Reg, Status};

use super::{BlockBuilder, Extension, Phase, Staged};
use crate::cache::Scratch;

impl BlockBuilder<'_> {
    /// Emits the extension op of the given instruction, if it carries one,
    /// leaving its register results staged. Must be paired with a later
    /// [`commit_extended_op`](Self::commit_extended_op).
    pub fn emit_extended_op(&mut self, ins: Ins) {
        assert!(
            self.phase == Phase::Committed,
            "extended op already staged; missing commit"
        );
        self.phase = Phase::Emitting;

        let Some(op) = ins.extension() else { return };
        tracing::trace!(?op, word = ins.0 as u64, "emitting extension op");

        match op {
            ExtOp::Nop => (),
            ExtOp::Adjust { ar, kind } => match kind {
                Adjustment::Decrement => self.decrement_addr(ar),
                Adjustment::Increment => self.increment_addr(ar),
                Adjustment::IndexedIncrease => self.increase_addr(ar, ar),
            },
            ExtOp::Move { dst, src } => {
                let value = self.read_reg(src, Extension::Zero);
                self.stage_primary(dst, value);
            }
            ExtOp::Store { ar, src, stride } => {
                let addr = self.read_reg(Reg::addressing(ar), Extension::Zero);
                let value = self.read_reg(src, Extension::Zero);
                self.dmem_write(addr, value);

                self.step_addr(ar, stride);
            }
            ExtOp::Load { dst, ar, stride } => {
                self.stage_load(dst, ar);
                self.step_addr(ar, stride);
            }
            ExtOp::StoreLoad {
                store_ar,
                load_ar,
                src,
                dst,
                ar0_stride,
                ar3_stride,
            } => {
                let addr = self.read_reg(Reg::addressing(store_ar), Extension::Zero);
                let value = self.read_reg(src, Extension::Zero);
                self.dmem_write(addr, value);

                self.stage_load(dst, load_ar);

                self.step_addr(3, ar3_stride);
                self.step_addr(0, ar0_stride);
            }
            ExtOp::DualLoad {
                dst,
                alt,
                ar,
                ar_stride,
                ar3_stride,
            } => {
                self.stage_load(dst, ar);
                self.stage_paged_load(alt, ar);

                self.step_addr(ar, ar_stride);
                self.step_addr(3, ar3_stride);
            }
        }
    }

    /// Writes out the staged results of the extension op emitted for the
    /// current instruction and resets the slots. Must follow a matching
    /// [`emit_extended_op`](Self::emit_extended_op).
    pub fn commit_extended_op(&mut self) {
        assert!(
            self.phase == Phase::Emitting,
            "commit without a matching extended-op emission"
        );

        if let Some(staged) = self.writeback.primary.take() {
            let value = self
                .bd
                .ins()
                .stack_load(ir::types::I32, staged.value.slot(), 0);
            self.set(staged.dest, value);

            if let Some(status) = self.writeback.primary_status.take() {
                if self.writeback.secondary.is_none() {
                    self.commit_acc_extension(staged.dest, value, &status);
                }

                self.cache.release(status);
            }

            self.cache.release(staged.value);
        }

        if let Some(staged) = self.writeback.secondary.take() {
            let value = self
                .bd
                .ins()
                .stack_load(ir::types::I32, staged.value.slot(), 0);
            self.set(staged.dest, value);
            self.cache.release(staged.value);
        }

        self.phase = Phase::Committed;
    }

    fn step_addr(&mut self, ar: u8, stride: Stride) {
        match stride {
            Stride::Increment => self.increment_addr(ar),
            Stride::Indexed => self.increase_addr(ar, ar),
        }
    }

    /// Reads memory through the given addressing register and stages the
    /// value into the primary slot.
    fn stage_load(&mut self, dst: Reg, ar: u8) {
        let addr = self.read_reg(Reg::addressing(ar), Extension::Zero);
        let value = self.dmem_read(addr);
        self.stage_primary(dst, value);
    }

    /// Stages the primary deferred write.
    fn stage_primary(&mut self, dest: Reg, value: ir::Value) {
        assert!(
            self.writeback.primary.is_none(),
            "primary write-back already staged"
        );

        let slot = self.cache.acquire();
        self.bd.ins().stack_store(value, slot.slot(), 0);

        // an accumulator-mid commit depends on the 40-bit mode bit as it is
        // now, not as it will be after the main op
        if dest.is_acc40_mid() {
            let sr = self.get(Reg::Status);
            let status = self.cache.acquire();
            self.bd.ins().stack_store(sr, status.slot(), 0);
            self.writeback.primary_status = Some(status);
        }

        self.writeback.primary = Some(Staged { dest, value: slot });
    }

    /// Resolves the secondary access of a dual load and stages its value:
    /// when both source addresses fall on the same page the hardware models
    /// a single physical access, so the value comes from the first source
    /// address; otherwise it comes from AR3.
    fn stage_paged_load(&mut self, dest: Reg, ar: u8) {
        assert!(
            self.writeback.secondary.is_none(),
            "secondary write-back already staged"
        );

        let a = self.read_reg(Reg::addressing(ar), Extension::Zero);
        let b = self.read_reg(Reg::Addr3, Extension::Zero);
        let diff = self.bd.ins().bxor(a, b);
        let page = self.bd.ins().band_imm(diff, 0xFC00);

        let slot = self.cache.acquire();

        // both arms store into the staging slot and meet at a single
        // continuation; flushing here gives the join one cache state
        self.flush();

        let same_block = self.bd.create_block();
        let other_block = self.bd.create_block();
        let continue_block = self.bd.create_block();

        self.bd.ins().brif(page, other_block, &[], same_block, &[]);
        self.bd.seal_block(same_block);
        self.bd.seal_block(other_block);

        self.switch_to_bb(same_block);
        let value = self.dmem_read(a);
        self.bd.ins().stack_store(value, slot.slot(), 0);
        self.bd.ins().jump(continue_block, &[]);

        self.switch_to_bb(other_block);
        let value = self.dmem_read(b);
        self.bd.ins().stack_store(value, slot.slot(), 0);
        self.bd.ins().jump(continue_block, &[]);

        self.bd.seal_block(continue_block);
        self.switch_to_bb(continue_block);

        self.writeback.secondary = Some(Staged { dest, value: slot });
    }

    /// Emits the runtime 40-bit mode test of an accumulator-mid commit: with
    /// the captured mode bit set, the write sign extends into the high part
    /// and zeroes the low part.
    fn commit_acc_extension(&mut self, dest: Reg, value: ir::Value, status: &Scratch) {
        let (low_reg, high_reg) = match dest {
            Reg::Acc40Mid0 => (Reg::Acc40Low0, Reg::Acc40High0),
            _ => (Reg::Acc40Low1, Reg::Acc40High1),
        };

        let sr = self
            .bd
            .ins()
            .stack_load(ir::types::I32, status.slot(), 0);
        let mode = self
            .bd
            .ins()
            .band_imm(sr, Status::SIGN_EXTEND_TO_40 as i64);

        // the extension arm writes the accumulator parts directly, so their
        // cached values must not survive the fork
        self.flush();
        self.cache.evict(low_reg);
        self.cache.evict(high_reg);

        let extend_block = self.bd.create_block();
        let continue_block = self.bd.create_block();

        self.bd
            .ins()
            .brif(mode, extend_block, &[], continue_block, &[]);
        self.bd.seal_block(extend_block);

        self.switch_to_bb(extend_block);
        let shifted = self.bd.ins().ishl_imm(value, 16);
        let high = self.bd.ins().sshr_imm(shifted, 31);
        let high = self.bd.ins().band_imm(high, 0xFFFF);
        self.store_reg(high_reg, high);

        let zero = self.constant(0);
        self.store_reg(low_reg, zero);
        self.bd.ins().jump(continue_block, &[]);

        self.bd.seal_block(continue_block);
        self.switch_to_bb(continue_block);
    }
}
