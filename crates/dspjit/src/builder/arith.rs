//! Address-register stepping, emitted branchlessly. Has to agree bit for bit
//! with [`dspcore::wrap`]: the wrap register selects a power-of-two sized
//! block and stepping past either end wraps back into it.

use cranelift::codegen::ir;
use cranelift::prelude::{InstBuilder, IntCC};
use dspcore::Reg;

use super::BlockBuilder;

impl BlockBuilder<'_> {
    /// `(wr | 1) << 1`, the carry-detection mask of the wrap formulas.
    fn wrap_limit(&mut self, wr: ir::Value) -> ir::Value {
        let wr_or1 = self.bd.ins().bor_imm(wr, 1);
        self.bd.ins().ishl_imm(wr_or1, 1)
    }

    /// addr_reg <- addr_reg + 1, wrapping inside the block selected by the
    /// wrap register.
    pub(crate) fn increment_addr(&mut self, ar: u8) {
        let ar_reg = Reg::addressing(ar);
        let ar_v = self.get(ar_reg);
        let wr = self.get(Reg::wrapping(ar));

        let nar = self.bd.ins().iadd_imm(ar_v, 1);
        let diff = self.bd.ins().bxor(nar, ar_v);
        let limit = self.wrap_limit(wr);
        let wrap = self.bd.ins().icmp(IntCC::UnsignedGreaterThan, diff, limit);

        let span = self.bd.ins().iadd_imm(wr, 1);
        let wrapped = self.bd.ins().isub(nar, span);
        let result = self.bd.ins().select(wrap, wrapped, nar);
        let result = self.bd.ins().band_imm(result, 0xFFFF);

        self.set(ar_reg, result);
    }

    /// addr_reg <- addr_reg - 1, same wrapping.
    pub(crate) fn decrement_addr(&mut self, ar: u8) {
        let ar_reg = Reg::addressing(ar);
        let ar_v = self.get(ar_reg);
        let wr = self.get(Reg::wrapping(ar));

        let nar = self.bd.ins().iadd(ar_v, wr);
        let diff = self.bd.ins().bxor(nar, ar_v);
        let limit = self.wrap_limit(wr);
        let masked = self.bd.ins().band(diff, limit);
        let wrap = self.bd.ins().icmp(IntCC::UnsignedGreaterThan, masked, wr);

        let span = self.bd.ins().iadd_imm(wr, 1);
        let wrapped = self.bd.ins().isub(nar, span);
        let result = self.bd.ins().select(wrap, wrapped, nar);
        let result = self.bd.ins().band_imm(result, 0xFFFF);

        self.set(ar_reg, result);
    }

    /// addr_reg <- addr_reg + index_reg, wrapping either way depending on the
    /// sign of the indexing register.
    pub(crate) fn increase_addr(&mut self, ar: u8, ix: u8) {
        let ar_reg = Reg::addressing(ar);
        let ar_v = self.get(ar_reg);
        let wr = self.get(Reg::wrapping(ar));

        let ix_v = self.get(Reg::indexing(ix));
        let ix_s = self.bd.ins().ishl_imm(ix_v, 16);
        let ix_s = self.bd.ins().sshr_imm(ix_s, 16);

        let nar = self.bd.ins().iadd(ar_v, ix_s);
        let limit = self.wrap_limit(wr);
        let dar = self.bd.ins().bxor(nar, ar_v);
        let dar = self.bd.ins().bxor(dar, ix_s);
        let dar = self.bd.ins().band(dar, limit);

        let span = self.bd.ins().iadd_imm(wr, 1);

        // forward stepping wraps down past the end of the block
        let over = self.bd.ins().icmp(IntCC::UnsignedGreaterThan, dar, wr);
        let down = self.bd.ins().isub(nar, span);
        let forward = self.bd.ins().select(over, down, nar);

        // backward stepping wraps up past the start of the block
        let up = self.bd.ins().iadd(nar, span);
        let carry = self.bd.ins().bxor(up, nar);
        let carry = self.bd.ins().band(carry, dar);
        let under = self
            .bd
            .ins()
            .icmp(IntCC::UnsignedLessThanOrEqual, carry, wr);
        let backward = self.bd.ins().select(under, up, nar);

        let non_negative = self
            .bd
            .ins()
            .icmp_imm(IntCC::SignedGreaterThanOrEqual, ix_s, 0);
        let result = self.bd.ins().select(non_negative, forward, backward);
        let result = self.bd.ins().band_imm(result, 0xFFFF);

        self.set(ar_reg, result);
    }
}
