//! Data-memory accesses. Every access calls out to the memory capability:
//! DSP data space is MMIO-entangled, so there is no fast path to take.

use cranelift::codegen::ir;
use cranelift::prelude::InstBuilder;

use super::BlockBuilder;

impl BlockBuilder<'_> {
    fn hook_callee(&mut self, hook: usize) -> ir::Value {
        self.bd
            .ins()
            .iconst(self.consts.ptr_type, hook as i64)
    }

    /// Reads a data-memory word. `addr` must be a canonical 16-bit I32.
    pub fn dmem_read(&mut self, addr: ir::Value) -> ir::Value {
        let callee = self.hook_callee(self.codegen.hooks.read_dmem as usize);
        let inst = self.bd.ins().call_indirect(
            self.consts.signatures.read_dmem,
            callee,
            &[self.consts.ctx_ptr, addr],
        );

        let value = self.bd.inst_results(inst)[0];
        self.bd.ins().band_imm(value, 0xFFFF)
    }

    /// Writes a data-memory word. Both operands must be canonical 16-bit
    /// I32s.
    pub fn dmem_write(&mut self, addr: ir::Value, value: ir::Value) {
        let callee = self.hook_callee(self.codegen.hooks.write_dmem as usize);
        self.bd.ins().call_indirect(
            self.consts.signatures.write_dmem,
            callee,
            &[self.consts.ctx_ptr, addr, value],
        );
    }
}
