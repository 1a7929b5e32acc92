use cranelift::codegen::ir;
use cranelift::codegen::isa::CallConv;

pub type Context = std::ffi::c_void;

/// Reads a data-memory word. The address is in the low 16 bits.
pub type ReadDmemHook = extern "C-unwind" fn(*mut Context, u32) -> u32;
/// Writes a data-memory word. Address and value are in the low 16 bits.
pub type WriteDmemHook = extern "C-unwind" fn(*mut Context, u32, u32);

/// External functions that JITed code calls.
///
/// Data memory is the only capability generated code consumes: the register
/// file is addressed directly, but data-memory accesses can land on MMIO and
/// belong to the memory subsystem behind these hooks.
pub struct Hooks {
    pub read_dmem: ReadDmemHook,
    pub write_dmem: WriteDmemHook,
}

impl Hooks {
    /// Returns the function signature for the `read_dmem` hook.
    pub(crate) fn read_dmem_sig(ptr_type: ir::Type, call_conv: CallConv) -> ir::Signature {
        ir::Signature {
            params: vec![
                ir::AbiParam::new(ptr_type),       // ctx
                ir::AbiParam::new(ir::types::I32), // address
            ],
            returns: vec![ir::AbiParam::new(ir::types::I32)], // value
            call_conv,
        }
    }

    /// Returns the function signature for the `write_dmem` hook.
    pub(crate) fn write_dmem_sig(ptr_type: ir::Type, call_conv: CallConv) -> ir::Signature {
        ir::Signature {
            params: vec![
                ir::AbiParam::new(ptr_type),       // ctx
                ir::AbiParam::new(ir::types::I32), // address
                ir::AbiParam::new(ir::types::I32), // value
            ],
            returns: vec![],
            call_conv,
        }
    }
}
