//! The host register cache: virtual-register values held in SSA values for
//! the duration of a block, plus the scratch slots that carry staged results
//! across emission phases (the main op's code is emitted between the staging
//! of a deferred write and its commit, so the staged value has to live in a
//! place that survives whatever the main op does, including control flow).

use cranelift::codegen::ir;
use cranelift::frontend::FunctionBuilder;
use dspcore::Reg;
use rustc_hash::FxHashMap;

/// The scratch slot pool size. The deepest consumer is a dual load staging
/// a 40-bit-capable primary: value, captured status and secondary value.
const SCRATCH_SLOTS: usize = 4;

/// A cached register value.
pub(crate) struct CachedValue {
    pub value: ir::Value,
    pub modified: bool,
}

/// A leased scratch slot. Obtained with [`HostCache::acquire`] and returned
/// with [`HostCache::release`].
pub(crate) struct Scratch(ir::StackSlot);

impl Scratch {
    pub fn slot(&self) -> ir::StackSlot {
        self.0
    }
}

pub(crate) struct HostCache {
    values: FxHashMap<Reg, CachedValue>,
    free: Vec<ir::StackSlot>,
}

impl HostCache {
    pub fn new(bd: &mut FunctionBuilder) -> Self {
        let free = (0..SCRATCH_SLOTS)
            .map(|_| {
                bd.create_sized_stack_slot(ir::StackSlotData::new(
                    ir::StackSlotKind::ExplicitSlot,
                    size_of::<u32>() as u32,
                    align_of::<u32>().ilog2() as u8,
                ))
            })
            .collect();

        Self {
            values: FxHashMap::default(),
            free,
        }
    }

    pub fn lookup(&self, reg: Reg) -> Option<&CachedValue> {
        self.values.get(&reg)
    }

    pub fn lookup_mut(&mut self, reg: Reg) -> Option<&mut CachedValue> {
        self.values.get_mut(&reg)
    }

    pub fn insert(&mut self, reg: Reg, value: ir::Value, modified: bool) {
        self.values.insert(reg, CachedValue { value, modified });
    }

    /// Drops the cached value of `reg`, if any. Used before runtime forks
    /// that write the register on one path only.
    pub fn evict(&mut self, reg: Reg) {
        self.values.remove(&reg);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Reg, &CachedValue)> {
        self.values.iter()
    }

    /// Leases a scratch slot. The per-op lease depth is statically bounded,
    /// so running out is a bug in the emission code, not a runtime condition.
    pub fn acquire(&mut self) -> Scratch {
        Scratch(self.free.pop().expect("scratch slot pool exhausted"))
    }

    pub fn release(&mut self, scratch: Scratch) {
        self.free.push(scratch.0);
    }
}
