use dspcore::{Acc40, Ins, Reg, Registers, Status};

use crate::hooks::{Context, Hooks};
use crate::{BlockBuilder, BuildError, Extension, Jit};

/// A main op with an 8-bit extension field and no effect of its own.
const NOP_MAIN: u16 = 0x8000;

/// Data memory plus an access log, backing the memory hooks.
struct TestCtx {
    mem: Vec<u16>,
    writes: Vec<(u16, u16)>,
}

impl TestCtx {
    fn new() -> Self {
        Self {
            mem: vec![0; 1 << 16],
            writes: Vec::new(),
        }
    }
}

extern "C-unwind" fn read_dmem(ctx: *mut Context, addr: u32) -> u32 {
    // SAFETY: tests always run blocks with a TestCtx
    let ctx = unsafe { &mut *ctx.cast::<TestCtx>() };
    ctx.mem[(addr & 0xFFFF) as usize] as u32
}

extern "C-unwind" fn write_dmem(ctx: *mut Context, addr: u32, value: u32) {
    // SAFETY: tests always run blocks with a TestCtx
    let ctx = unsafe { &mut *ctx.cast::<TestCtx>() };
    let (addr, value) = ((addr & 0xFFFF) as u16, (value & 0xFFFF) as u16);

    ctx.mem[addr as usize] = value;
    ctx.writes.push((addr, value));
}

fn jit() -> Jit {
    Jit::new(Hooks {
        read_dmem,
        write_dmem,
    })
}

fn run_with<F>(regs: &mut Registers, ctx: &mut TestCtx, words: &[u16], main_op: F)
where
    F: for<'a> FnMut(&mut BlockBuilder<'a>, Ins),
{
    let mut jit = jit();
    let block = jit
        .build(words.iter().copied().map(Ins::new), main_op)
        .unwrap();

    // SAFETY: ctx matches the hooks and regs lives across the call
    unsafe {
        jit.call(
            std::ptr::from_mut(ctx).cast(),
            std::ptr::from_mut(regs),
            block.as_ptr(),
        )
    };
}

fn run(regs: &mut Registers, ctx: &mut TestCtx, words: &[u16]) {
    run_with(regs, ctx, words, |_: &mut BlockBuilder, _: Ins| ());
}

#[test]
fn address_stepping_matches_the_scalar_model() {
    let cases = [
        (0x0000, 0xFFFF),
        (0x0005, 0xFFFF),
        (0xFFFF, 0xFFFF),
        (0x0005, 0x000F),
        (0x000F, 0x000F),
        (0x0025, 0x000F),
        (0x1000, 0x0FFF),
        (0x1FFF, 0x0FFF),
    ];

    for (ar, wr) in cases {
        for reg in 0..4u16 {
            let mut regs = Registers::default();
            regs.addressing[reg as usize] = ar;
            regs.wrapping[reg as usize] = wr;

            let mut expected = regs.clone();
            expected.increment_addr(reg as usize);

            let mut ctx = TestCtx::new();
            run(&mut regs, &mut ctx, &[NOP_MAIN | 0x08 | reg]);
            assert_eq!(regs, expected, "increment ar={ar:04X} wr={wr:04X}");

            let mut regs = Registers::default();
            regs.addressing[reg as usize] = ar;
            regs.wrapping[reg as usize] = wr;

            let mut expected = regs.clone();
            expected.decrement_addr(reg as usize);

            let mut ctx = TestCtx::new();
            run(&mut regs, &mut ctx, &[NOP_MAIN | 0x04 | reg]);
            assert_eq!(regs, expected, "decrement ar={ar:04X} wr={wr:04X}");
        }
    }
}

#[test]
fn indexed_increase_matches_the_scalar_model() {
    let cases: [(u16, u16, i16); 6] = [
        (0x0005, 0xFFFF, 2),
        (0x0005, 0xFFFF, -1),
        (0x0000, 0xFFFF, -1),
        (0x000E, 0x000F, 4),
        (0x0022, 0x000F, -4),
        (0x1234, 0x0FFF, -0x800),
    ];

    for (ar, wr, ix) in cases {
        let mut regs = Registers::default();
        regs.addressing[2] = ar;
        regs.wrapping[2] = wr;
        regs.indexing[2] = ix as u16;

        let mut expected = regs.clone();
        expected.increase_addr(2);

        let mut ctx = TestCtx::new();
        // NR $ar2
        run(&mut regs, &mut ctx, &[NOP_MAIN | 0x0C | 2]);
        assert_eq!(regs, expected, "ar={ar:04X} wr={wr:04X} ix={ix}");
    }
}

#[test]
fn move_commits_the_value_read_at_staging_time() {
    let mut regs = Registers::default();
    regs.acc40[0].low = 0x1234;

    let mut ctx = TestCtx::new();
    // MV $ax0.l, $ac0.l, with a main op that clobbers the source
    run_with(
        &mut regs,
        &mut ctx,
        &[NOP_MAIN | 0x10],
        |bd: &mut BlockBuilder, _| {
            let value = bd.constant(0xDEAD);
            bd.write_reg(Reg::Acc40Low0, value);
        },
    );

    assert_eq!(regs.acc32[0].low, 0x1234);
    assert_eq!(regs.acc40[0].low, 0xDEAD);
}

#[test]
fn main_op_observes_the_pre_update_destination() {
    let mut regs = Registers::default();
    regs.acc32[0].low = 0x1111;
    regs.acc40[0].low = 0x2222;

    let mut ctx = TestCtx::new();
    // MV $ax0.l, $ac0.l, with a main op that reads the destination
    run_with(
        &mut regs,
        &mut ctx,
        &[NOP_MAIN | 0x10],
        |bd: &mut BlockBuilder, _| {
            let old = bd.read_reg(Reg::Acc32Low0, Extension::Zero);
            bd.write_reg(Reg::Acc32High1, old);
        },
    );

    assert_eq!(regs.acc32[1].high, 0x1111);
    assert_eq!(regs.acc32[0].low, 0x2222);
}

#[test]
fn acc_mid_load_sign_extends_in_40bit_mode() {
    // L $ac0.m, @$ar0
    let word = NOP_MAIN | 0x40 | (6 << 3);

    let mut regs = Registers::default();
    regs.addressing[0] = 0x0050;
    regs.acc40[0] = Acc40 {
        low: 0x5555,
        mid: 0x6666,
        high: 0x0012,
    };
    regs.set_status(Status::default().with_sign_extend_to_40(true));

    let mut ctx = TestCtx::new();
    ctx.mem[0x0050] = 0x8000;

    let mut expected = regs.clone();
    expected.set_saturate(Reg::Acc40Mid0, 0x8000);
    expected.increment_addr(0);

    run(&mut regs, &mut ctx, &[word]);
    assert_eq!(regs, expected);
    assert_eq!(regs.acc40[0].high, 0xFFFF);
    assert_eq!(regs.acc40[0].mid, 0x8000);
    assert_eq!(regs.acc40[0].low, 0x0000);
}

#[test]
fn acc_mid_load_with_positive_value_clears_the_high_part() {
    let word = NOP_MAIN | 0x40 | (6 << 3);

    let mut regs = Registers::default();
    regs.addressing[0] = 0x0050;
    regs.acc40[0] = Acc40 {
        low: 0x5555,
        mid: 0x6666,
        high: 0x00FF,
    };
    regs.set_status(Status::default().with_sign_extend_to_40(true));

    let mut ctx = TestCtx::new();
    ctx.mem[0x0050] = 0x7123;

    run(&mut regs, &mut ctx, &[word]);
    assert_eq!(regs.acc40[0].high, 0x0000);
    assert_eq!(regs.acc40[0].mid, 0x7123);
    assert_eq!(regs.acc40[0].low, 0x0000);
}

#[test]
fn acc_mid_load_touches_only_the_mid_outside_40bit_mode() {
    let word = NOP_MAIN | 0x40 | (6 << 3);

    let mut regs = Registers::default();
    regs.addressing[0] = 0x0050;
    regs.acc40[0] = Acc40 {
        low: 0x5555,
        mid: 0x6666,
        high: 0x0012,
    };

    let mut ctx = TestCtx::new();
    ctx.mem[0x0050] = 0x8000;

    run(&mut regs, &mut ctx, &[word]);
    assert_eq!(regs.acc40[0].high, 0x0012);
    assert_eq!(regs.acc40[0].mid, 0x8000);
    assert_eq!(regs.acc40[0].low, 0x5555);
    assert_eq!(regs.addressing[0], 0x0051);
}

#[test]
fn mode_bit_is_captured_at_staging_time() {
    // L $ac0.m, @$ar0 with 40-bit mode off; the main op turns it on, which
    // must not affect the already staged commit
    let word = NOP_MAIN | 0x40 | (6 << 3);
    let mode_on = Status::default().with_sign_extend_to_40(true).to_bits();

    let mut regs = Registers::default();
    regs.addressing[0] = 0x0050;
    regs.acc40[0] = Acc40 {
        low: 0x5555,
        mid: 0x6666,
        high: 0x0012,
    };

    let mut ctx = TestCtx::new();
    ctx.mem[0x0050] = 0x8000;

    run_with(
        &mut regs,
        &mut ctx,
        &[word],
        |bd: &mut BlockBuilder, _| {
            let value = bd.constant(mode_on);
            bd.write_reg(Reg::Status, value);
        },
    );

    assert_eq!(regs.sr, mode_on);
    assert_eq!(regs.acc40[0].high, 0x0012);
    assert_eq!(regs.acc40[0].mid, 0x8000);
    assert_eq!(regs.acc40[0].low, 0x5555);
}

#[test]
fn dual_store_load_uses_pre_step_addresses() {
    // LS $ax0.l, $ac0.m
    let word = NOP_MAIN | 0x80;

    let mut regs = Registers::default();
    regs.addressing[0] = 0x0100;
    regs.addressing[3] = 0x0200;
    regs.acc40[0].mid = 0x5544;

    let mut ctx = TestCtx::new();
    ctx.mem[0x0100] = 0x0077;

    run(&mut regs, &mut ctx, &[word]);

    assert_eq!(ctx.writes, [(0x0200, 0x5544)]);
    assert_eq!(regs.acc32[0].low, 0x0077);
    assert_eq!(regs.addressing[0], 0x0101);
    assert_eq!(regs.addressing[3], 0x0201);
}

#[test]
fn dual_store_load_flipped_direction() {
    // SL $ac1.m, $ax1.l: store through AR0, load through AR3
    let word = NOP_MAIN | 0x93;

    let mut regs = Registers::default();
    regs.addressing[0] = 0x0300;
    regs.addressing[3] = 0x0400;
    regs.acc40[1].mid = 0xBEEF;
    regs.set_status(Status::default().with_sign_extend_to_40(false));

    let mut ctx = TestCtx::new();
    ctx.mem[0x0400] = 0x1212;

    run(&mut regs, &mut ctx, &[word]);

    assert_eq!(ctx.writes, [(0x0300, 0xBEEF)]);
    assert_eq!(regs.acc32[1].low, 0x1212);
    assert_eq!(regs.addressing[0], 0x0301);
    assert_eq!(regs.addressing[3], 0x0401);
}

#[test]
fn dual_store_load_steps_both_registers_by_their_indexing_registers() {
    // LSNM $ax0.l, $ac0.m
    let word = NOP_MAIN | 0x8C;

    let mut regs = Registers::default();
    regs.addressing[0] = 0x0100;
    regs.addressing[3] = 0x0200;
    regs.indexing[0] = 0x0002;
    regs.indexing[3] = 0xFFFF;
    regs.acc40[0].mid = 0x0E0E;

    let mut ctx = TestCtx::new();
    ctx.mem[0x0100] = 0x0D0D;

    let mut expected = regs.clone();
    expected.set(Reg::Acc32Low0, 0x0D0D);
    expected.increase_addr(3);
    expected.increase_addr(0);

    run(&mut regs, &mut ctx, &[word]);

    assert_eq!(ctx.writes, [(0x0200, 0x0E0E)]);
    assert_eq!(regs, expected);
    assert_eq!(regs.addressing[0], 0x0102);
    assert_eq!(regs.addressing[3], 0x01FF);
}

#[test]
fn store_writes_the_saturated_acc_mid() {
    // S @$ar0, $ac0.m with an accumulator that does not fit in 32 bits
    let word = NOP_MAIN | 0x20 | (2 << 3);

    let mut regs = Registers::default();
    regs.addressing[0] = 0x0080;
    regs.acc40[0] = Acc40::from(0x00_8000_0000);
    regs.set_status(Status::default().with_sign_extend_to_40(true));

    let mut ctx = TestCtx::new();
    run(&mut regs, &mut ctx, &[word]);

    assert_eq!(ctx.writes, [(0x0080, 0x7FFF)]);
    assert_eq!(regs.addressing[0], 0x0081);
}

#[test]
fn indexed_store_steps_by_the_indexing_register() {
    // SN @$ar1, $ac0.l
    let word = NOP_MAIN | 0x20 | 0x4 | 1;

    let mut regs = Registers::default();
    regs.addressing[1] = 0x0010;
    regs.indexing[1] = 0x0030;
    regs.acc40[0].low = 0xABCD;

    let mut ctx = TestCtx::new();
    run(&mut regs, &mut ctx, &[word]);

    assert_eq!(ctx.writes, [(0x0010, 0xABCD)]);
    assert_eq!(regs.addressing[1], 0x0040);
}

#[test]
fn dual_load_collapses_same_page_accesses() {
    // LD $ax0.l, $ax1.l, @$ar0
    let word = NOP_MAIN | 0xC0;

    let mut regs = Registers::default();
    regs.addressing[0] = 0x1005;
    regs.addressing[3] = 0x1042;

    let mut ctx = TestCtx::new();
    ctx.mem[0x1005] = 0xAAAA;
    ctx.mem[0x1042] = 0xBBBB;

    run(&mut regs, &mut ctx, &[word]);

    // same page: both destinations observe the first source address
    assert_eq!(regs.acc32[0].low, 0xAAAA);
    assert_eq!(regs.acc32[1].low, 0xAAAA);
    assert_eq!(regs.addressing[0], 0x1006);
    assert_eq!(regs.addressing[3], 0x1043);
}

#[test]
fn dual_load_reads_through_ar3_across_pages() {
    let word = NOP_MAIN | 0xC0;

    let mut regs = Registers::default();
    regs.addressing[0] = 0x1005;
    regs.addressing[3] = 0x2042;

    let mut ctx = TestCtx::new();
    ctx.mem[0x1005] = 0xAAAA;
    ctx.mem[0x2042] = 0xBBBB;

    run(&mut regs, &mut ctx, &[word]);

    assert_eq!(regs.acc32[0].low, 0xAAAA);
    assert_eq!(regs.acc32[1].low, 0xBBBB);
    assert_eq!(regs.addressing[0], 0x1006);
    assert_eq!(regs.addressing[3], 0x2043);
}

#[test]
fn dual_load_paired_form_targets_one_aux_pair() {
    // LDAX $ax0, @$ar0
    let word = NOP_MAIN | 0xC3;

    let mut regs = Registers::default();
    regs.addressing[0] = 0x0500;
    regs.addressing[3] = 0x0900;

    let mut ctx = TestCtx::new();
    ctx.mem[0x0500] = 0x1234;
    ctx.mem[0x0900] = 0x5678;

    run(&mut regs, &mut ctx, &[word]);

    assert_eq!(regs.acc32[0].high, 0x1234);
    assert_eq!(regs.acc32[0].low, 0x5678);
    assert_eq!(regs.addressing[0], 0x0501);
    assert_eq!(regs.addressing[3], 0x0901);
}

#[test]
fn seven_bit_extension_fields_decode() {
    // a main op below 0x8000 carries a 7-bit field: still L $ac0.m, @$ar0
    let word = 0x3000 | 0x70;

    let mut regs = Registers::default();
    regs.addressing[0] = 0x0050;

    let mut ctx = TestCtx::new();
    ctx.mem[0x0050] = 0x4321;

    run(&mut regs, &mut ctx, &[word]);
    assert_eq!(regs.acc40[0].mid, 0x4321);
    assert_eq!(regs.addressing[0], 0x0051);
}

#[test]
fn words_without_an_extension_field_are_inert() {
    let mut regs = Registers::default();
    let expected = regs.clone();

    let mut ctx = TestCtx::new();
    run(&mut regs, &mut ctx, &[0x0040, 0x2FFF]);

    assert_eq!(regs, expected);
    assert!(ctx.writes.is_empty());
}

#[test]
fn write_back_slots_reset_between_instructions() {
    // two moves back to back reuse the staging slots
    let words = [NOP_MAIN | 0x10, NOP_MAIN | 0x15];

    let mut regs = Registers::default();
    regs.acc40[0].low = 0x1010;
    regs.acc40[1].low = 0x2020;

    let mut ctx = TestCtx::new();
    run(&mut regs, &mut ctx, &words);

    assert_eq!(regs.acc32[0].low, 0x1010);
    assert_eq!(regs.acc32[1].low, 0x2020);
}

#[test]
fn cached_registers_flow_across_instructions() {
    // IR $ar0 twice in one block
    let words = [NOP_MAIN | 0x08, NOP_MAIN | 0x08];

    let mut regs = Registers::default();
    regs.addressing[0] = 0x0005;

    let mut ctx = TestCtx::new();
    run(&mut regs, &mut ctx, &words);

    assert_eq!(regs.addressing[0], 0x0007);
}

#[test]
fn empty_blocks_are_rejected() {
    let mut jit = jit();
    let result = jit.build(std::iter::empty(), |_: &mut BlockBuilder, _: Ins| ());
    assert!(matches!(result, Err(BuildError::EmptyBlock)));
}

#[test]
#[should_panic(expected = "commit without a matching extended-op emission")]
fn commit_twice_is_a_bug() {
    let mut jit = jit();
    let _ = jit.build(
        [Ins::new(NOP_MAIN)],
        |bd: &mut BlockBuilder, _| bd.commit_extended_op(),
    );
}

#[test]
#[should_panic(expected = "extended op already staged")]
fn emitting_twice_is_a_bug() {
    let mut jit = jit();
    let _ = jit.build(
        [Ins::new(NOP_MAIN)],
        |bd: &mut BlockBuilder, ins| bd.emit_extended_op(ins),
    );
}
