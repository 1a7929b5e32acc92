//! Instruction words and decoding of their extension field.
//!
//! Many instructions carry a second micro-op in their low bits, issued in the
//! same cycle as the main op. The roughly two dozen extension mnemonics
//! reduce to a handful of shapes, and the decoder produces those directly:
//! the emission engine dispatches on shape, not mnemonic.

use crate::Reg;

/// A 16-bit DSP instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ins(pub u16);

impl Ins {
    pub fn new(word: u16) -> Self {
        Self(word)
    }

    /// The raw extension field of this word, if the main op carries one.
    /// Words below `0x3000` have no extension field; words below `0x8000`
    /// have a 7-bit field; the rest have an 8-bit field.
    pub fn extension_field(self) -> Option<u8> {
        if self.0 < 0x3000 {
            None
        } else if self.0 < 0x8000 {
            Some((self.0 & 0x7F) as u8)
        } else {
            Some((self.0 & 0xFF) as u8)
        }
    }

    /// The decoded extension op of this word, if the main op carries one.
    pub fn extension(self) -> Option<ExtOp> {
        self.extension_field().map(ExtOp::decode)
    }
}

/// How an addressing register steps after a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stride {
    /// Step by one.
    Increment,
    /// Step by the same-numbered indexing register.
    Indexed,
}

/// The pure address adjustments (the DR/IR/NR mnemonics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Decrement,
    Increment,
    IndexedIncrease,
}

/// A decoded extension op, tagged by shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtOp {
    /// No extension effect.
    Nop,
    /// Adjust addressing register `ar` without any access (DR/IR/NR).
    Adjust { ar: u8, kind: Adjustment },
    /// Copy a register to another, deferred (MV).
    Move { dst: Reg, src: Reg },
    /// Store `src` through addressing register `ar`, then step it (S/SN).
    Store { ar: u8, src: Reg, stride: Stride },
    /// Load into `dst` through addressing register `ar`, then step it,
    /// deferred (L/LN).
    Load { dst: Reg, ar: u8, stride: Stride },
    /// Store through one of AR0/AR3 and load through the other, each
    /// stepping independently (the LS/SL families). The load is deferred.
    StoreLoad {
        store_ar: u8,
        load_ar: u8,
        src: Reg,
        dst: Reg,
        ar0_stride: Stride,
        ar3_stride: Stride,
    },
    /// Load `dst` through addressing register `ar` and `alt` through AR3,
    /// both deferred, with the second access collapsing onto the first when
    /// the two addresses share a page (the LD/LDAX families).
    DualLoad {
        dst: Reg,
        alt: Reg,
        ar: u8,
        ar_stride: Stride,
        ar3_stride: Stride,
    },
}

const AXL0: u8 = Reg::Acc32Low0 as u8;
const AXL1: u8 = Reg::Acc32Low1 as u8;
const AXH0: u8 = Reg::Acc32High0 as u8;
const ACL0: u8 = Reg::Acc40Low0 as u8;
const ACM0: u8 = Reg::Acc40Mid0 as u8;

impl ExtOp {
    /// Decodes an extension field. Total over the full 8-bit space.
    pub fn decode(byte: u8) -> Self {
        let stride = |bit: u8| {
            if byte & (1 << bit) != 0 {
                Stride::Indexed
            } else {
                Stride::Increment
            }
        };

        match byte {
            // xxxx xxxx 0000 00xx
            0x00..=0x03 => Self::Nop,
            // xxxx xxxx 0000 kkrr
            0x04..=0x0F => Self::Adjust {
                ar: byte & 0x3,
                kind: match (byte >> 2) & 0x3 {
                    1 => Adjustment::Decrement,
                    2 => Adjustment::Increment,
                    _ => Adjustment::IndexedIncrease,
                },
            },
            // xxxx xxxx 0001 ddss
            0x10..=0x1F => Self::Move {
                dst: Reg::new(AXL0 + ((byte >> 2) & 0x3)),
                src: Reg::new(ACL0 + (byte & 0x3)),
            },
            // xxxx xxxx 001s snrr
            0x20..=0x3F => Self::Store {
                ar: byte & 0x3,
                src: Reg::new(ACL0 + ((byte >> 3) & 0x3)),
                stride: stride(2),
            },
            // xxxx xxxx 01dd dnrr
            0x40..=0x7F => Self::Load {
                dst: Reg::new(AXL0 + ((byte >> 3) & 0x7)),
                ar: byte & 0x3,
                stride: stride(2),
            },
            // xxxx xxxx 10dd mnfs: f selects direction, m/n select the
            // stepping of AR3/AR0
            0x80..=0xBF => {
                let (store_ar, load_ar) = if byte & 0x2 != 0 { (0, 3) } else { (3, 0) };

                Self::StoreLoad {
                    store_ar,
                    load_ar,
                    src: Reg::new(ACM0 + (byte & 0x1)),
                    dst: Reg::new(AXL0 + ((byte >> 4) & 0x3)),
                    ar0_stride: stride(2),
                    ar3_stride: stride(3),
                }
            }
            // xxxx xxxx 11dr mnss, with ss = 11 selecting the paired form
            // xxxx xxxx 11sr mn11
            0xC0..=0xFF => {
                let (dst, alt, ar) = if byte & 0x3 == 0x3 {
                    let r = (byte >> 4) & 0x1;
                    (Reg::new(AXH0 + r), Reg::new(AXL0 + r), (byte >> 5) & 0x1)
                } else {
                    let d = (byte >> 5) & 0x1;
                    let r = (byte >> 4) & 0x1;
                    (Reg::new(AXL0 + (d << 1)), Reg::new(AXL1 + (r << 1)), byte & 0x3)
                };

                Self::DualLoad {
                    dst,
                    alt,
                    ar,
                    ar_stride: stride(2),
                    ar3_stride: stride(3),
                }
            }
        }
    }
}
