// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The modifier's instruction set.
//!
//! Every operation is one 64-bit word:
//!
//! ```text
//!  63    60  59    58   57                                         0
//! +--------+------+------+--------------------------------------------+
//! | opcode | last | lane |              operation fields              |
//! +--------+------+------+--------------------------------------------+
//! ```
//!
//! Register operands are packed as 8-bit [`RegField`] codes. Encoding
//! checks every field and fails with [`EncodeError`] rather than
//! truncating anything, and [`Insn::decode`] is the exact inverse of
//! [`Insn::encode`] for every word `encode` produces.

use super::checksum::csum16_add;
use super::checksum::csum16_sub;
use super::lane::Lane;
use super::layout::DESC_LEN;
use super::layout::Layer;
use super::layout::NhdrField;
use super::layout::NhdrLayer;
use super::layout::PktField;
use super::layout::Replace;
use super::layout::SIDEBAND_LEN;
use super::layout::SiField;
use super::layout::StripOffset;
use super::regs::RegField;
use super::regs::Width;
use core::fmt;
use core::fmt::Display;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum EncodeError {
    #[error("register r{0} does not exist")]
    BadReg(u8),

    #[error("invalid width code {0}")]
    BadWidthCode(u8),

    #[error("r{reg} offset {off} width {width} is not a register field")]
    Misaligned { reg: u8, off: u8, width: u8 },

    #[error("{have} byte register used for a {want} byte field")]
    WidthMismatch { have: u8, want: u8 },

    #[error("condition tests r{0}, which is not a compare register")]
    NotCmpReg(u8),

    #[error("checksum operation on a {0} byte field")]
    BadCsumWidth(u8),

    #[error("immediate {imm:#x} does not fit a {width} byte field")]
    ImmTooWide { imm: u16, width: u8 },

    #[error("{space} offset {off} width {width} is out of range")]
    OffsetOutOfRange { space: &'static str, off: u8, width: u8 },

    #[error("layer {0} cannot be written")]
    ReadOnlyLayer(Layer),

    #[error("NAT copy needs an L3 layer, not {0}")]
    BadNatLayer(Layer),

    #[error("unknown opcode {0}")]
    BadOpcode(u8),

    #[error("unknown ALU operation {0}")]
    BadAluOp(u8),

    #[error("unknown compare operation {0}")]
    BadCmpOp(u8),

    #[error("unknown layer code {0}")]
    BadLayer(u8),

    #[error("unknown strip offset code {0}")]
    BadStrip(u8),
}

const OPCODE_SHIFT: u32 = 60;
const LAST_BIT: u64 = 1 << 59;
const LANE_BIT: u64 = 1 << 58;

// ALU word layout.
const ALU_OP_SHIFT: u32 = 54;
const ALU_DST_SHIFT: u32 = 46;
const ALU_A_SHIFT: u32 = 38;
const ALU_B_IMM_BIT: u64 = 1 << 37;
const ALU_B_SHIFT: u32 = 21;
const ALU_COND_BIT: u64 = 1 << 20;
const ALU_CMP_SHIFT: u32 = 17;
const ALU_CMP_REG_SHIFT: u32 = 9;
const ALU_CMP_IMM_SHIFT: u32 = 1;

const fn bits(word: u64, shift: u32, width: u32) -> u64 {
    (word >> shift) & ((1 << width) - 1)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
enum Opcode {
    Nop = 0,
    SiToReg,
    PktToReg,
    Alu,
    Sync,
    RegToPkt,
    Replace,
    RegToNhdr,
    NatCopy,
}

impl Opcode {
    fn from_raw(raw: u8) -> Result<Self, EncodeError> {
        const ALL: [Opcode; 9] = [
            Opcode::Nop,
            Opcode::SiToReg,
            Opcode::PktToReg,
            Opcode::Alu,
            Opcode::Sync,
            Opcode::RegToPkt,
            Opcode::Replace,
            Opcode::RegToNhdr,
            Opcode::NatCopy,
        ];
        ALL.get(usize::from(raw)).copied().ok_or(EncodeError::BadOpcode(raw))
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum AluOp {
    Mov = 0,
    Add,
    Sub,
    And,
    Or,
    Shl,
    Shr,
    /// One's complement add, 16-bit only.
    CsumAdd,
    /// One's complement subtract, 16-bit only.
    CsumSub,
    /// A fresh pseudo-random 16-bit value.
    Rand16,
}

impl AluOp {
    const ALL: [AluOp; 10] = [
        Self::Mov,
        Self::Add,
        Self::Sub,
        Self::And,
        Self::Or,
        Self::Shl,
        Self::Shr,
        Self::CsumAdd,
        Self::CsumSub,
        Self::Rand16,
    ];

    fn from_raw(raw: u8) -> Result<Self, EncodeError> {
        Self::ALL
            .get(usize::from(raw))
            .copied()
            .ok_or(EncodeError::BadAluOp(raw))
    }

    pub fn is_csum(self) -> bool {
        matches!(self, Self::CsumAdd | Self::CsumSub)
    }

    /// Does this operation read its `a` operand?
    pub fn reads_a(self) -> bool {
        !matches!(self, Self::Mov | Self::Rand16)
    }

    /// Does this operation read its `b` operand?
    pub fn reads_b(self) -> bool {
        !matches!(self, Self::Rand16)
    }

    /// The value this operation produces, truncated to `width`.
    ///
    /// Operands are taken zero-extended. `Rand16` has no inputs; its
    /// random value is passed as `b`.
    pub fn apply(self, a: u32, b: u32, width: Width) -> u32 {
        let res = match self {
            Self::Mov | Self::Rand16 => b,
            Self::Add => a.wrapping_add(b),
            Self::Sub => a.wrapping_sub(b),
            Self::And => a & b,
            Self::Or => a | b,
            Self::Shl => a.checked_shl(b).unwrap_or(0),
            Self::Shr => a.checked_shr(b).unwrap_or(0),
            Self::CsumAdd => u32::from(csum16_add(a as u16, b as u16)),
            Self::CsumSub => u32::from(csum16_sub(a as u16, b as u16)),
        };
        res & width.max_value()
    }

    fn mnemonic(self) -> &'static str {
        match self {
            Self::Mov => "mov",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::And => "and",
            Self::Or => "or",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::CsumAdd => "csum_add",
            Self::CsumSub => "csum_sub",
            Self::Rand16 => "rand16",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum CmpOp {
    Eq = 0,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpOp {
    const ALL: [CmpOp; 6] =
        [Self::Eq, Self::Ne, Self::Lt, Self::Gt, Self::Le, Self::Ge];

    fn from_raw(raw: u8) -> Result<Self, EncodeError> {
        Self::ALL
            .get(usize::from(raw))
            .copied()
            .ok_or(EncodeError::BadCmpOp(raw))
    }

    pub fn eval(self, lhs: u32, rhs: u32) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Gt => lhs > rhs,
            Self::Le => lhs <= rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

impl Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Guard turning an ALU operation into a conditional store: the
/// result is written only when `reg <cmp> imm` holds.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Cond {
    pub cmp: CmpOp,
    pub reg: RegField,
    pub imm: u8,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operand {
    Reg(RegField),
    Imm(u16),
}

impl From<RegField> for Operand {
    fn from(field: RegField) -> Self {
        Self::Reg(field)
    }
}

impl From<u16> for Operand {
    fn from(imm: u16) -> Self {
        Self::Imm(imm)
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Reg(field) => write!(f, "{}", field),
            Self::Imm(imm) => write!(f, "{:#x}", imm),
        }
    }
}

/// `dst = a <op> b`, optionally guarded by a [`Cond`].
///
/// Operations which ignore `a` carry `dst` in its place, so that a
/// decoded word compares equal to the operation that produced it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Alu {
    pub op: AluOp,
    pub dst: RegField,
    pub a: RegField,
    pub b: Operand,
    pub cond: Option<Cond>,
}

impl Alu {
    pub fn new(
        op: AluOp,
        dst: RegField,
        a: RegField,
        b: impl Into<Operand>,
    ) -> Self {
        let a = if op.reads_a() { a } else { dst };
        let b = if op.reads_b() { b.into() } else { Operand::Imm(0) };
        Self { op, dst, a, b, cond: None }
    }

    pub fn mov(dst: RegField, src: impl Into<Operand>) -> Self {
        Self::new(AluOp::Mov, dst, dst, src)
    }

    pub fn rand16(dst: RegField) -> Self {
        Self::new(AluOp::Rand16, dst, dst, 0u16)
    }

    pub fn when(mut self, cmp: CmpOp, reg: RegField, imm: u8) -> Self {
        self.cond = Some(Cond { cmp, reg, imm });
        self
    }

    /// The register fields this operation reads, the destination
    /// included when a condition may leave it unchanged.
    pub fn reads(&self) -> impl Iterator<Item = RegField> {
        let a = self.op.reads_a().then_some(self.a);
        let b = match self.b {
            Operand::Reg(field) if self.op.reads_b() => Some(field),
            _ => None,
        };
        let cond = self.cond.map(|c| c.reg);
        let dst = self.cond.map(|_| self.dst);
        [a, b, cond, dst].into_iter().flatten()
    }

    fn validate(&self) -> Result<(), EncodeError> {
        self.dst.validate()?;
        self.a.validate()?;
        let dst_bytes = self.dst.width.bytes();

        match self.b {
            Operand::Reg(field) => field.validate()?,
            Operand::Imm(imm) => {
                if u32::from(imm) > self.dst.width.max_value() {
                    return Err(EncodeError::ImmTooWide {
                        imm,
                        width: dst_bytes,
                    });
                }
            }
        }

        if self.op.is_csum() {
            let mut widths = [Some(self.dst.width), Some(self.a.width), None];
            if let Operand::Reg(field) = self.b {
                widths[2] = Some(field.width);
            }
            if let Some(bad) =
                widths.into_iter().flatten().find(|w| *w != Width::W16)
            {
                return Err(EncodeError::BadCsumWidth(bad.bytes()));
            }
        }

        if self.op == AluOp::Rand16 && self.dst.width != Width::W16 {
            return Err(EncodeError::WidthMismatch {
                have: dst_bytes,
                want: 2,
            });
        }

        if let Some(cond) = self.cond {
            cond.reg.validate()?;
            if !cond.reg.is_cmp() {
                return Err(EncodeError::NotCmpReg(cond.reg.reg));
            }
        }

        Ok(())
    }

    fn encode(&self) -> Result<u64, EncodeError> {
        self.validate()?;
        let mut word = ((self.op as u64) << ALU_OP_SHIFT)
            | (self.dst.encode()? << ALU_DST_SHIFT)
            | (self.a.encode()? << ALU_A_SHIFT);

        word |= match self.b {
            Operand::Reg(field) => field.encode()? << ALU_B_SHIFT,
            Operand::Imm(imm) => {
                ALU_B_IMM_BIT | (u64::from(imm) << ALU_B_SHIFT)
            }
        };

        if let Some(cond) = self.cond {
            word |= ALU_COND_BIT
                | ((cond.cmp as u64) << ALU_CMP_SHIFT)
                | (cond.reg.encode()? << ALU_CMP_REG_SHIFT)
                | (u64::from(cond.imm) << ALU_CMP_IMM_SHIFT);
        }

        Ok(word)
    }

    fn decode(word: u64) -> Result<Self, EncodeError> {
        let op = AluOp::from_raw(bits(word, ALU_OP_SHIFT, 4) as u8)?;
        let dst = RegField::decode(bits(word, ALU_DST_SHIFT, 8))?;
        let a = RegField::decode(bits(word, ALU_A_SHIFT, 8))?;
        let b_raw = bits(word, ALU_B_SHIFT, 16);
        let b = if word & ALU_B_IMM_BIT != 0 {
            Operand::Imm(b_raw as u16)
        } else {
            Operand::Reg(RegField::decode(b_raw)?)
        };

        let cond = if word & ALU_COND_BIT != 0 {
            Some(Cond {
                cmp: CmpOp::from_raw(bits(word, ALU_CMP_SHIFT, 3) as u8)?,
                reg: RegField::decode(bits(word, ALU_CMP_REG_SHIFT, 8))?,
                imm: bits(word, ALU_CMP_IMM_SHIFT, 8) as u8,
            })
        } else {
            None
        };

        let alu = Self { op, dst, a, b, cond };
        alu.validate()?;
        Ok(alu)
    }
}

impl Display for Alu {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:<9}{}", self.op.mnemonic(), self.dst)?;
        if self.op.reads_a() {
            write!(f, ", {}", self.a)?;
        }
        if self.op.reads_b() {
            write!(f, ", {}", self.b)?;
        }
        if let Some(cond) = self.cond {
            write!(f, " if {} {} {:#x}", cond.reg, cond.cmp, cond.imm)?;
        }
        Ok(())
    }
}

/// One micro-operation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Op {
    Nop,
    /// Fetch a sideband field into a register.
    SiToReg { src: SiField, dst: RegField },
    /// Fetch a packet field into a register.
    PktToReg { src: PktField, dst: RegField },
    Alu(Alu),
    /// Make a register field written elsewhere visible to this lane.
    Sync { field: RegField },
    /// Store a register into the packet.
    RegToPkt { src: RegField, dst: PktField },
    /// Replace the start of the packet with the header template.
    Replace(Replace),
    /// Store a register into the header template.
    RegToNhdr { src: RegField, dst: NhdrField },
    /// Write the sideband NAT addresses, and optionally ports, into
    /// the IPv4 header at `layer` and the L4 header following it.
    NatCopy { layer: Layer, ports: bool },
}

fn check_range(
    space: &'static str,
    off: u8,
    width: Width,
    limit: u16,
) -> Result<(), EncodeError> {
    if u16::from(off) + u16::from(width.bytes()) > limit {
        return Err(EncodeError::OffsetOutOfRange {
            space,
            off,
            width: width.bytes(),
        });
    }
    Ok(())
}

fn check_pkt_field(field: &PktField) -> Result<(), EncodeError> {
    match field.layer {
        Layer::Desc => {
            check_range("descriptor", field.off, field.width, DESC_LEN.into())
        }
        _ => check_range("packet", field.off, field.width, 256),
    }
}

fn check_width(reg: RegField, want: Width) -> Result<(), EncodeError> {
    if reg.width != want {
        return Err(EncodeError::WidthMismatch {
            have: reg.width.bytes(),
            want: want.bytes(),
        });
    }
    Ok(())
}

impl Op {
    fn validate(&self) -> Result<(), EncodeError> {
        match self {
            Self::Nop | Self::Replace(_) => Ok(()),

            Self::SiToReg { src, dst } => {
                dst.validate()?;
                check_width(*dst, src.width)?;
                check_range(
                    "sideband",
                    src.off,
                    src.width,
                    SIDEBAND_LEN.into(),
                )
            }

            Self::PktToReg { src, dst } => {
                dst.validate()?;
                check_width(*dst, src.width)?;
                check_pkt_field(src)
            }

            Self::Alu(alu) => alu.validate(),

            Self::Sync { field } => field.validate(),

            Self::RegToPkt { src, dst } => {
                src.validate()?;
                check_width(*src, dst.width)?;
                if dst.layer == Layer::Desc {
                    return Err(EncodeError::ReadOnlyLayer(dst.layer));
                }
                check_pkt_field(dst)
            }

            Self::RegToNhdr { src, dst } => {
                src.validate()?;
                check_range("template", dst.off, src.width, 256)
            }

            Self::NatCopy { layer, .. } => match layer {
                Layer::L3 | Layer::InnerL3 => Ok(()),
                _ => Err(EncodeError::BadNatLayer(*layer)),
            },
        }
    }

    fn opcode(&self) -> Opcode {
        match self {
            Self::Nop => Opcode::Nop,
            Self::SiToReg { .. } => Opcode::SiToReg,
            Self::PktToReg { .. } => Opcode::PktToReg,
            Self::Alu(_) => Opcode::Alu,
            Self::Sync { .. } => Opcode::Sync,
            Self::RegToPkt { .. } => Opcode::RegToPkt,
            Self::Replace(_) => Opcode::Replace,
            Self::RegToNhdr { .. } => Opcode::RegToNhdr,
            Self::NatCopy { .. } => Opcode::NatCopy,
        }
    }

    /// The operation-specific bits 57..0.
    fn encode_fields(&self) -> Result<u64, EncodeError> {
        self.validate()?;
        let fields = match self {
            Self::Nop => 0,

            Self::SiToReg { src, dst } => {
                (u64::from(src.off) << 50)
                    | (src.width.code() << 48)
                    | (dst.encode()? << 40)
            }

            Self::PktToReg { src, dst } => {
                (src.layer.code() << 55)
                    | (u64::from(src.off) << 47)
                    | (src.width.code() << 45)
                    | (dst.encode()? << 37)
            }

            Self::Alu(alu) => alu.encode()?,

            Self::Sync { field } => field.encode()? << 50,

            Self::RegToPkt { src, dst } => {
                (src.encode()? << 50)
                    | (dst.layer.code() << 47)
                    | (u64::from(dst.off) << 39)
            }

            Self::Replace(rep) => {
                (rep.strip.code() << 56) | (u64::from(rep.extra) << 48)
            }

            Self::RegToNhdr { src, dst } => {
                (src.encode()? << 50)
                    | (dst.layer.code() << 48)
                    | (u64::from(dst.off) << 40)
            }

            Self::NatCopy { layer, ports } => {
                (layer.code() << 55) | (u64::from(*ports) << 54)
            }
        };
        Ok(fields)
    }

    fn decode_fields(opcode: Opcode, word: u64) -> Result<Self, EncodeError> {
        let layer = |shift| {
            let code = bits(word, shift, 3);
            Layer::from_code(code).ok_or(EncodeError::BadLayer(code as u8))
        };

        let op = match opcode {
            Opcode::Nop => Self::Nop,

            Opcode::SiToReg => Self::SiToReg {
                src: SiField {
                    off: bits(word, 50, 8) as u8,
                    width: Width::from_code(bits(word, 48, 2))?,
                },
                dst: RegField::decode(bits(word, 40, 8))?,
            },

            Opcode::PktToReg => Self::PktToReg {
                src: PktField {
                    layer: layer(55)?,
                    off: bits(word, 47, 8) as u8,
                    width: Width::from_code(bits(word, 45, 2))?,
                },
                dst: RegField::decode(bits(word, 37, 8))?,
            },

            Opcode::Alu => Self::Alu(Alu::decode(word)?),

            Opcode::Sync => {
                Self::Sync { field: RegField::decode(bits(word, 50, 8))? }
            }

            Opcode::RegToPkt => {
                let src = RegField::decode(bits(word, 50, 8))?;
                Self::RegToPkt {
                    src,
                    dst: PktField {
                        layer: layer(47)?,
                        off: bits(word, 39, 8) as u8,
                        width: src.width,
                    },
                }
            }

            Opcode::Replace => {
                let code = bits(word, 56, 2);
                Self::Replace(Replace {
                    strip: StripOffset::from_code(code)
                        .ok_or(EncodeError::BadStrip(code as u8))?,
                    extra: bits(word, 48, 8) as u8,
                })
            }

            Opcode::RegToNhdr => Self::RegToNhdr {
                src: RegField::decode(bits(word, 50, 8))?,
                dst: NhdrField {
                    layer: NhdrLayer::from_code(bits(word, 48, 2)),
                    off: bits(word, 40, 8) as u8,
                },
            },

            Opcode::NatCopy => Self::NatCopy {
                layer: layer(55)?,
                ports: bits(word, 54, 1) != 0,
            },
        };

        op.validate()?;
        Ok(op)
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Nop => write!(f, "nop"),
            Self::SiToReg { src, dst } => {
                write!(f, "{:<9}{}, {}", "fetch", dst, src)
            }
            Self::PktToReg { src, dst } => {
                write!(f, "{:<9}{}, {}", "fetch", dst, src)
            }
            Self::Alu(alu) => write!(f, "{}", alu),
            Self::Sync { field } => write!(f, "{:<9}{}", "sync", field),
            Self::RegToPkt { src, dst } => {
                write!(f, "{:<9}{}, {}", "store", dst, src)
            }
            Self::Replace(rep) => write!(f, "{:<9}{}", "replace", rep),
            Self::RegToNhdr { src, dst } => {
                write!(f, "{:<9}{}, {}", "store", dst, src)
            }
            Self::NatCopy { layer, ports } => {
                let what = if *ports { "addrs+ports" } else { "addrs" };
                write!(f, "{:<9}{}, {}", "nat_copy", layer, what)
            }
        }
    }
}

/// An operation, the lane it runs on, and whether it ends the
/// program.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Insn {
    pub lane: Lane,
    pub last: bool,
    pub op: Op,
}

impl Insn {
    /// The terminator every program ends with.
    pub const COMPLETE: Self = Self { lane: Lane::A, last: true, op: Op::Nop };

    pub const fn new(lane: Lane, op: Op) -> Self {
        Self { lane, last: false, op }
    }

    pub fn is_complete(&self) -> bool {
        self.last && self.op == Op::Nop
    }

    pub fn encode(&self) -> Result<u64, EncodeError> {
        let fields = self.op.encode_fields()?;
        let mut word = ((self.op.opcode() as u64) << OPCODE_SHIFT) | fields;
        if self.last {
            word |= LAST_BIT;
        }
        if self.lane == Lane::B {
            word |= LANE_BIT;
        }
        Ok(word)
    }

    pub fn decode(word: u64) -> Result<Self, EncodeError> {
        let opcode = Opcode::from_raw(bits(word, OPCODE_SHIFT, 4) as u8)?;
        Ok(Self {
            lane: if word & LANE_BIT != 0 { Lane::B } else { Lane::A },
            last: word & LAST_BIT != 0,
            op: Op::decode_fields(opcode, word)?,
        })
    }
}

impl Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_complete() {
            return write!(f, "-  complete");
        }
        write!(f, "{}  {}", self.lane, self.op)?;
        if self.last {
            write!(f, " (last)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::layout::ipv4;
    use crate::engine::layout::udp;

    fn r(reg: u8, width: Width) -> RegField {
        RegField::low(reg, width)
    }

    #[test]
    fn complete_word() {
        let word = Insn::COMPLETE.encode().unwrap();
        assert_eq!(word, LAST_BIT);
        assert!(Insn::decode(word).unwrap().is_complete());
    }

    #[test]
    fn decode_inverts_encode() {
        let ops = [
            Op::SiToReg { src: SiField::L3_CSUM_DELTA, dst: r(3, Width::W16) },
            Op::PktToReg {
                src: ipv4::TTL.at(Layer::InnerL3),
                dst: r(0, Width::W8),
            },
            Op::Alu(
                Alu::new(
                    AluOp::CsumAdd,
                    r(2, Width::W16),
                    r(2, Width::W16),
                    0x1234u16,
                )
                .when(CmpOp::Ne, r(14, Width::W16), 0),
            ),
            Op::Alu(Alu::rand16(r(5, Width::W16))),
            Op::Alu(Alu::mov(r(1, Width::W8), r(9, Width::W8))),
            Op::Sync { field: RegField::new(7, 0, Width::W16) },
            Op::RegToPkt {
                src: r(4, Width::W16),
                dst: udp::CSUM.at(Layer::L4),
            },
            Op::Replace(Replace { strip: StripOffset::UpToL4, extra: 8 }),
            Op::RegToNhdr {
                src: r(6, Width::W32),
                dst: ipv4::SRC.nhdr(NhdrLayer::L3),
            },
            Op::NatCopy { layer: Layer::InnerL3, ports: true },
        ];

        for op in ops {
            for lane in [Lane::A, Lane::B] {
                let insn = Insn::new(lane, op);
                let word = insn.encode().unwrap();
                assert_eq!(Insn::decode(word), Ok(insn), "{}", insn);
            }
        }
    }

    #[test]
    fn encode_rejects_bad_fields() {
        let narrow = Alu::new(
            AluOp::CsumSub,
            r(2, Width::W8),
            r(2, Width::W8),
            1u16,
        );
        assert_eq!(narrow.encode(), Err(EncodeError::BadCsumWidth(1)));

        let gp_cond = Alu::mov(r(2, Width::W16), 1u16).when(
            CmpOp::Eq,
            r(3, Width::W16),
            0,
        );
        assert_eq!(gp_cond.encode(), Err(EncodeError::NotCmpReg(3)));

        let wide_imm = Alu::mov(r(2, Width::W8), 0x100u16);
        assert!(matches!(
            wide_imm.encode(),
            Err(EncodeError::ImmTooWide { .. })
        ));

        let mismatch =
            Op::SiToReg { src: SiField::NHDR_LEN, dst: r(0, Width::W16) };
        assert_eq!(
            Insn::new(Lane::A, mismatch).encode(),
            Err(EncodeError::WidthMismatch { have: 2, want: 1 })
        );

        let desc_store = Op::RegToPkt {
            src: r(0, Width::W16),
            dst: PktField { layer: Layer::Desc, off: 0, width: Width::W16 },
        };
        assert_eq!(
            Insn::new(Lane::A, desc_store).encode(),
            Err(EncodeError::ReadOnlyLayer(Layer::Desc))
        );

        let nat = Op::NatCopy { layer: Layer::L4, ports: false };
        assert_eq!(
            Insn::new(Lane::A, nat).encode(),
            Err(EncodeError::BadNatLayer(Layer::L4))
        );

        let bad_reg = Op::Sync { field: RegField::new(16, 0, Width::W32) };
        assert_eq!(
            Insn::new(Lane::A, bad_reg).encode(),
            Err(EncodeError::BadReg(16))
        );
    }

    #[test]
    fn decode_rejects_unknown_opcode() {
        assert_eq!(Insn::decode(0xF << 60), Err(EncodeError::BadOpcode(0xF)));
    }

    #[test]
    fn alu_reads() {
        let alu = Alu::new(
            AluOp::Add,
            r(1, Width::W16),
            r(2, Width::W16),
            r(3, Width::W16),
        );
        assert_eq!(alu.reads().count(), 2);
        let guarded = alu.when(CmpOp::Eq, r(15, Width::W8), 0);
        let reads: Vec<_> = guarded.reads().map(|f| f.reg).collect();
        assert_eq!(reads, vec![2, 3, 15, 1]);
        assert_eq!(Alu::rand16(r(1, Width::W16)).reads().count(), 0);
    }

    #[test]
    fn alu_semantics_truncate() {
        assert_eq!(AluOp::Add.apply(0xFF, 2, Width::W8), 1);
        assert_eq!(AluOp::Sub.apply(0, 1, Width::W16), 0xFFFF);
        assert_eq!(AluOp::Shl.apply(0x40, 8, Width::W16), 0x4000);
        assert_eq!(AluOp::CsumAdd.apply(0xFFFF, 1, Width::W16), 1);
        assert!(CmpOp::Ge.eval(3, 3));
        assert!(!CmpOp::Lt.eval(3, 3));
    }
}
