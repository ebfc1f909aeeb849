// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Checks over a finished program.
//!
//! The builder already refuses to emit an unsound instruction, but it
//! does so one instruction at a time. [`verify`] looks at the program
//! as it will sit in recipe memory, decoded from its words, and checks
//! the properties of the program as a whole. Bring-up runs it on every
//! recipe before anything is committed.

use super::isa::AluOp;
use super::isa::EncodeError;
use super::isa::Insn;
use super::isa::Op;
use super::isa::Operand;
use super::lane::SyncError;
use super::lane::SyncTracker;
use super::program::Program;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum VerifyError {
    #[error("word {index}: {source}")]
    Decode { index: usize, source: EncodeError },

    #[error("word {index}: {source}")]
    Sync { index: usize, source: SyncError },

    #[error("program does not end with complete")]
    MissingComplete,

    #[error("word {index}: complete before the end of the program")]
    EarlyComplete { index: usize },

    #[error("word {index}: rand16 result is not folded by the next word")]
    UnfoldedRand { index: usize },

    #[error("word {index}: more than one header replace")]
    DuplicateReplace { index: usize },
}

/// Does `next` fold the value `rand` generated into a checksum, on the
/// same lane?
fn folds_rand(rand: &Insn, next: Option<&Insn>) -> bool {
    let (Op::Alu(gen_op), Some(next)) = (rand.op, next) else {
        return false;
    };
    let Op::Alu(fold) = next.op else {
        return false;
    };

    next.lane == rand.lane
        && fold.op.is_csum()
        && fold.dst != gen_op.dst
        && (fold.b == Operand::Reg(gen_op.dst) || fold.a == gen_op.dst)
}

pub fn verify(prog: &Program) -> Result<(), VerifyError> {
    let insns = prog
        .insns()
        .enumerate()
        .map(|(index, r)| {
            r.map_err(|source| VerifyError::Decode { index, source })
        })
        .collect::<Result<Vec<Insn>, _>>()?;

    match insns.last() {
        Some(last) if last.is_complete() => {}
        _ => return Err(VerifyError::MissingComplete),
    }

    let mut tracker = SyncTracker::new();
    let mut replaced = false;
    let end = insns.len() - 1;

    for (index, insn) in insns.iter().enumerate() {
        if index != end && (insn.last || insn.is_complete()) {
            return Err(VerifyError::EarlyComplete { index });
        }

        tracker
            .step(insn)
            .map_err(|source| VerifyError::Sync { index, source })?;

        match insn.op {
            Op::Replace(_) if replaced => {
                return Err(VerifyError::DuplicateReplace { index });
            }
            Op::Replace(_) => replaced = true,
            Op::Alu(alu) if alu.op == AluOp::Rand16 => {
                if !folds_rand(insn, insns.get(index + 1)) {
                    return Err(VerifyError::UnfoldedRand { index });
                }
            }
            _ => {}
        }
    }

    Ok(())
}
