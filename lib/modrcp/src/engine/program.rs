// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Recipe programs.

use super::isa::EncodeError;
use super::isa::Insn;
use core::fmt;
use core::fmt::Display;
use heapless::Vec as HVec;
use thiserror::Error;

/// The most instruction words a single recipe may hold.
pub const RECIPE_MAX_INSNS: usize = 64;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("program exceeds {RECIPE_MAX_INSNS} instructions")]
pub struct ProgramFull;

/// The encoded instruction words of one recipe, in execution order.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Program {
    words: HVec<u64, RECIPE_MAX_INSNS>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_words(words: &[u64]) -> Result<Self, ProgramFull> {
        Ok(Self { words: HVec::from_slice(words).map_err(|_| ProgramFull)? })
    }

    pub fn push(&mut self, word: u64) -> Result<(), ProgramFull> {
        self.words.push(word).map_err(|_| ProgramFull)
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Decode the program back into instructions.
    pub fn insns(&self) -> impl Iterator<Item = Result<Insn, EncodeError>> {
        self.words.iter().map(|w| Insn::decode(*w))
    }

    /// The program as it is laid out in recipe memory: each word in
    /// little-endian byte order.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

/// Disassembly, one instruction per line.
impl Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, word) in self.words.iter().enumerate() {
            match Insn::decode(*word) {
                Ok(insn) => writeln!(f, "{:>3}: {}", i, insn)?,
                Err(e) => writeln!(f, "{:>3}: {:#018x} <{}>", i, word, e)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bounded() {
        let mut prog = Program::new();
        for _ in 0..RECIPE_MAX_INSNS {
            prog.push(0).unwrap();
        }
        assert_eq!(prog.push(0), Err(ProgramFull));
        assert_eq!(prog.len(), RECIPE_MAX_INSNS);
        assert!(Program::from_words(&[0; RECIPE_MAX_INSNS + 1]).is_err());
    }

    #[test]
    fn bytes_are_little_endian() {
        let prog = Program::from_words(&[Insn::COMPLETE.encode().unwrap()])
            .unwrap();
        assert_eq!(prog.to_bytes(), vec![0, 0, 0, 0, 0, 0, 0, 0x08]);
        assert_eq!(prog.to_string(), "  0: -  complete\n");
    }
}
