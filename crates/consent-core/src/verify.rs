//! Chain verification.
//!
//! Walks a chain and checks, for every block after genesis, that it links to its
//! predecessor and that its stored hash matches its content. Verification never
//! repairs anything; a broken chain is reported and left as found.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{GENESIS_HASH, GENESIS_PREVIOUS_HASH};
use crate::{compute_hash, Block, LedgerError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidReason {
    EmptyChain,
    GenesisMismatch,
    LinkMismatch,
    HashMismatch,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvalidReason::EmptyChain => "empty-chain",
            InvalidReason::GenesisMismatch => "genesis-mismatch",
            InvalidReason::LinkMismatch => "link-mismatch",
            InvalidReason::HashMismatch => "hash-mismatch",
        };
        f.write_str(s)
    }
}

/// A single broken invariant, located by zero-based block index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub index: usize,
    pub reason: InvalidReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Verification {
    Valid,
    Invalid(Violation),
}

impl Verification {
    pub fn ensure_valid(self) -> Result<()> {
        match self {
            Verification::Valid => Ok(()),
            Verification::Invalid(v) => Err(LedgerError::Verification(v)),
        }
    }
}

/// Check the chain and stop at the first violation.
pub fn verify(blocks: &[Block]) -> Verification {
    match Violations::new(blocks).next() {
        None => Verification::Valid,
        Some(v) => Verification::Invalid(v),
    }
}

/// Every violation in the chain, in index order.
pub fn violations(blocks: &[Block]) -> Vec<Violation> {
    Violations::new(blocks).collect()
}

struct Violations<'a> {
    blocks: &'a [Block],
    next: usize,
    pending: Option<Violation>,
}

impl<'a> Violations<'a> {
    fn new(blocks: &'a [Block]) -> Self {
        let pending = blocks.is_empty().then_some(Violation {
            index: 0,
            reason: InvalidReason::EmptyChain,
        });
        Self {
            blocks,
            next: 0,
            pending,
        }
    }

    fn check(&self, index: usize) -> (Option<Violation>, Option<Violation>) {
        let block = &self.blocks[index];
        let at = |reason| Some(Violation { index, reason });
        if index == 0 {
            let sentinel = block.previous_hash == GENESIS_PREVIOUS_HASH && block.hash == GENESIS_HASH;
            return (if sentinel { None } else { at(InvalidReason::GenesisMismatch) }, None);
        }
        let link = if block.previous_hash != self.blocks[index - 1].hash {
            at(InvalidReason::LinkMismatch)
        } else {
            None
        };
        let content = match compute_hash(&block.timestamp, &block.data, &block.previous_hash) {
            Ok(h) if h == block.hash => None,
            _ => at(InvalidReason::HashMismatch),
        };
        (link, content)
    }
}

impl Iterator for Violations<'_> {
    type Item = Violation;

    fn next(&mut self) -> Option<Violation> {
        if let Some(v) = self.pending.take() {
            return Some(v);
        }
        while self.next < self.blocks.len() {
            let (first, second) = self.check(self.next);
            self.next += 1;
            match (first, second) {
                (Some(a), b) => {
                    self.pending = b;
                    return Some(a);
                }
                (None, Some(b)) => return Some(b),
                (None, None) => {}
            }
        }
        None
    }
}
