// Copyright 2024 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt;

pub mod arith;
pub mod cycles;
pub mod fbase;
pub mod matrix;
pub mod params;
pub mod relations;
pub mod sieve;
pub mod solve;
pub mod squfof;

// The sieve implementation
pub mod siqs;

// We need to multiply residues modulo the input number without
// overflow, so integers are twice as wide as the largest input.
pub type Int = arith::I1024;
pub type Uint = arith::U1024;

/// Largest accepted input size in bits. Products of two reduced
/// residues must fit in `Uint`.
pub const MAX_BITS: u32 = 448;

/// Terminal outcomes of a factoring attempt.
///
/// Running out of relations or of nullspace vectors is an expected
/// negative result, not a panic: the caller is free to retry with
/// other parameters or another algorithm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    /// The sieve or the linear algebra was exhausted without
    /// producing a nontrivial divisor.
    NoDivisorFound,
    /// A factor base prime divides the input. The caller should have
    /// removed small factors beforehand.
    UnexpectedFactor(u64),
    /// Input exceeds [`MAX_BITS`].
    InputTooLarge(u32),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::NoDivisorFound => write!(f, "no divisor found"),
            Failure::UnexpectedFactor(p) => write!(f, "unexpected small factor {p}"),
            Failure::InputTooLarge(bits) => {
                write!(f, "input size ({bits} bits) exceeds {MAX_BITS} bits limit")
            }
        }
    }
}

impl std::error::Error for Failure {}
