// Copyright 2024 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Final linear algebra step: find a subset of relations whose product
//! is a square and extract a divisor from the congruence of squares.
//!
//! Relations are reduced modulo the original n (not kn): an equality
//! modulo kn implies the same equality modulo n, and only divisors of
//! n are interesting.

use std::collections::{BTreeMap, HashMap};

use bitvec_simd::BitVec;

use crate::arith::{self, pow_mod};
use crate::fbase::FBase;
use crate::matrix;
use crate::params::Diag;
use crate::relations::{Relation, SIGN_COL};
use crate::Uint;

pub fn final_step(
    n: &Uint,
    kn: &Uint,
    fb: &FBase,
    rels: &[Relation],
    diag: &Diag,
) -> Option<(Uint, Uint)> {
    for r in rels {
        debug_assert!(r.verify(kn, fb), "invalid relation x={}", r.x);
    }
    // Columns with a single odd occurrence can never cancel: drop
    // them and the relations using them.
    let mut occs = BTreeMap::<u32, u32>::new();
    for r in rels {
        for c in r.ev.odd_cols() {
            *occs.entry(c).or_insert(0) += 1;
        }
    }
    let idxs: Vec<u32> = occs
        .iter()
        .filter(|&(_, &k)| k > 1)
        .map(|(&c, _)| c)
        .collect();
    let col_of: HashMap<u32, usize> = idxs.iter().enumerate().map(|(i, &c)| (c, i)).collect();
    let size = idxs.len();
    let mut filt: Vec<&Relation> = vec![];
    let mut cols: Vec<BitVec> = vec![];
    'rel: for r in rels {
        let mut v = BitVec::zeros(size);
        for c in r.ev.odd_cols() {
            match col_of.get(&c) {
                Some(&i) => v.set(i, true),
                None => continue 'rel,
            }
        }
        filt.push(r);
        cols.push(v);
    }
    diag.verbose(format_args!(
        "Matrix size {size}x{} ({} relations dropped)",
        cols.len(),
        rels.len() - cols.len(),
    ));
    let ker = matrix::nullspace(cols);
    if ker.is_empty() {
        diag.info(format_args!("Found no square combination"));
        return None;
    }
    diag.verbose(format_args!("Nullspace dimension {}", ker.len()));
    for (i, v) in ker.iter().enumerate() {
        let (a, b) = combine(n, fb, &filt, v);
        debug_assert!((a * a) % n == (b * b) % n);
        if let Some((p, q)) = try_factor(n, a, b) {
            diag.verbose(format_args!("Divisor from kernel vector {i}"));
            return Some((p, q));
        }
    }
    diag.info(format_args!(
        "All {} kernel vectors gave trivial divisors",
        ker.len()
    ));
    None
}

/// Multiply the selected relations into a congruence a^2 = b^2 mod n.
fn combine(n: &Uint, fb: &FBase, rels: &[&Relation], v: &BitVec) -> (Uint, Uint) {
    let mut a = Uint::ONE;
    let mut exps = BTreeMap::<u32, u32>::new();
    let mut cofs = BTreeMap::<u64, u32>::new();
    for (idx, r) in rels.iter().enumerate() {
        if !v[idx] {
            continue;
        }
        a = (a * (r.x % n)) % n;
        for (c, e) in r.ev.iter() {
            *exps.entry(c).or_insert(0) += e;
        }
        for &(p, e) in &r.cofactors {
            *cofs.entry(p).or_insert(0) += e;
        }
    }
    // The product is a square: halve every exponent. The sign has an
    // even exponent and (-1)^(e/2) is absorbed by the symmetry of b.
    let mut b = Uint::ONE;
    for (&c, &e) in &exps {
        debug_assert!(e % 2 == 0);
        if c == SIGN_COL {
            continue;
        }
        let p = fb.p(c as usize - 1) as u64;
        b = (b * pow_mod(Uint::from(p), Uint::from(e / 2), *n)) % n;
    }
    for (&p, &e) in &cofs {
        debug_assert!(e % 2 == 0);
        b = (b * pow_mod(Uint::from(p), Uint::from(e / 2), *n)) % n;
    }
    (a, b)
}

fn try_factor(n: &Uint, a: Uint, b: Uint) -> Option<(Uint, Uint)> {
    for c in [a + b, n + a - b] {
        let g = arith::gcd(c % n, *n);
        if g != Uint::ONE && g != *n {
            return Some((g, n / g));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::ExponentVector;

    // Column index of a prime in the factor base.
    fn col(fb: &FBase, p: u32) -> (usize, u32) {
        let idx = fb.primes.iter().position(|&q| q == p).unwrap();
        (idx, idx as u32 + 1)
    }

    #[test]
    fn test_final_step() {
        // 1649 = 17 * 97 with the textbook relations
        // 41^2 = 2^5 and 43^2 = 2^3 * 5^2 mod 1649.
        let n = Uint::from(1649u64);
        let fb = FBase::new(n, 10);
        let (i2, _) = col(&fb, 2);
        let (i5, _) = col(&fb, 5);
        let rels = vec![
            Relation {
                x: Uint::from(41u64),
                ev: ExponentVector::from_factors(false, &[(i2, 5)]),
                cofactors: vec![],
            },
            Relation {
                x: Uint::from(43u64),
                ev: ExponentVector::from_factors(false, &[(i2, 3), (i5, 2)]),
                cofactors: vec![],
            },
        ];
        let diag = Diag::new(crate::params::Verbosity::Silent);
        let (p, q) = final_step(&n, &n, &fb, &rels, &diag).unwrap();
        assert_eq!(p * q, n);
        assert!(p > Uint::ONE && q > Uint::ONE);
    }

    #[test]
    fn test_trivial_square() {
        // A relation that is already a square yields x = y and no
        // divisor.
        let n = Uint::from(1649u64);
        let fb = FBase::new(n, 10);
        let rels = vec![Relation {
            x: Uint::from(59u64),
            ev: ExponentVector::default(),
            cofactors: vec![(59, 2)],
        }];
        let diag = Diag::new(crate::params::Verbosity::Silent);
        assert!(final_step(&n, &n, &fb, &rels, &diag).is_none());
    }

    #[test]
    fn test_combine_cofactors() {
        // Large prime cofactors contribute to the square root.
        let n = Uint::from(1649u64);
        let fb = FBase::new(n, 10);
        let r = Relation {
            x: Uint::from(59u64),
            ev: ExponentVector::default(),
            cofactors: vec![(59, 2)],
        };
        let v = BitVec::from(vec![true].into_iter());
        let (a, b) = combine(&n, &fb, &[&r], &v);
        assert_eq!(a, Uint::from(59u64));
        assert_eq!(b, Uint::from(59u64));
    }
}
