// Copyright 2024 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Relations describe an equation:
//! x^2 = product(pi^ki) * product(large primes) mod n
//!
//! The factor base part is stored as a sparse exponent vector whose
//! column 0 is the sign and column i (i >= 1) is the i-th factor base
//! prime. Large prime cofactors are kept separately: in a full
//! relation they always carry even exponents.

use std::collections::{BTreeMap, HashSet};

use crate::arith::pow_mod;
use crate::cycles::{CycleGraph, InsertOutcome, PartialRelation, ROOT_VERTEX};
use crate::fbase::FBase;
use crate::params::Diag;
use crate::Uint;

/// Sign column of exponent vectors.
pub const SIGN_COL: u32 = 0;

/// A sparse vector of (column, exponent) pairs, sorted by column.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExponentVector(Vec<(u32, u32)>);

impl ExponentVector {
    pub fn new(mut cols: Vec<(u32, u32)>) -> Self {
        cols.sort_unstable();
        cols.retain(|&(_, e)| e > 0);
        debug_assert!(cols.windows(2).all(|w| w[0].0 < w[1].0));
        ExponentVector(cols)
    }

    /// Build from trial division output: prime indices and exponents.
    pub fn from_factors(negative: bool, facs: &[(usize, u32)]) -> Self {
        let mut cols = Vec::with_capacity(facs.len() + 1);
        if negative {
            cols.push((SIGN_COL, 1));
        }
        for &(pidx, e) in facs {
            cols.push((pidx as u32 + 1, e));
        }
        ExponentVector::new(cols)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.0.iter().copied()
    }

    /// Columns with odd exponent (the GF(2) support).
    pub fn odd_cols(&self) -> impl Iterator<Item = u32> + '_ {
        self.0
            .iter()
            .filter(|&&(_, e)| e % 2 == 1)
            .map(|&(c, _)| c)
    }

    pub fn is_even(&self) -> bool {
        self.0.iter().all(|&(_, e)| e % 2 == 0)
    }

    /// Sum of two vectors (merge sorted columns).
    pub fn merge(&self, other: &Self) -> Self {
        let (a, b) = (&self.0, &other.0);
        let mut out = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].0.cmp(&b[j].0) {
                std::cmp::Ordering::Less => {
                    out.push(a[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(b[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    out.push((a[i].0, a[i].1 + b[j].1));
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&a[i..]);
        out.extend_from_slice(&b[j..]);
        ExponentVector(out)
    }
}

#[derive(Clone, Debug)]
pub struct Relation {
    pub x: Uint,
    pub ev: ExponentVector,
    // Large prime cofactors with even exponents, from cycle closures.
    pub cofactors: Vec<(u64, u32)>,
}

impl Relation {
    pub fn verify(&self, n: &Uint, fb: &FBase) -> bool {
        let mut prod = Uint::ONE;
        let mut negative = false;
        for (col, k) in self.ev.iter() {
            if col == SIGN_COL {
                negative = k % 2 == 1;
            } else {
                let p = fb.p(col as usize - 1) as u64;
                prod = (prod * pow_mod(Uint::from(p), Uint::from(k), *n)) % n;
            }
        }
        for &(p, k) in &self.cofactors {
            prod = (prod * pow_mod(Uint::from(p), Uint::from(k), *n)) % n;
        }
        if negative {
            prod = n - prod;
        }
        (self.x * self.x) % n == prod
    }
}

/// Collects relations produced by sieving. Full relations are stored
/// after deduplication, partial relations feed the cycle graph and
/// come back as full relations when a cycle closes.
pub struct RelationSet {
    pub n: Uint,
    pub maxlarge: u64,
    pub complete: Vec<Relation>,
    seen: HashSet<ExponentVector>,
    graph: CycleGraph,
    pub n_smooths: usize,
    pub n_partials: usize,
    pub n_doubles: usize,
    pub n_cycles: usize,
    pub n_duplicates: usize,
}

impl RelationSet {
    pub fn new(n: Uint, maxlarge: u64) -> Self {
        RelationSet {
            n,
            maxlarge,
            complete: vec![],
            seen: HashSet::new(),
            graph: CycleGraph::new(),
            n_smooths: 0,
            n_partials: 0,
            n_doubles: 0,
            n_cycles: 0,
            n_duplicates: 0,
        }
    }

    pub fn into_inner(self) -> Vec<Relation> {
        self.complete
    }

    pub fn len(&self) -> usize {
        self.complete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.complete.is_empty()
    }

    /// Number of extra relations still needed to expect a nonzero
    /// nullspace (distinct odd columns minus relation count).
    pub fn gap(&self) -> usize {
        if self.complete.is_empty() {
            return 1000; // infinity
        }
        let mut cols = HashSet::new();
        for r in &self.complete {
            for c in r.ev.odd_cols() {
                cols.insert(c);
            }
        }
        cols.len().saturating_sub(self.complete.len())
    }

    pub fn log_progress(&self, diag: &Diag, prefix: &str) {
        diag.verbose(format_args!(
            "{prefix} found {} relations (smooth={} partial={} double={} cycles={} dup={} graph {}v/{}e)",
            self.len(),
            self.n_smooths,
            self.n_partials,
            self.n_doubles,
            self.n_cycles,
            self.n_duplicates,
            self.graph.n_vertices(),
            self.graph.n_edges(),
        ))
    }

    /// Record a sieve report. The cofactor pair is (1, 1) for a fully
    /// smooth value, (p, 1) for a single large prime, (p, q) for a
    /// split double large prime (possibly p == q).
    pub fn add(&mut self, x: Uint, ev: ExponentVector, pq: (u64, u64)) {
        match pq {
            (1, 1) => {
                self.n_smooths += 1;
                self.push_full(Relation {
                    x,
                    ev,
                    cofactors: vec![],
                });
            }
            (p, q) if p == q => {
                // A square cofactor is already even.
                self.n_doubles += 1;
                self.push_full(Relation {
                    x,
                    ev,
                    cofactors: vec![(p, 2)],
                });
            }
            (p, q) => {
                if q == ROOT_VERTEX {
                    self.n_partials += 1;
                } else {
                    self.n_doubles += 1;
                }
                let pr = PartialRelation { x, ev, p, q };
                match self.graph.insert_or_close(pr) {
                    InsertOutcome::Inserted => {}
                    InsertOutcome::Duplicate(_) => self.n_duplicates += 1,
                    InsertOutcome::Cycle(closing, edges) => {
                        let rel = self.close_cycle(closing, edges);
                        self.n_cycles += 1;
                        self.push_full(rel);
                    }
                }
            }
        }
    }

    fn push_full(&mut self, r: Relation) {
        if !self.seen.insert(r.ev.clone()) {
            self.n_duplicates += 1;
            return;
        }
        self.complete.push(r);
    }

    // Multiply the closing relation with the relations along the
    // removed path. Each cycle vertex has even degree so large primes
    // get even exponents.
    fn close_cycle(&self, closing: PartialRelation, edges: Vec<PartialRelation>) -> Relation {
        let mut counts = BTreeMap::<u64, u32>::new();
        let bump = |counts: &mut BTreeMap<u64, u32>, p: u64| {
            *counts.entry(p).or_insert(0) += 1;
        };
        let mut x = closing.x % self.n;
        let mut ev = closing.ev;
        bump(&mut counts, closing.p);
        bump(&mut counts, closing.q);
        for e in edges {
            x = (x * (e.x % self.n)) % self.n;
            ev = ev.merge(&e.ev);
            bump(&mut counts, e.p);
            bump(&mut counts, e.q);
        }
        counts.remove(&ROOT_VERTEX);
        debug_assert!(counts.values().all(|&c| c % 2 == 0));
        Relation {
            x,
            ev,
            cofactors: counts.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_exponent_vector() {
        let ev = ExponentVector::from_factors(true, &[(0, 3), (4, 1), (2, 2)]);
        let cols: Vec<_> = ev.iter().collect();
        assert_eq!(cols, vec![(0, 1), (1, 3), (3, 2), (5, 1)]);
        assert_eq!(ev.odd_cols().collect::<Vec<_>>(), vec![0, 1, 5]);
        assert!(!ev.is_even());

        let sum = ev.merge(&ev);
        assert!(sum.is_even());
        assert_eq!(sum.odd_cols().count(), 0);

        let other = ExponentVector::new(vec![(1, 1), (7, 2)]);
        let sum = ev.merge(&other);
        assert_eq!(
            sum.iter().collect::<Vec<_>>(),
            vec![(0, 1), (1, 4), (3, 2), (5, 1), (7, 2)]
        );
    }

    #[test]
    fn test_verify() {
        // 8051 = 83 * 97, multiplier 1.
        let n = Uint::from(8051u64);
        let fb = FBase::new(n, 10);
        // x = 91: 91^2 - 8051 = 230 = 2 * 5 * 23
        let mut facs = vec![];
        for (idx, &p) in fb.primes.iter().enumerate() {
            let mut e = 0;
            let mut v = 230u64;
            while v % p as u64 == 0 {
                v /= p as u64;
                e += 1;
            }
            if e > 0 {
                facs.push((idx, e));
            }
        }
        let r = Relation {
            x: Uint::from(91u64),
            ev: ExponentVector::from_factors(false, &facs),
            cofactors: vec![],
        };
        assert!(r.verify(&n, &fb));
        // Wrong sign fails.
        let bad = Relation {
            ev: ExponentVector::from_factors(true, &facs),
            ..r.clone()
        };
        assert!(!bad.verify(&n, &fb));
    }

    #[test]
    fn test_duplicate_full() {
        let n = Uint::from_str("10000000089000000133").unwrap();
        let mut rs = RelationSet::new(n, 1 << 30);
        let ev = ExponentVector::new(vec![(1, 1), (3, 2)]);
        rs.add(Uint::from(1234u64), ev.clone(), (1, 1));
        rs.add(Uint::from(5678u64), ev.clone(), (1, 1));
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.n_duplicates, 1);
        // A different vector is kept.
        rs.add(Uint::from(91u64), ExponentVector::new(vec![(2, 1)]), (1, 1));
        assert_eq!(rs.len(), 2);
    }

    #[test]
    fn test_partial_combination() {
        let n = Uint::from_str("10000000089000000133").unwrap();
        let mut rs = RelationSet::new(n, 1 << 30);
        // Two partials with the same large prime close a cycle.
        rs.add(
            Uint::from(1001u64),
            ExponentVector::new(vec![(2, 1)]),
            (100003, 1),
        );
        assert_eq!(rs.len(), 0);
        rs.add(
            Uint::from(1003u64),
            ExponentVector::new(vec![(3, 1)]),
            (100003, 1),
        );
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.n_cycles, 1);
        let r = &rs.complete[0];
        assert_eq!(r.cofactors, vec![(100003, 2)]);
        assert_eq!(r.x, (Uint::from(1001u64) * Uint::from(1003u64)) % n);
        assert_eq!(r.ev.odd_cols().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_double_chain() {
        let n = Uint::from_str("10000000089000000133").unwrap();
        let mut rs = RelationSet::new(n, 1 << 30);
        // A double (p, q) bridged by two single partials.
        rs.add(
            Uint::from(11u64),
            ExponentVector::new(vec![(1, 1)]),
            (100003, 100019),
        );
        rs.add(
            Uint::from(13u64),
            ExponentVector::new(vec![(2, 1)]),
            (100003, 1),
        );
        assert_eq!(rs.len(), 0);
        rs.add(
            Uint::from(17u64),
            ExponentVector::new(vec![(3, 1)]),
            (100019, 1),
        );
        assert_eq!(rs.len(), 1);
        let r = &rs.complete[0];
        assert_eq!(r.cofactors, vec![(100003, 2), (100019, 2)]);
        assert!(r.ev.odd_cols().eq([1, 2, 3]));
    }

    #[test]
    fn test_square_cofactor() {
        let n = Uint::from_str("10000000089000000133").unwrap();
        let mut rs = RelationSet::new(n, 1 << 30);
        rs.add(
            Uint::from(11u64),
            ExponentVector::new(vec![(1, 1)]),
            (100003, 100003),
        );
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.complete[0].cofactors, vec![(100003, 2)]);
    }

    #[test]
    fn test_gap() {
        let n = Uint::from(8051u64);
        let mut rs = RelationSet::new(n, 1 << 20);
        assert_eq!(rs.gap(), 1000);
        rs.add(
            Uint::from(3u64),
            ExponentVector::new(vec![(1, 1), (2, 1), (3, 1)]),
            (1, 1),
        );
        assert_eq!(rs.gap(), 2);
        rs.add(
            Uint::from(5u64),
            ExponentVector::new(vec![(1, 1), (2, 1)]),
            (1, 1),
        );
        assert_eq!(rs.gap(), 1);
        rs.add(Uint::from(7u64), ExponentVector::new(vec![(3, 2)]), (1, 1));
        assert_eq!(rs.gap(), 0);
    }
}
