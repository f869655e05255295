// Copyright 2024 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Factor base construction: prime generation, multiplier selection
//! (Knuth-Schroeppel) and trial division of sieve reports.

use std::cmp::max;

use num_traits::ToPrimitive;

use crate::arith::{self, Dividers};
use crate::{Failure, Uint};

/// A factor base for input kn, holding for each prime p a square root
/// of kn mod p and precomputed division helpers. Fields are parallel
/// vectors for memory locality.
#[derive(Clone, Debug)]
pub struct FBase {
    pub primes: Vec<u32>,
    // Square roots of kn.
    pub sqrts: Vec<u32>,
    pub divs: Vec<Dividers>,
}

impl FBase {
    /// Build a factor base of (at most) `size` primes p such that kn
    /// is a quadratic residue mod p.
    pub fn new(kn: Uint, size: u32) -> Self {
        let candidates = primes(2 * size);
        let mut primes = Vec::with_capacity(size as usize);
        let mut sqrts = Vec::with_capacity(size as usize);
        let mut divs = Vec::with_capacity(size as usize);
        for &p in &candidates {
            if primes.len() == size as usize {
                break;
            }
            let div = Dividers::new(p);
            let r = if p == 2 {
                // kn is odd, 1 is always a square root mod 2.
                1
            } else {
                let knp = div.mod_uint(&kn);
                match arith::sqrt_mod(knp, p as u64) {
                    Some(r) => r,
                    None => continue,
                }
            };
            primes.push(p);
            sqrts.push(r as u32);
            divs.push(div);
        }
        FBase {
            primes,
            sqrts,
            divs,
        }
    }

    /// Report a factor base prime dividing n itself (not the
    /// multiplier). Such a prime is a divisor of the input and the
    /// sieve assumes it was removed beforehand.
    pub fn check_divisors(&self, n: &Uint) -> Result<(), Failure> {
        for (idx, &r) in self.sqrts.iter().enumerate() {
            let p = self.primes[idx];
            if r == 0 && p > MAX_MULTIPLIER && self.divs[idx].mod_uint(n) == 0 {
                return Err(Failure::UnexpectedFactor(p as u64));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.primes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primes.is_empty()
    }

    /// Largest factor base prime.
    pub fn bound(&self) -> u32 {
        *self.primes.last().unwrap()
    }

    pub fn p(&self, idx: usize) -> u32 {
        self.primes[idx]
    }

    pub fn r(&self, idx: usize) -> u32 {
        self.sqrts[idx]
    }

    pub fn div(&self, idx: usize) -> &Dividers {
        &self.divs[idx]
    }

    pub fn prime(&self, idx: usize) -> Prime<'_> {
        Prime {
            p: self.primes[idx] as u64,
            r: self.sqrts[idx] as u64,
            div: &self.divs[idx],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Prime<'a> {
    pub p: u64, // prime number
    pub r: u64, // square root of kn
    pub div: &'a Dividers,
}

pub const SMALL_PRIMES: [u64; 46] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
    101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191, 193,
    197, 199,
];

const MAX_MULTIPLIER: u32 = 200;

/// Selects k such that kn is a quadratic residue modulo many small
/// primes. The score is the expected bit length of the smooth part of
/// sieved values (Knuth-Schroeppel), corrected by the sqrt(k) growth
/// of polynomial values.
pub fn select_multiplier(n: Uint) -> (u32, f64) {
    // Squares modulo each small prime.
    let mut modsquares = [[false; 256]; SMALL_PRIMES.len()];
    for (i, &p) in SMALL_PRIMES.iter().enumerate() {
        for x in 0..=p / 2 {
            modsquares[i][((x * x) % p) as usize] = true;
        }
    }
    let divs: Vec<Dividers> = SMALL_PRIMES.iter().map(|&p| Dividers::new(p as u32)).collect();
    let mut best: u32 = 1;
    let mut best_score = f64::MIN;
    for k in 1..MAX_MULTIPLIER {
        let mag = expected_smooth_magnitude(&(n * Uint::from(k)), &divs, &modsquares);
        // A multiplier k increases the size of sieved values by sqrt(k).
        let mag = (mag - 0.5 * (k as f64).ln()) / std::f64::consts::LN_2;
        if mag > best_score {
            best_score = mag;
            best = k;
        }
    }
    (best, best_score)
}

/// Expected number of bits removed by small primes from a sieved
/// value, following the Knuth-Schroeppel formula. The weight of an
/// odd prime p is corrected to denominator p-1 to account for prime
/// powers.
///
/// Reference: [Silverman, section 5]
fn expected_smooth_magnitude(kn: &Uint, divs: &[Dividers], modsquares: &[[bool; 256]]) -> f64 {
    let mut res: f64 = 0.0;
    for ((pidx, &p), div) in SMALL_PRIMES.iter().enumerate().zip(divs) {
        let knp: u64 = div.mod_uint(kn);
        let exp = if p == 2 {
            // Modulo 8: kn=1 has 4 roots mod 8, 16, 32...
            // giving 3/2 + 1/4 + 1/8 + ... = 2.
            match kn.digits()[0] & 7 {
                1 => 2.0,
                // Divisible by 4 half of the time, never by 8.
                5 => 1.0,
                // Never divisible by 4.
                3 | 7 => 0.5,
                _ => 0.0,
            }
        } else if knp == 0 {
            1.0 / (p - 1) as f64
        } else if modsquares[pidx][knp as usize] {
            2.0 / (p - 1) as f64
        } else {
            0.0
        };
        res += exp * (p as f64).ln();
    }
    res
}

/// The first n prime numbers.
pub fn primes(n: u32) -> Vec<u32> {
    // The n-th prime is always less than n * n.bit_length()
    // except for n = 1.
    let bound = max(100, n * (32 - n.leading_zeros())) as usize;
    // sieve[i] marks 2i+1 composite
    let mut sieve = vec![false; bound / 2];
    let mut primes = vec![2];
    for i in 1..sieve.len() {
        if sieve[i] {
            continue;
        }
        let p = 2 * i + 1;
        primes.push(p as u32);
        if primes.len() == n as usize {
            break;
        }
        if p * p > bound {
            continue;
        }
        // First odd multiple is 3p.
        let mut k = p + p / 2;
        while k < sieve.len() {
            sieve[k] = true;
            k += p
        }
    }
    primes
}

/// Returns whether n is composite through a base 2 Fermat test.
/// The use case is a product of 2 odd primes (never a Carmichael
/// number), so liars are rare but possible (173142166387457 is one).
pub fn certainly_composite(n: u64) -> bool {
    if n % 2 == 0 {
        return n > 2;
    }
    arith::pow_mod64(2, n - 1, n) != 1
}

/// Try to factor a possible double large prime cofactor.
/// Composites are assumed to be wider than 24 bits. The function does
/// not have to succeed on every composite, missed splits only lose a
/// partial relation.
pub fn try_factor64(n: u64) -> Option<(u64, u64)> {
    if n >> 24 == 0 || !certainly_composite(n) {
        return None;
    }
    crate::squfof::squfof(n)
}

/// Trial division of |x| by the factor base primes in `facs`.
/// Returns the split cofactor and the list of (prime index, exponent)
/// divisions, or None when the cofactor is not usable: larger than
/// max_cofactor, or a composite that cannot be split under maxlarge.
pub fn cofactor(
    fb: &FBase,
    xabs: &Uint,
    facs: &[usize],
    maxlarge: u64,
    max_cofactor: u64,
) -> Option<((u64, u64), Vec<(usize, u32)>)> {
    let mut factors: Vec<(usize, u32)> = Vec::with_capacity(facs.len() + 4);
    let mut cofactor = *xabs;
    for &pidx in facs {
        let pdiv = fb.div(pidx);
        let mut exp = 0;
        loop {
            let (q, r) = pdiv.divmod_uint(&cofactor);
            if r != 0 {
                break;
            }
            cofactor = q;
            exp += 1;
        }
        // Bucket collisions can report the same prime twice.
        if exp > 0 {
            factors.push((pidx, exp));
        }
    }
    let cofactor = cofactor.to_u64()?;
    if cofactor > max_cofactor {
        return None;
    }
    let maxprime = fb.bound() as u64;
    let pq = if cofactor > maxprime * maxprime {
        // Possibly a double large prime.
        match try_factor64(cofactor) {
            Some((p, q)) if p > maxlarge || q > maxlarge => None,
            None if cofactor > maxlarge => None,
            None => Some((cofactor, 1)),
            pq => pq,
        }
    } else if cofactor > maxlarge {
        None
    } else {
        // Below the squared factor base bound the cofactor is prime.
        debug_assert!(cofactor == 1 || !certainly_composite(cofactor));
        Some((cofactor, 1))
    };
    Some((pq?, factors))
}
