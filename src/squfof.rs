// Copyright 2024 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Shanks's square forms factorization, used to split double large
//! prime cofactors (under 50 bits in practice).
//!
//! Reference: http://homes.cerias.purdue.edu/~ssw/squfof.pdf

use num_integer::Integer;

/// Attempt to split n into two nontrivial factors.
/// Returns None for primes or when all multipliers fail.
pub fn squfof(n: u64) -> Option<(u64, u64)> {
    'mult: for k in 1..=50u64 {
        let kn = n.checked_mul(k)?;
        let sqn = isqrt64(kn);
        if k == 1 && sqn * sqn == n {
            return Some((sqn, sqn));
        }
        let maxiter = 3 * isqrt64(sqn);

        // Forward cycle: iterate the principal form until a square
        // appears at an odd index.
        let mut p0 = sqn;
        let mut q0 = 1;
        let mut q1 = kn - sqn * sqn;
        if q1 == 0 {
            continue 'mult;
        }
        let mut root = 0;
        for i in 1..=maxiter {
            if i == maxiter {
                continue 'mult;
            }
            let b = (sqn + p0) / q1;
            let p1 = b * q1 - p0;
            let q2 = if p0 > p1 {
                q0 + b * (p0 - p1)
            } else {
                q0 - b * (p1 - p0)
            };
            if i % 2 == 1 && maybe_square(q2) {
                let r = isqrt64(q2);
                if r * r == q2 {
                    root = r;
                    p0 = p1;
                    break;
                }
            }
            p0 = p1;
            q0 = q1;
            q1 = q2;
        }
        if root == 0 {
            continue 'mult;
        }

        // Reverse cycle from the square form until P stabilizes.
        let b = (sqn - p0) / root;
        let mut p0 = b * root + p0;
        let mut q0 = root;
        let mut q1 = (kn - p0 * p0) / q0;
        for i in 1..=maxiter {
            if i == maxiter {
                continue 'mult;
            }
            let b = (sqn + p0) / q1;
            let p1 = b * q1 - p0;
            let q2 = if p0 > p1 {
                q0 + b * (p0 - p1)
            } else {
                q0 - b * (p1 - p0)
            };
            if p1 == p0 {
                break;
            }
            p0 = p1;
            q0 = q1;
            q1 = q2;
        }
        let d = Integer::gcd(&n, &p0);
        if d > 1 && d < n {
            return Some((d, n / d));
        }
    }
    None
}

// Quick filter: squares are 0,1,4 mod 8 and 0,1,4 mod 5.
fn maybe_square(n: u64) -> bool {
    (n & 6 == 0 || n & 7 == 4) && (n + 1) % 5 <= 2
}

fn isqrt64(n: u64) -> u64 {
    if n < 4 {
        return u64::min(n, 1);
    }
    let mut r = (n as f64).sqrt() as u64;
    loop {
        let q = n / r;
        if q == r || q == r + 1 {
            return r;
        }
        if q == r - 1 {
            return r - 1;
        }
        r = (r + q) / 2;
    }
}
