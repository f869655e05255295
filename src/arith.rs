// Copyright 2024 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Arbitrary-precision and machine-word arithmetic primitives used by
//! the sieve: integer square root, modular square roots and inverses,
//! the Euler/Legendre symbol and per-prime division helpers.

pub use bnum::types::{I1024, U1024};

use crate::Uint;

/// Rounded down integer square root.
pub fn isqrt(n: Uint) -> Uint {
    if n.is_zero() {
        return Uint::ZERO;
    }
    // Newton iteration from an upper bound.
    let mut x0 = Uint::ONE << (n.bits() / 2 + 1);
    let mut x1 = (x0 + n / x0) >> 1;
    while x1 < x0 {
        x0 = x1;
        x1 = (x0 + n / x0) >> 1;
    }
    x0
}

/// Modular exponentiation for multiprecision integers.
/// The modulus must be small enough that squares do not overflow.
pub fn pow_mod(n: Uint, k: Uint, p: Uint) -> Uint {
    assert!(2 * p.bits() < 1024);
    let mut res = Uint::ONE;
    let mut sq = n % p;
    let mut k = k;
    while !k.is_zero() {
        if k.digits()[0] & 1 == 1 {
            res = (res * sq) % p;
        }
        sq = (sq * sq) % p;
        k = k >> 1;
    }
    res
}

/// Binary GCD.
pub fn gcd(mut a: Uint, mut b: Uint) -> Uint {
    if a.is_zero() {
        return b;
    }
    if b.is_zero() {
        return a;
    }
    let k = std::cmp::min(a.trailing_zeros(), b.trailing_zeros());
    a = a >> a.trailing_zeros();
    loop {
        b = b >> b.trailing_zeros();
        if a > b {
            std::mem::swap(&mut a, &mut b);
        }
        b -= a;
        if b.is_zero() {
            return a << k;
        }
    }
}

#[inline]
pub fn mulmod64(a: u64, b: u64, p: u64) -> u64 {
    ((a as u128 * b as u128) % p as u128) as u64
}

pub fn pow_mod64(n: u64, k: u64, p: u64) -> u64 {
    let mut res = 1 % p;
    let mut sq = n % p;
    let mut k = k;
    while k > 0 {
        if k & 1 == 1 {
            res = mulmod64(res, sq, p);
        }
        sq = mulmod64(sq, sq, p);
        k >>= 1;
    }
    res
}

/// Modular inverse by the extended Euclid algorithm.
pub fn inv_mod64(n: u64, p: u64) -> Option<u64> {
    let n = n % p;
    if n == 0 {
        return None;
    }
    let (mut a, mut b) = (n as i128, p as i128);
    let (mut x, mut y) = (1i128, 0i128);
    while b != 0 {
        let q = a / b;
        (a, b) = (b, a - q * b);
        (x, y) = (y, x - q * y);
    }
    if a != 1 {
        return None;
    }
    Some(x.rem_euclid(p as i128) as u64)
}

/// Legendre symbol (n/p) for an odd prime p, via the Euler criterion.
pub fn legendre(n: u64, p: u64) -> i32 {
    debug_assert!(p % 2 == 1);
    match pow_mod64(n % p, (p - 1) / 2, p) {
        0 => 0,
        1 => 1,
        _ => -1,
    }
}

/// Square root modulo a prime number p < 2^32 (Tonelli-Shanks).
pub fn sqrt_mod(n: u64, p: u64) -> Option<u64> {
    let n = n % p;
    if p == 2 {
        return Some(n);
    }
    if n == 0 {
        return Some(0);
    }
    if legendre(n, p) != 1 {
        return None;
    }
    if p % 4 == 3 {
        let r = pow_mod64(n, (p + 1) / 4, p);
        return Some(r);
    }
    // Write p-1 = q 2^s with q odd.
    let s = (p - 1).trailing_zeros();
    let q = (p - 1) >> s;
    // Any quadratic non-residue will do as a generator.
    let mut z = 2;
    while legendre(z, p) != -1 {
        z += 1;
    }
    let mut m = s;
    let mut c = pow_mod64(z, q, p);
    let mut t = pow_mod64(n, q, p);
    let mut r = pow_mod64(n, (q + 1) / 2, p);
    while t != 1 {
        let mut i = 0;
        let mut t2 = t;
        while t2 != 1 {
            t2 = mulmod64(t2, t2, p);
            i += 1;
        }
        let b = pow_mod64(c, 1u64 << (m - i - 1), p);
        m = i;
        c = mulmod64(b, b, p);
        t = mulmod64(t, c, p);
        r = mulmod64(r, b, p);
    }
    Some(r)
}

/// Precomputed division helpers for a prime p < 2^32.
///
/// For odd p the structure holds p^-1 mod 2^64, giving a divisibility
/// test through a single wrapping multiplication, and multiprecision
/// remainders are computed by schoolbook long division over 64-bit
/// digits.
#[derive(Clone, Debug)]
pub struct Dividers {
    pub p: u64,
    // p^-1 mod 2^64 (odd p only)
    pinv: u64,
    // floor(2^64-1 / p)
    qlim: u64,
}

impl Dividers {
    pub fn new(p: u32) -> Self {
        let p64 = p as u64;
        if p == 2 {
            return Dividers {
                p: 2,
                pinv: 0,
                qlim: 0,
            };
        }
        // Newton iteration doubles the number of correct bits,
        // starting from p = p^-1 mod 8.
        let mut pinv = p64;
        for _ in 0..5 {
            pinv = pinv.wrapping_mul(2u64.wrapping_sub(p64.wrapping_mul(pinv)));
        }
        debug_assert!(pinv.wrapping_mul(p64) == 1);
        Dividers {
            p: p64,
            pinv,
            qlim: u64::MAX / p64,
        }
    }

    /// Division-free divisibility test.
    #[inline]
    pub fn divides(&self, x: u64) -> bool {
        if self.p == 2 {
            return x & 1 == 0;
        }
        x.wrapping_mul(self.pinv) <= self.qlim
    }

    #[inline]
    pub fn modu64(&self, x: u64) -> u64 {
        x % self.p
    }

    /// Remainder of a possibly negative interval offset.
    #[inline]
    pub fn modi64(&self, x: i64) -> u64 {
        x.rem_euclid(self.p as i64) as u64
    }

    pub fn mod_uint(&self, x: &Uint) -> u64 {
        let mut rem: u128 = 0;
        for &d in x.digits().iter().rev() {
            rem = ((rem << 64) | d as u128) % self.p as u128;
        }
        rem as u64
    }

    pub fn divmod_uint(&self, x: &Uint) -> (Uint, u64) {
        let digits = x.digits();
        let mut q = [0u64; 16];
        let mut rem: u128 = 0;
        for i in (0..digits.len()).rev() {
            let cur = (rem << 64) | digits[i] as u128;
            q[i] = (cur / self.p as u128) as u64;
            rem = cur % self.p as u128;
        }
        (Uint::from_digits(q), rem as u64)
    }

    pub fn inv(&self, x: u64) -> Option<u64> {
        inv_mod64(x, self.p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_isqrt() {
        for k in 1u64..1000 {
            let n = Uint::from(k * k);
            assert_eq!(isqrt(n), Uint::from(k));
            assert_eq!(isqrt(n + Uint::ONE), Uint::from(k));
            assert_eq!(isqrt(n - Uint::ONE), Uint::from(k - 1));
        }
        let n = Uint::from_str("1000000016000000063").unwrap();
        let r = isqrt(n);
        assert!(r * r <= n && n < (r + Uint::ONE) * (r + Uint::ONE));
    }

    #[test]
    fn test_pow_mod64() {
        for i in 2..997u64 {
            assert_eq!(pow_mod64(i, 996, 997), 1);
        }
    }

    #[test]
    fn test_inv_mod64() {
        for p in [5u64, 97, 65537, 1_000_003] {
            for x in 1..200u64 {
                if x % p == 0 {
                    continue;
                }
                let i = inv_mod64(x, p).unwrap();
                assert_eq!(mulmod64(x % p, i, p), 1);
            }
        }
        assert_eq!(inv_mod64(0, 97), None);
        assert_eq!(inv_mod64(21, 7), None);
    }

    #[test]
    fn test_sqrt_mod() {
        const PRIMES: &[u64] = &[2503, 2521, 2531, 2539, 2500213, 2500363, 300 * 1024 + 1];
        for &p in PRIMES {
            for k in 1..std::cmp::min(p / 2, 4000) {
                if let Some(r) = sqrt_mod(k, p) {
                    assert_eq!(mulmod64(r, r, p), k % p, "sqrt({k}) mod {p}");
                }
                let r = sqrt_mod(mulmod64(k, k, p), p).unwrap();
                assert!(r == k || r == p - k, "sqrt({}) mod {p}", (k * k) % p);
            }
        }
    }

    #[test]
    fn test_dividers() {
        for p in [3u32, 5, 7, 11, 251, 65521, 16777213] {
            let div = Dividers::new(p);
            for x in 0..2000u64 {
                assert_eq!(div.divides(x), x % p as u64 == 0);
            }
            let n = Uint::from_str("96079985598025128741738975144954389115929").unwrap();
            let (q, r) = div.divmod_uint(&n);
            assert_eq!(q * Uint::from(p) + Uint::from(r), n);
            assert_eq!(div.mod_uint(&n), r);
        }
        let div2 = Dividers::new(2);
        assert!(div2.divides(8) && !div2.divides(7));
        assert_eq!(div2.modi64(-3), 1);
        let div = Dividers::new(101);
        assert_eq!(div.modi64(-1), 100);
        assert_eq!(div.modi64(-101), 0);
    }

    #[test]
    fn test_gcd() {
        let a = Uint::from(2u64 * 3 * 5 * 7 * 1009);
        let b = Uint::from(3u64 * 7 * 2003);
        assert_eq!(gcd(a, b), Uint::from(21u64));
        assert_eq!(gcd(a, Uint::ZERO), a);
        assert_eq!(gcd(Uint::ZERO, b), b);
    }
}
