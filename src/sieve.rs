// Copyright 2024 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Block sieve over an interval.
//!
//! A polynomial to sieve is described by a list of primes with 1 or 2
//! roots each: positions hit by p are r + kp. The interval is
//! processed in blocks of 32k bytes accumulating truncated logarithms.
//!
//! Most additions come from the smallest primes, so primes whose
//! product fits in a small window are pre-combined into a cyclic
//! pattern that initializes each block with a rotating copy instead
//! of being sieved again and again. Primes larger than a block hit at
//! most once per block: their hits are recorded in per-block buckets
//! which double as a reverse lookup table when a smooth candidate
//! must be factored.

use wide;

pub const BLOCK_SIZE: usize = 32 * 1024;
// The tiny prime pattern repeats every 2*3*5*7*11 = 2310 positions.
const CYCLE_LEN_MAX: usize = 4096;
const BUCKETS: usize = 512;
const BUCKETSIZE: usize = BLOCK_SIZE / BUCKETS;

/// Marker for an absent second root.
pub const NO_ROOT: u32 = u32::MAX;

/// A factor base prime instantiated for one polynomial.
/// Roots are offsets relative to the interval start, reduced mod p
/// (r2 is [`NO_ROOT`] when the roots coincide or p divides 2A).
#[derive(Clone, Copy, Debug)]
pub struct SievePrime {
    pub pidx: u32,
    pub p: u32,
    pub log: u8,
    pub r1: u32,
    pub r2: u32,
}

/// A reusable sieve. Allocations persist across polynomials, the
/// state is reset by [`init_poly`].
///
/// [`init_poly`]: Sieve::init_poly
pub struct Sieve {
    pub nblocks: usize,
    pub blk_no: usize,
    // Accumulated logs for the current block.
    pub blk: Vec<u8>,
    // Pre-combined pattern of the tiny primes.
    cycle: Vec<u8>,
    cycle_len: usize,
    cycle_off: usize,
    // One cursor per (prime, root) with p <= BLOCK_SIZE.
    // Offsets are relative to the current block.
    mp: Vec<u32>,
    mlog: Vec<u8>,
    moff: Vec<u32>,
    // One cursor per (prime, root) with p > BLOCK_SIZE.
    // Offsets are relative to the interval start.
    lp: Vec<u32>,
    llog: Vec<u8>,
    lpidx: Vec<u32>,
    loff: Vec<u32>,
    // Bucketed large prime hits of the current block.
    bucket_pidx: Vec<u32>,
    bucket_pos: Vec<u16>,
    bucket_len: [u8; BUCKETS],
    use_buckets: bool,
}

impl Sieve {
    pub fn new(use_buckets: bool) -> Self {
        Sieve {
            nblocks: 0,
            blk_no: 0,
            blk: vec![0u8; BLOCK_SIZE],
            cycle: vec![0u8; CYCLE_LEN_MAX],
            cycle_len: 1,
            cycle_off: 0,
            mp: vec![],
            mlog: vec![],
            moff: vec![],
            lp: vec![],
            llog: vec![],
            lpidx: vec![],
            loff: vec![],
            bucket_pidx: vec![0u32; BUCKETS * BUCKETSIZE],
            bucket_pos: vec![0u16; BUCKETS * BUCKETSIZE],
            bucket_len: [0u8; BUCKETS],
            use_buckets,
        }
    }

    /// Reset the sieve for a new polynomial over nblocks blocks.
    pub fn init_poly(&mut self, primes: &[SievePrime], nblocks: usize) {
        self.nblocks = nblocks;
        self.blk_no = 0;
        self.cycle_off = 0;
        self.mp.clear();
        self.mlog.clear();
        self.moff.clear();
        self.lp.clear();
        self.llog.clear();
        self.lpidx.clear();
        self.loff.clear();

        // Combine the leading tiny primes into the cyclic pattern.
        let mut cycle_len = 1usize;
        let mut idx = 0;
        while idx < primes.len() {
            let p = primes[idx].p as usize;
            if cycle_len * p > CYCLE_LEN_MAX {
                break;
            }
            cycle_len *= p;
            idx += 1;
        }
        self.cycle_len = cycle_len;
        let cycle = &mut self.cycle[..cycle_len];
        cycle.fill(0);
        for sp in &primes[..idx] {
            for r in [sp.r1, sp.r2] {
                if r == NO_ROOT {
                    continue;
                }
                let mut pos = r as usize;
                while pos < cycle_len {
                    cycle[pos] += sp.log;
                    pos += sp.p as usize;
                }
            }
        }

        for sp in &primes[idx..] {
            if sp.p as usize <= BLOCK_SIZE {
                for r in [sp.r1, sp.r2] {
                    if r == NO_ROOT {
                        continue;
                    }
                    self.mp.push(sp.p);
                    self.mlog.push(sp.log);
                    self.moff.push(r);
                }
            } else {
                for r in [sp.r1, sp.r2] {
                    if r == NO_ROOT {
                        continue;
                    }
                    self.lp.push(sp.p);
                    self.llog.push(sp.log);
                    self.lpidx.push(sp.pidx);
                    self.loff.push(r);
                }
            }
        }
    }

    pub fn sieve_block(&mut self) {
        debug_assert!(self.blk_no < self.nblocks);
        let blk = &mut self.blk[..];
        // Initialize the block with the rotating tiny prime pattern.
        let n = self.cycle_len;
        if n > 1 {
            let mut src = self.cycle_off;
            for b in blk.iter_mut() {
                *b = self.cycle[src];
                src += 1;
                if src == n {
                    src = 0;
                }
            }
            self.cycle_off = src;
        } else {
            blk.fill(0);
        }
        // Medium primes: ordinary sieving with rolling offsets.
        unsafe {
            for i in 0..self.mp.len() {
                let p = *self.mp.get_unchecked(i) as usize;
                let size = *self.mlog.get_unchecked(i);
                let mut off = *self.moff.get_unchecked(i) as usize;
                if p < 1024 {
                    let ll = BLOCK_SIZE - 4 * p;
                    while off < ll {
                        *blk.get_unchecked_mut(off) += size;
                        off += p;
                        *blk.get_unchecked_mut(off) += size;
                        off += p;
                        *blk.get_unchecked_mut(off) += size;
                        off += p;
                        *blk.get_unchecked_mut(off) += size;
                        off += p;
                    }
                }
                while off < BLOCK_SIZE {
                    *blk.get_unchecked_mut(off) += size;
                    off += p;
                }
                self.moff[i] = (off - BLOCK_SIZE) as u32;
            }
        }
        // Large primes hit at most once per block.
        self.bucket_len.fill(0);
        let block_end = ((self.blk_no + 1) * BLOCK_SIZE) as u32;
        for i in 0..self.lp.len() {
            let off = self.loff[i];
            if off >= block_end {
                continue;
            }
            let pos = off as usize % BLOCK_SIZE;
            blk[pos] += self.llog[i];
            if self.use_buckets {
                let b = pos / BUCKETSIZE;
                let blen = self.bucket_len[b] as usize;
                if blen < BUCKETSIZE {
                    self.bucket_pidx[b * BUCKETSIZE + blen] = self.lpidx[i];
                    self.bucket_pos[b * BUCKETSIZE + blen] = pos as u16;
                    self.bucket_len[b] = blen as u8 + 1;
                } else {
                    // Overflow: keep the counter saturated as a marker.
                    self.bucket_len[b] = u8::MAX;
                }
            }
            self.loff[i] = off + self.lp[i];
        }
    }

    pub fn next_block(&mut self) {
        self.blk_no += 1;
    }

    pub fn done(&self) -> bool {
        self.blk_no >= self.nblocks
    }

    /// Scan the sieved block for candidates with accumulated logs at
    /// least `threshold` (the bound is inclusive). Returns block
    /// positions, each with the bucketed large prime indices hitting
    /// it, or None when the bucket overflowed and the caller must
    /// scan large primes itself.
    pub fn smooths(&self, threshold: u8) -> (Vec<u16>, Vec<Option<Vec<u32>>>) {
        debug_assert!(threshold > 0);
        let mut res: Vec<u16> = vec![];
        let thr16x = wide::u8x16::splat(threshold - 1);
        let mut i = 0;
        while i < BLOCK_SIZE {
            unsafe {
                // Cast as [u8;16] to avoid assuming alignment.
                let blk16 = (&self.blk[i] as *const u8) as *const [u8; 16];
                let blk16w = wide::u8x16::new(*blk16);
                if thr16x != blk16w.max(thr16x) {
                    // Some element is >= threshold.
                    for j in 0..16 {
                        if (*blk16)[j] >= threshold {
                            res.push((i + j) as u16);
                        }
                    }
                }
            }
            i += 16;
        }
        if res.is_empty() {
            return (vec![], vec![]);
        }
        let mut facs = Vec::with_capacity(res.len());
        for &r in &res {
            if !self.use_buckets {
                facs.push(None);
                continue;
            }
            let b = r as usize / BUCKETSIZE;
            let blen = self.bucket_len[b];
            if blen == u8::MAX {
                facs.push(None);
                continue;
            }
            let mut v = vec![];
            for k in 0..blen as usize {
                if self.bucket_pos[b * BUCKETSIZE + k] == r {
                    v.push(self.bucket_pidx[b * BUCKETSIZE + k]);
                }
            }
            facs.push(Some(v));
        }
        (res, facs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Cross check the sieve against naive accumulation for a mix of
    // tiny, medium and large primes over several blocks.
    #[test]
    fn test_sieve_matches_naive() {
        let primes = vec![
            SievePrime {
                pidx: 0,
                p: 2,
                log: 1,
                r1: 1,
                r2: NO_ROOT,
            },
            SievePrime {
                pidx: 1,
                p: 3,
                log: 2,
                r1: 0,
                r2: 2,
            },
            SievePrime {
                pidx: 2,
                p: 11,
                log: 4,
                r1: 5,
                r2: 9,
            },
            SievePrime {
                pidx: 3,
                p: 251,
                log: 8,
                r1: 17,
                r2: 101,
            },
            SievePrime {
                pidx: 4,
                p: 40961,
                log: 16,
                r1: 12345,
                r2: 40000,
            },
        ];
        let nblocks = 3;
        let mut naive = vec![0u8; nblocks * BLOCK_SIZE];
        for sp in &primes {
            for r in [sp.r1, sp.r2] {
                if r == NO_ROOT {
                    continue;
                }
                let mut pos = r as usize;
                while pos < naive.len() {
                    naive[pos] += sp.log;
                    pos += sp.p as usize;
                }
            }
        }
        let mut s = Sieve::new(true);
        s.init_poly(&primes, nblocks);
        for b in 0..nblocks {
            s.sieve_block();
            assert_eq!(
                &s.blk[..],
                &naive[b * BLOCK_SIZE..(b + 1) * BLOCK_SIZE],
                "block {b}"
            );
            s.next_block();
        }
        assert!(s.done());
    }

    #[test]
    fn test_threshold_inclusive() {
        // A position summing exactly to the threshold is reported.
        let primes = vec![
            SievePrime {
                pidx: 0,
                p: 4099,
                log: 13,
                r1: 777,
                r2: NO_ROOT,
            },
            SievePrime {
                pidx: 1,
                p: 5003,
                log: 13,
                r1: 777,
                r2: NO_ROOT,
            },
        ];
        let mut s = Sieve::new(true);
        s.init_poly(&primes, 1);
        s.sieve_block();
        assert_eq!(s.blk[777], 26);
        let (pos, _) = s.smooths(26);
        assert!(pos.contains(&777));
        let (pos, _) = s.smooths(27);
        assert!(!pos.contains(&777));
    }

    #[test]
    fn test_large_prime_buckets() {
        let primes = vec![
            SievePrime {
                pidx: 7,
                p: 65537,
                log: 17,
                r1: 1000,
                r2: 50000,
            },
            SievePrime {
                pidx: 9,
                p: 40961,
                log: 16,
                r1: 1000,
                r2: NO_ROOT,
            },
        ];
        let mut s = Sieve::new(true);
        s.init_poly(&primes, 4);
        s.sieve_block();
        let (pos, facs) = s.smooths(17);
        assert_eq!(pos, vec![1000]);
        let mut pidxs = facs[0].clone().unwrap();
        pidxs.sort();
        assert_eq!(pidxs, vec![7, 9]);
        // Second hit of 40961 lands in block 1 at 41000 + 40961 ...
        s.next_block();
        s.sieve_block();
        let (pos, facs) = s.smooths(16);
        assert_eq!(pos, vec![(41961 - BLOCK_SIZE) as u16, (50000 - BLOCK_SIZE) as u16]);
        assert_eq!(facs[0].clone().unwrap(), vec![9]);
        assert_eq!(facs[1].clone().unwrap(), vec![7]);
    }

    #[test]
    fn test_empty_primes() {
        let mut s = Sieve::new(true);
        s.init_poly(&[], 1);
        s.sieve_block();
        let (pos, _) = s.smooths(1);
        assert!(pos.is_empty());
    }
}
