// Copyright 2024 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Empirical sieve parameters and user preferences.
//!
//! The breakpoint table is indexed by the decimal length of the input
//! and interpolated linearly. The values have no derivation: they were
//! chosen by timing runs on random semiprimes, and every one of them
//! can be overridden through [`Preferences`].

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

/// Interpolated sieve parameters for a given input size.
#[derive(Clone, Copy, Debug)]
pub struct SiqsParams {
    /// Number of factor base primes.
    pub fb_size: u32,
    /// log2 of the interval half-width M (interval is [-M, M)).
    pub interval_logsize: u32,
    /// Large prime cofactors are accepted up to ratio * max(factor base).
    pub large_ratio: u64,
}

// Breakpoints: decimal digits, factor base size, interval logsize,
// large prime ratio.
const SIQS_TABLE: &[(u32, u32, u32, u32)] = &[
    (5, 32, 14, 60),
    (10, 50, 14, 80),
    (15, 80, 15, 100),
    (20, 120, 15, 120),
    (24, 200, 15, 140),
    (28, 300, 15, 160),
    (32, 450, 16, 180),
    (36, 700, 16, 200),
    (40, 1100, 16, 220),
    (45, 1800, 17, 240),
    (50, 3000, 17, 260),
    (55, 4600, 17, 280),
    (60, 7000, 18, 300),
    (66, 11000, 18, 320),
    (72, 17000, 18, 340),
    (78, 26000, 19, 360),
    (85, 40000, 19, 380),
    (92, 60000, 20, 400),
    (100, 90000, 20, 420),
];

/// Parameters for an input with the given decimal length.
/// Inputs beyond the table use the largest bracket.
pub fn siqs_params(digits: u32) -> SiqsParams {
    let idx = SIQS_TABLE.partition_point(|&(d, _, _, _)| d <= digits);
    let row = |(_, fb, mlog, ratio): (u32, u32, u32, u32)| SiqsParams {
        fb_size: fb,
        interval_logsize: mlog,
        large_ratio: ratio as u64,
    };
    if idx == 0 {
        row(SIQS_TABLE[0])
    } else if idx == SIQS_TABLE.len() {
        row(*SIQS_TABLE.last().unwrap())
    } else {
        // Linearly interpolate each field between brackets.
        let prev = SIQS_TABLE[idx - 1];
        let next = SIQS_TABLE[idx];
        let interp = |lo: u32, hi: u32| -> u32 {
            ((next.0 - digits) * lo + (digits - prev.0) * hi) / (next.0 - prev.0)
        };
        SiqsParams {
            fb_size: interp(prev.1, next.1),
            interval_logsize: interp(prev.2, next.2),
            large_ratio: interp(prev.3, next.3) as u64,
        }
    }
}

/// How much progress chatter is emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent,
    Info,
    Verbose,
    Debug,
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "silent" | "0" => Ok(Verbosity::Silent),
            "info" | "1" => Ok(Verbosity::Info),
            "verbose" | "2" => Ok(Verbosity::Verbose),
            "debug" | "3" => Ok(Verbosity::Debug),
            _ => Err(format!("invalid verbosity {s:?}")),
        }
    }
}

/// Diagnostics output: a verbosity level and an optional sink
/// (standard error when none is set).
pub struct Diag {
    pub level: Verbosity,
    sink: Option<Mutex<Box<dyn Write + Send>>>,
}

impl Diag {
    pub fn new(level: Verbosity) -> Self {
        Diag { level, sink: None }
    }

    pub fn to_sink(level: Verbosity, w: Box<dyn Write + Send>) -> Self {
        Diag {
            level,
            sink: Some(Mutex::new(w)),
        }
    }

    pub fn log(&self, level: Verbosity, args: fmt::Arguments) {
        if level > self.level {
            return;
        }
        match &self.sink {
            None => eprintln!("{args}"),
            Some(w) => {
                if let Ok(mut w) = w.lock() {
                    let _ = writeln!(w, "{args}");
                }
            }
        }
    }

    pub fn info(&self, args: fmt::Arguments) {
        self.log(Verbosity::Info, args)
    }

    pub fn verbose(&self, args: fmt::Arguments) {
        self.log(Verbosity::Verbose, args)
    }

    pub fn debug(&self, args: fmt::Arguments) {
        self.log(Verbosity::Debug, args)
    }
}

impl Default for Diag {
    fn default() -> Self {
        Diag::new(Verbosity::Info)
    }
}

/// User preferences. Every `Option` field overrides the automatic
/// choice; the remaining fields always apply.
pub struct Preferences {
    pub fb_size: Option<u32>,
    pub interval_logsize: Option<u32>,
    /// Added to the computed smoothness threshold (log2 scale).
    pub threshold_offset: i8,
    pub multiplier: Option<u32>,
    /// Large prime bound as a multiple of the factor base bound.
    pub large_ratio: Option<u64>,
    /// Process double large prime relations.
    pub use_double: Option<bool>,
    /// Use the sparse per-block table for primes above the block size.
    pub use_buckets: bool,
    /// Number of prime factors of A.
    pub nfacs: Option<u32>,
    /// A values are kept within target/divisor of the ideal size.
    pub a_tolerance: Option<u32>,
    /// Seed for the A selection sequence.
    pub seed: u64,
    /// Worker thread count (0 or 1 means single-threaded).
    pub threads: Option<usize>,
    /// Give up sieving after this much wall-clock time.
    pub deadline: Option<Duration>,
    pub diag: Diag,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            fb_size: None,
            interval_logsize: None,
            threshold_offset: 0,
            multiplier: None,
            large_ratio: None,
            use_double: None,
            use_buckets: true,
            nfacs: None,
            a_tolerance: None,
            seed: 0xcafe_beef_cafe_beef,
            threads: None,
            deadline: None,
            diag: Diag::default(),
        }
    }
}

impl Preferences {
    pub fn silent() -> Self {
        Preferences {
            diag: Diag::new(Verbosity::Silent),
            ..Preferences::default()
        }
    }
}

#[test]
fn test_siqs_params() {
    // Exact breakpoints.
    let p = siqs_params(20);
    assert_eq!(p.fb_size, 120);
    // Clamping below and above the table.
    assert_eq!(siqs_params(2).fb_size, 32);
    assert_eq!(siqs_params(150).fb_size, 90000);
    // Interpolation is monotonic.
    let mut prev = 0;
    for d in 4..120 {
        let p = siqs_params(d);
        assert!(p.fb_size >= prev, "fb size decreased at {d} digits");
        prev = p.fb_size;
        assert!((14..=20).contains(&p.interval_logsize));
    }
    // Midpoint of a bracket.
    let p = siqs_params(22);
    assert_eq!(p.fb_size, 160);
}
