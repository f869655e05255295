// Copyright 2024 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Bibliography:
//!
//! Carl Pomerance, A Tale of Two Sieves
//! https://www.ams.org/notices/199612/pomerance.pdf
//!
//! https://en.wikipedia.org/wiki/Quadratic_sieve

use std::str::FromStr;
use std::time::Duration;

use quadsieve::params::{Diag, Preferences, Verbosity};
use quadsieve::{fbase, siqs, squfof};
use quadsieve::{Failure, Uint, MAX_BITS};

fn main() {
    let arg = arguments::parse(std::env::args()).unwrap();
    if arg.orphans.len() != 1 {
        println!("Usage: qsfactor [OPTIONS] NUMBER");
        println!();
        println!("Options:");
        println!("  --mode M        siqs (default) or tdiv64");
        println!("  --fb N          factor base size");
        println!("  --m LOG         interval half-width 2^LOG");
        println!("  --k K           multiplier");
        println!("  --nfacs N       number of prime factors of A");
        println!("  --large-ratio R large prime bound R * max(factor base)");
        println!("  --threads N     worker thread count");
        println!("  --seed S        polynomial selection seed");
        println!("  --timeout SECS  give up after SECS seconds");
        println!("  --v LEVEL       silent, info, verbose or debug");
        return;
    }
    let verbosity = arg
        .get::<String>("v")
        .map(|s| Verbosity::from_str(&s).expect("invalid verbosity"))
        .unwrap_or(Verbosity::Info);
    let mut prefs = Preferences {
        fb_size: arg.get::<u32>("fb"),
        interval_logsize: arg.get::<u32>("m"),
        multiplier: arg.get::<u32>("k"),
        nfacs: arg.get::<u32>("nfacs"),
        large_ratio: arg.get::<u64>("large-ratio"),
        threads: arg.get::<usize>("threads"),
        deadline: arg.get::<u64>("timeout").map(Duration::from_secs),
        diag: Diag::new(verbosity),
        ..Preferences::default()
    };
    if let Some(seed) = arg.get::<u64>("seed") {
        prefs.seed = seed;
    }
    let diag = &prefs.diag;

    let mut n = Uint::from_str(&arg.orphans[0]).expect("could not read decimal number");
    if n.bits() > MAX_BITS {
        eprintln!(
            "Number size ({} bits) exceeds {} bits limit",
            n.bits(),
            MAX_BITS
        );
        std::process::exit(1);
    }
    diag.info(format_args!("Input number {n}"));

    // Remove small factors before sieving.
    for &p in &fbase::primes(1000) {
        while n % (p as u64) == 0 {
            println!("{p}");
            n /= Uint::from(p);
        }
    }

    let mode = arg.get::<String>("mode").unwrap_or("siqs".into());
    if mode == "tdiv64" {
        assert!(n.bits() <= 64, "tdiv64 mode requires a 64 bit input");
        factor64(n.digits()[0]);
        return;
    } else if mode != "siqs" {
        eprintln!("Invalid operation mode {mode:?}");
        std::process::exit(1);
    }

    let mut pending = vec![n];
    let mut failed = false;
    while let Some(m) = pending.pop() {
        if m == Uint::ONE {
            continue;
        }
        if m.bits() <= 64 && !fbase::certainly_composite(m.digits()[0]) {
            println!("{m}");
            continue;
        }
        match siqs::factor(&m, &prefs) {
            Ok((p, q)) => {
                pending.push(p);
                pending.push(q);
            }
            Err(Failure::NoDivisorFound) if m.bits() > 64 => {
                // Probably a prime too wide for the Fermat test.
                println!("{m}");
            }
            Err(e) => {
                eprintln!("Factoring {m} failed: {e}");
                failed = true;
            }
        }
    }
    if failed {
        std::process::exit(1);
    }
}

// Recursive SQUFOF splitting for word-sized inputs with no small
// factors.
fn factor64(n: u64) {
    if n == 1 {
        return;
    }
    if !fbase::certainly_composite(n) {
        println!("{n}");
        return;
    }
    match squfof::squfof(n) {
        Some((a, b)) => {
            factor64(a);
            factor64(b);
        }
        None => println!("{n}"),
    }
}
