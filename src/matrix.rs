// Copyright 2024 The quadsieve authors. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Gauss reduction and nullspace of matrices modulo 2.
//!
//! Matrices are vectors of dense bit columns. A 20000x20000 matrix
//! uses about 50MB, which is fine for the input sizes we accept.

use bitvec_simd::BitVec;

/// Given m columns of n bits, return bit vectors of size m generating
/// the nullspace (combinations of columns summing to zero).
pub fn nullspace(columns: Vec<BitVec>) -> Vec<BitVec> {
    if columns.is_empty() {
        return vec![];
    }
    let size = columns[0].len();
    let ncols = columns.len();
    assert!(columns.iter().all(|v| v.len() == size));
    // Companion matrix tracking the combination producing each column.
    let mut coefs: Vec<BitVec> = (0..ncols)
        .map(|i| {
            let mut r = BitVec::zeros(ncols);
            r.set(i, true);
            r
        })
        .collect();
    let mut cols = columns;
    let mut zeros: Vec<usize> = cols.iter().map(|c| c.leading_zeros()).collect();
    // Triangularize: after `done` steps, columns [..done] have
    // strictly increasing pivots and zeros[done..] >= zeros[..done].
    let mut done: usize = 0;
    while done < ncols {
        let i = (done..ncols).min_by_key(|&j| zeros[j]).unwrap();
        if zeros[i] == size {
            // All remaining columns are null.
            return coefs.split_off(done);
        }
        if i > done {
            zeros.swap(i, done);
            coefs.swap(i, done);
            cols.swap(i, done);
        }
        let (cols_left, cols_right) = cols.split_at_mut(done + 1);
        let (coefs_left, coefs_right) = coefs.split_at_mut(done + 1);
        for j in done + 1..ncols {
            if zeros[j] == zeros[done] {
                cols_right[j - done - 1].xor_inplace(&cols_left[done]);
                coefs_right[j - done - 1].xor_inplace(&coefs_left[done]);
                zeros[j] = cols_right[j - done - 1].leading_zeros();
            }
        }
        done += 1;
    }
    // Full column rank: empty nullspace.
    vec![]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bitvec(slice: &[u8]) -> BitVec {
        BitVec::from(slice.iter().map(|&n| n != 0))
    }

    #[test]
    fn test_nullspace_small() {
        // Rank 4, empty nullspace.
        let v = nullspace(vec![
            make_bitvec(&[1, 0, 0, 1]),
            make_bitvec(&[0, 1, 0, 1]),
            make_bitvec(&[0, 1, 0, 0]),
            make_bitvec(&[1, 1, 1, 0]),
        ]);
        assert_eq!(v, Vec::<BitVec>::new());
        // Rank 3: the four columns sum to zero.
        let v = nullspace(vec![
            make_bitvec(&[1, 0, 0, 1]),
            make_bitvec(&[1, 0, 1, 0]),
            make_bitvec(&[1, 1, 1, 0]),
            make_bitvec(&[1, 1, 0, 1]),
        ]);
        assert_eq!(v, vec![make_bitvec(&[1, 1, 1, 1])]);
        // A null column is reported alone.
        let v = nullspace(vec![make_bitvec(&[0, 0, 0]), make_bitvec(&[1, 0, 1])]);
        assert_eq!(v.len(), 1);
        assert!(v[0][0] && !v[0][1]);
    }

    // Sylvester-style matrix with known one-dimensional nullspace:
    // columns are the shifts of two polynomials P and Q = P + x^50.
    // P has a nonzero constant term so gcd(P, Q) = gcd(P, x^50) = 1
    // and the only null combination is [Q || P].
    fn make_test_matrix(n: usize) -> (Vec<BitVec>, BitVec) {
        let mut seed = 0xcafe_1337_u64 + n as u64;
        let mut p = BitVec::zeros(n);
        for i in 0..n {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            p.set(i, seed >> 63 == 1);
        }
        p.set(0, true);
        p.set(n - 1, true);
        let mut q = p.clone();
        q.set(50, !p[50]);

        let mut vecs = vec![];
        for poly in [&p, &q] {
            for i in 0..n {
                let mut v = BitVec::zeros(2 * n - 1);
                for j in 0..n {
                    v.set(i + j, poly[j]);
                }
                vecs.push(v);
            }
        }
        let mut ker = BitVec::zeros(2 * n);
        for i in 0..n {
            ker.set(i, q[i]);
            ker.set(n + i, p[i]);
        }
        (vecs, ker)
    }

    #[test]
    fn test_nullspace() {
        for n in [100, 500] {
            let (mat, ker) = make_test_matrix(n);
            let k = nullspace(mat);
            assert_eq!(k.len(), 1);
            assert_eq!(k[0], ker);
        }
    }

    #[test]
    fn test_nullspace_sparse() {
        // n+2 sparse columns of n bits have nullity >= 2.
        let n = 2000;
        let mut seed = 0xcafe_1337_u64;
        let mut mat = vec![];
        for _ in 0..n + 2 {
            let mut p = BitVec::zeros(n);
            for _ in 0..16 {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                p.set((seed >> 8) as usize % n, true);
            }
            mat.push(p);
        }
        let ker = nullspace(mat);
        assert!(ker.len() >= 2);
    }
}
