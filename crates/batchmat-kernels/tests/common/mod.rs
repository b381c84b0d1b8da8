//! Shared helpers for the integration tests.

#![allow(dead_code)]

use batchmat_core::{f16, Complex32, Complex64, Element};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Element types the tests know how to generate and compare.
pub trait TestScalar: Element {
    /// Small values on a 1/4 grid, so low-precision sums stay exact.
    fn sample(rng: &mut StdRng) -> Self;

    fn to_c128(self) -> Complex64;
}

fn quarter(rng: &mut StdRng) -> f64 {
    rng.gen_range(-4i32..=4) as f64 / 4.0
}

impl TestScalar for f16 {
    fn sample(rng: &mut StdRng) -> Self {
        f16::from_f64(quarter(rng))
    }

    fn to_c128(self) -> Complex64 {
        Complex64::new(self.to_f64(), 0.0)
    }
}

impl TestScalar for f32 {
    fn sample(rng: &mut StdRng) -> Self {
        quarter(rng) as f32
    }

    fn to_c128(self) -> Complex64 {
        Complex64::new(self as f64, 0.0)
    }
}

impl TestScalar for f64 {
    fn sample(rng: &mut StdRng) -> Self {
        quarter(rng)
    }

    fn to_c128(self) -> Complex64 {
        Complex64::new(self, 0.0)
    }
}

impl TestScalar for i32 {
    fn sample(rng: &mut StdRng) -> Self {
        rng.gen_range(-5..=5)
    }

    fn to_c128(self) -> Complex64 {
        Complex64::new(self as f64, 0.0)
    }
}

impl TestScalar for Complex32 {
    fn sample(rng: &mut StdRng) -> Self {
        Complex32::new(quarter(rng) as f32, quarter(rng) as f32)
    }

    fn to_c128(self) -> Complex64 {
        Complex64::new(self.re as f64, self.im as f64)
    }
}

impl TestScalar for Complex64 {
    fn sample(rng: &mut StdRng) -> Self {
        Complex64::new(quarter(rng), quarter(rng))
    }

    fn to_c128(self) -> Complex64 {
        self
    }
}

pub fn random<T: TestScalar>(seed: u64, len: usize) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| T::sample(&mut rng)).collect()
}

/// Direct definition of the batched adjoint product, with no conjugation
/// folding: `z[b] = op(x[b]) · op(y[b])`, `op` conjugate-transposing when its
/// flag is set.
pub fn reference<T: Element>(
    x: &[T],
    x_shape: &[usize],
    y: &[T],
    y_shape: &[usize],
    adj_x: bool,
    adj_y: bool,
) -> Vec<T> {
    let r = x_shape.len();
    let (xr, xc) = (x_shape[r - 2], x_shape[r - 1]);
    let (yr, yc) = (y_shape[r - 2], y_shape[r - 1]);
    let batch: usize = x_shape[..r - 2].iter().product();
    let (m, k) = if adj_x { (xc, xr) } else { (xr, xc) };
    let n = if adj_y { yr } else { yc };

    let lhs = |b: usize, i: usize, p: usize| {
        let base = b * xr * xc;
        if adj_x {
            x[base + p * xc + i].conj()
        } else {
            x[base + i * xc + p]
        }
    };
    let rhs = |b: usize, p: usize, j: usize| {
        let base = b * yr * yc;
        if adj_y {
            y[base + j * yc + p].conj()
        } else {
            y[base + p * yc + j]
        }
    };

    let mut z = Vec::with_capacity(batch * m * n);
    for b in 0..batch {
        for i in 0..m {
            for j in 0..n {
                let mut acc = T::zero();
                for p in 0..k {
                    acc = T::mul_acc(acc, lhs(b, i, p), rhs(b, p, j));
                }
                z.push(acc);
            }
        }
    }
    z
}

pub fn assert_close<T: TestScalar>(a: &[T], b: &[T], tol: f64) {
    assert_eq!(a.len(), b.len(), "length mismatch: {} vs {}", a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let (x, y) = (x.to_c128(), y.to_c128());
        assert!(
            (x - y).norm() <= tol,
            "element {} differs: {} vs {} (tol={})",
            i, x, y, tol
        );
    }
}
