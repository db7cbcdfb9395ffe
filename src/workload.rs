//! Instrumented matrix-multiplication workload used by the CLI
//!
//! Multiplies two square matrices repeatedly in row-major and column-major
//! loop order, recording each phase as its own routine under a common
//! `total-loop` parent:
//!
//! ```text
//! total-loop (1)
//! ├─ clear        (4)
//! ├─ row-major    (2)
//! └─ column-major (3)
//! ```

use crate::counter_source::CounterSource;
use crate::error::Result;
use crate::store::{MeasurementStore, ROOT_ROUTINE_ID};
use std::hint::black_box;

/// Routine ids recorded by [`run_instrumented`]
pub mod routine_ids {
    pub const TOTAL_LOOP: usize = 1;
    pub const ROW_MAJOR: usize = 2;
    pub const COLUMN_MAJOR: usize = 3;
    pub const CLEAR: usize = 4;
}

/// Dense square matrix stored row by row
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    /// Matrix whose entry (i, j) is `f(i, j)`
    pub fn from_fn(n: usize, f: impl Fn(usize, usize) -> f32) -> Self {
        let mut m = Self::zeros(n);
        for i in 0..n {
            for j in 0..n {
                m.data[i * n + j] = f(i, j);
            }
        }
        m
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.n + j]
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Sum of all entries
    pub fn checksum(&self) -> f64 {
        self.data.iter().map(|&x| f64::from(x)).sum()
    }
}

/// `c += a * b`, iterating rows of `c` in the outer loop
pub fn row_major(a: &Matrix, b: &Matrix, c: &mut Matrix) {
    let n = a.n;
    for row in 0..n {
        for col in 0..n {
            let mut acc = c.data[row * n + col];
            for k in 0..n {
                acc += a.data[row * n + k] * b.data[k * n + col];
            }
            c.data[row * n + col] = acc;
        }
    }
}

/// `c += a * b`, iterating columns of `c` in the outer loop
pub fn column_major(a: &Matrix, b: &Matrix, c: &mut Matrix) {
    let n = a.n;
    for col in 0..n {
        for row in 0..n {
            let mut acc = c.data[row * n + col];
            for k in 0..n {
                acc += a.data[row * n + k] * b.data[k * n + col];
            }
            c.data[row * n + col] = acc;
        }
    }
}

/// Run `iterations` rounds of both multiplication orders of size `n`
///
/// Returns the checksum of the final product.
pub fn run_instrumented<S: CounterSource>(
    store: &mut MeasurementStore<S>,
    n: usize,
    iterations: usize,
) -> Result<f64> {
    use routine_ids::*;

    let a = Matrix::from_fn(n, |i, j| (i + j) as f32);
    let b = Matrix::from_fn(n, |i, j| (i * j) as f32);
    let mut c = Matrix::zeros(n);

    tracing::debug!("running {} iteration(s) of {}x{} matmul", iterations, n, n);

    store.begin(TOTAL_LOOP, "total-loop", ROOT_ROUTINE_ID)?;
    for _ in 0..iterations {
        store.measure(CLEAR, "clear", TOTAL_LOOP, |_| c.clear())?;
        store.measure(ROW_MAJOR, "row-major", TOTAL_LOOP, |_| {
            row_major(black_box(&a), black_box(&b), &mut c)
        })?;

        store.measure(CLEAR, "clear", TOTAL_LOOP, |_| c.clear())?;
        store.measure(COLUMN_MAJOR, "column-major", TOTAL_LOOP, |_| {
            column_major(black_box(&a), black_box(&b), &mut c)
        })?;
    }
    store.end(TOTAL_LOOP)?;

    Ok(black_box(c.checksum()))
}
