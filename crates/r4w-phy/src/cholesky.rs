//! Batched Cholesky Inverse of Hermitian Positive-Definite Matrices
//!
//! Inverts sixteen independent N×N complex Hermitian matrices at once (the
//! MMSE equalizer needs `(HᴴH + σ²I)⁻¹` per subcarrier). Each matrix
//! element is stored as a lane vector, so every arithmetic step below runs
//! over all sixteen problems together.
//!
//! ## Algorithm
//!
//! ```text
//!   1. factor      B = G·Gᴴ             G lower triangular, pivots via rsqrt
//!   2. invert      L = G⁻¹              forward substitution
//!   3. product     B⁻¹ = Lᴴ·L           only the lower half, mirrored
//! ```
//!
//! The reciprocal square root is an estimate (bit-level seed and two
//! Newton-Raphson steps, relative error around 5e-6), which is ample for
//! receiver use. [`CholeskyOptions::refinement_steps`] adds iterations
//! when more precision is wanted.
//!
//! Inputs that are not positive definite produce unspecified values unless
//! [`CholeskyOptions::check_pivots`] is set.
//!
//! ## Example
//!
//! ```rust
//! use r4w_phy::cholesky::{CholeskyInverse, CholeskyOptions, HermitianBatch};
//! use num_complex::Complex32;
//!
//! let inverse = CholeskyInverse::<2>::new(CholeskyOptions::default()).unwrap();
//!
//! let mut batch = HermitianBatch::<2>::identity();
//! batch.set(0, 0, 0, Complex32::new(4.0, 0.0));
//! let result = inverse.invert(&batch).unwrap();
//! assert!((result.get(0, 0, 0).re - 0.25).abs() < 1e-4);
//! ```

use crate::types::{Lanes, PhyError, PhyResult, LANES};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

/// Smallest supported matrix dimension.
pub const MIN_DIMENSION: usize = 2;
/// Largest supported matrix dimension.
pub const MAX_DIMENSION: usize = 16;

/// Seed constant for the reciprocal square root estimate.
const RSQRT_MAGIC: u32 = 0x5f37_5a86;

/// Numerical options of the inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CholeskyOptions {
    /// Newton-Raphson steps added on top of the rsqrt estimate.
    pub refinement_steps: u8,
    /// Report a non-positive pivot instead of returning garbage.
    pub check_pivots: bool,
}

#[inline]
fn check_index<const N: usize>(lane: usize, row: usize, col: usize) {
    assert!(lane < LANES, "lane {} out of range (batch has {})", lane, LANES);
    assert!(
        row < N && col < N,
        "element ({}, {}) out of range for {}x{} matrices",
        row,
        col,
        N,
        N
    );
}

/// Sixteen N×N complex matrices, element-major.
///
/// `re[i][j][lane]` is the real part of element `(i, j)` of matrix `lane`.
#[derive(Debug, Clone, PartialEq)]
pub struct HermitianBatch<const N: usize> {
    pub re: [[Lanes<f32>; N]; N],
    pub im: [[Lanes<f32>; N]; N],
}

impl<const N: usize> HermitianBatch<N> {
    pub fn zeros() -> Self {
        Self {
            re: [[[0.0; LANES]; N]; N],
            im: [[[0.0; LANES]; N]; N],
        }
    }

    pub fn identity() -> Self {
        let mut batch = Self::zeros();
        for i in 0..N {
            batch.re[i][i] = [1.0; LANES];
        }
        batch
    }

    /// Element `(row, col)` of matrix `lane`.
    ///
    /// # Panics
    ///
    /// Panics if `lane >= LANES` or `row`/`col` is not below `N`.
    pub fn get(&self, lane: usize, row: usize, col: usize) -> Complex32 {
        check_index::<N>(lane, row, col);
        Complex32::new(self.re[row][col][lane], self.im[row][col][lane])
    }

    /// # Panics
    ///
    /// Panics if `lane >= LANES` or `row`/`col` is not below `N`.
    pub fn set(&mut self, lane: usize, row: usize, col: usize, value: Complex32) {
        check_index::<N>(lane, row, col);
        self.re[row][col][lane] = value.re;
        self.im[row][col][lane] = value.im;
    }

    /// Load one lane from a row-major matrix.
    ///
    /// # Panics
    ///
    /// Panics if `lane >= LANES`.
    pub fn set_matrix(&mut self, lane: usize, matrix: &[[Complex32; N]; N]) {
        for (i, row) in matrix.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                self.set(lane, i, j, value);
            }
        }
    }

    /// Row-major copy of matrix `lane`. Panics if `lane >= LANES`.
    pub fn matrix(&self, lane: usize) -> [[Complex32; N]; N] {
        std::array::from_fn(|i| std::array::from_fn(|j| self.get(lane, i, j)))
    }

    /// Per-lane `10·log10(‖A·X − I‖²_F / N)`, with `self` as A and
    /// `inverse` as X.
    pub fn normalized_residual_db(&self, inverse: &Self) -> Lanes<f32> {
        std::array::from_fn(|lane| {
            let mut err = 0.0f64;
            for i in 0..N {
                for j in 0..N {
                    let mut acc = Complex32::new(0.0, 0.0);
                    for k in 0..N {
                        acc += self.get(lane, i, k) * inverse.get(lane, k, j);
                    }
                    if i == j {
                        acc.re -= 1.0;
                    }
                    err += acc.norm_sqr() as f64;
                }
            }
            (10.0 * (err / N as f64).log10()) as f32
        })
    }
}

/// Reciprocal square root estimate with `extra_steps` Newton-Raphson steps
/// beyond the default two.
#[inline]
pub fn rsqrt_estimate(x: f32, extra_steps: u8) -> f32 {
    let half = 0.5 * x;
    let mut y = f32::from_bits(RSQRT_MAGIC.wrapping_sub(x.to_bits() >> 1));
    for _ in 0..2 + extra_steps as usize {
        y *= 1.5 - half * y * y;
    }
    y
}

/// Inverse of N×N Hermitian positive-definite batches.
#[derive(Debug, Clone)]
pub struct CholeskyInverse<const N: usize> {
    options: CholeskyOptions,
}

impl<const N: usize> CholeskyInverse<N> {
    pub fn new(options: CholeskyOptions) -> PhyResult<Self> {
        if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&N) {
            return Err(PhyError::invalid(format!(
                "Cholesky dimension {} outside {}..={}",
                N, MIN_DIMENSION, MAX_DIMENSION
            )));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &CholeskyOptions {
        &self.options
    }

    /// Invert every lane of `input`; only its lower triangle is read.
    pub fn invert(&self, input: &HermitianBatch<N>) -> PhyResult<HermitianBatch<N>> {
        let (g, inv_diag) = self.factor(input)?;
        let l = invert_lower(&g, &inv_diag);
        Ok(gram_lower(&l))
    }

    /// `B = G·Gᴴ`; also returns the reciprocal pivots `1/G[j][j]`.
    fn factor(&self, b: &HermitianBatch<N>) -> PhyResult<(HermitianBatch<N>, [Lanes<f32>; N])> {
        let mut g = HermitianBatch::<N>::zeros();
        let mut inv_diag = [[0.0f32; LANES]; N];

        for j in 0..N {
            let mut pivot = b.re[j][j];
            for k in 0..j {
                for lane in 0..LANES {
                    let (gr, gi) = (g.re[j][k][lane], g.im[j][k][lane]);
                    pivot[lane] -= gr * gr + gi * gi;
                }
            }

            if self.options.check_pivots {
                if let Some(lane) = (0..LANES).find(|&l| !(pivot[l] > 0.0 && pivot[l].is_finite())) {
                    tracing::warn!(lane, column = j, pivot = pivot[lane], "matrix not positive definite");
                    return Err(PhyError::NotPositiveDefinite { lane, column: j });
                }
            }

            let r: Lanes<f32> =
                std::array::from_fn(|lane| rsqrt_estimate(pivot[lane], self.options.refinement_steps));
            for lane in 0..LANES {
                g.re[j][j][lane] = pivot[lane] * r[lane];
            }
            inv_diag[j] = r;

            for i in j + 1..N {
                let mut sr = b.re[i][j];
                let mut si = b.im[i][j];
                for k in 0..j {
                    for lane in 0..LANES {
                        // G[i][k] * conj(G[j][k])
                        let (ar, ai) = (g.re[i][k][lane], g.im[i][k][lane]);
                        let (br, bi) = (g.re[j][k][lane], g.im[j][k][lane]);
                        sr[lane] -= ar * br + ai * bi;
                        si[lane] -= ai * br - ar * bi;
                    }
                }
                for lane in 0..LANES {
                    g.re[i][j][lane] = sr[lane] * r[lane];
                    g.im[i][j][lane] = si[lane] * r[lane];
                }
            }
        }
        Ok((g, inv_diag))
    }
}

/// `L = G⁻¹` by forward substitution, column by column.
fn invert_lower<const N: usize>(g: &HermitianBatch<N>, inv_diag: &[Lanes<f32>; N]) -> HermitianBatch<N> {
    let mut l = HermitianBatch::<N>::zeros();
    for j in 0..N {
        l.re[j][j] = inv_diag[j];
        for i in j + 1..N {
            let mut sr = [0.0f32; LANES];
            let mut si = [0.0f32; LANES];
            for k in j..i {
                for lane in 0..LANES {
                    let (gr, gi) = (g.re[i][k][lane], g.im[i][k][lane]);
                    let (lr, li) = (l.re[k][j][lane], l.im[k][j][lane]);
                    sr[lane] += gr * lr - gi * li;
                    si[lane] += gr * li + gi * lr;
                }
            }
            for lane in 0..LANES {
                l.re[i][j][lane] = -inv_diag[i][lane] * sr[lane];
                l.im[i][j][lane] = -inv_diag[i][lane] * si[lane];
            }
        }
    }
    l
}

/// `Lᴴ·L` for lower-triangular L; the result is Hermitian.
fn gram_lower<const N: usize>(l: &HermitianBatch<N>) -> HermitianBatch<N> {
    let mut out = HermitianBatch::<N>::zeros();
    for i in 0..N {
        for j in 0..=i {
            let mut sr = [0.0f32; LANES];
            let mut si = [0.0f32; LANES];
            for k in i..N {
                for lane in 0..LANES {
                    // conj(L[k][i]) * L[k][j]
                    let (ar, ai) = (l.re[k][i][lane], l.im[k][i][lane]);
                    let (br, bi) = (l.re[k][j][lane], l.im[k][j][lane]);
                    sr[lane] += ar * br + ai * bi;
                    si[lane] += ar * bi - ai * br;
                }
            }
            out.re[i][j] = sr;
            out.re[j][i] = sr;
            if i == j {
                continue;
            }
            out.im[i][j] = si;
            out.im[j][i] = si.map(|v| -v);
        }
    }
    out
}
