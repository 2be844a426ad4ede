//! Soft Demapper — fixed-point LLR computation per modulation order
//!
//! Turns equalized symbol estimates into 8-bit soft bits for the LDPC /
//! turbo decoder. Every lane of a [`LayerBatch`] is one subcarrier; each
//! lane carries its own `beta` (equalizer gain) and post-SINR scaling
//! `1/(1-beta)`.
//!
//! ## Pipeline (per axis, all lanes at once)
//!
//! ```text
//!   y (Q13) ──abs──> u ──*d──> u*d ─┐
//!   beta (Q13) ──*d──> beta*d ──*d──> beta*d^2
//!                      │            │
//!           thresholds 2k*beta*d    │
//!                      │            │
//!         select cascade -> segment j
//!                                   v
//!        metric = slope[j]*u*d + offset[j]*beta*d^2      (Q13, i32)
//!        llr    = metric * post_sinr >> (13 + p - f)      (Q(f), i16)
//!        sign plane: copy_sign(y, llr);  clamp [low, high]
//! ```
//!
//! `p` is the post-SINR fractional bit count and `f` the LLR fractional bit
//! count, both part of [`LlrScaling`]. Positive LLR means the bit is 0.
//!
//! ## Example
//!
//! ```rust
//! use r4w_phy::prelude::*;
//!
//! let scaling = LlrScaling::new(10, 2, -127, 127).unwrap();
//! let demapper = SoftDemapper::new(ModulationOrder::Qpsk, scaling);
//!
//! let mut layer = LayerBatch::default();
//! layer.tx[0] = ComplexI16::new(16384, -8192);   // 2.0 - 1.0j in Q13
//! layer.post_sinr = I16x16::splat(1 << 10);       // 1/(1-beta) = 1.0
//!
//! let mut out = [0i8; 64];
//! let n = demapper.demap(&[layer], SubcarrierCount::Sc4, &mut out, 0).unwrap();
//! assert_eq!(n, 8);
//! assert_eq!(&out[..2], &[23, -11]);
//! ```
//!
//! π/2-BPSK is demapped with the even-subcarrier rotation only: the soft
//! bit is `sqrt(2)*(I+Q)/(1-beta)`. Odd-index rotation is not supported.

use crate::constellation::{Axis, AxisProfile, BitSource, ModulationOrder};
use crate::fixed_point::{clamp_to_range, copy_sign, I16x16, Q13, Q15};
use crate::llr_store::{self, SubcarrierCount};
use crate::types::{ComplexI16, Lanes, PhyError, PhyResult, LANES};
use num_complex::Complex32;

/// Spatial layers one UE can map onto a resource element.
pub const MAX_LAYERS_PER_UE: usize = 2;

/// Bit planes per axis for the largest constellation (256QAM).
pub const MAX_PLANES_PER_AXIS: usize = 4;

/// Fractional bits of symbol and beta inputs.
pub const INPUT_FRAC_BITS: u32 = 13;

/// Fixed-point policy of the demapper output.
///
/// Built once per cell / pipeline configuration; validated here so the
/// per-lane math never has to check anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlrScaling {
    post_sinr_frac_bits: u8,
    llr_frac_bits: u8,
    range_low: i16,
    range_high: i16,
}

impl LlrScaling {
    /// Maximum fractional bits of the post-SINR input.
    pub const MAX_POST_SINR_FRAC_BITS: u8 = 15;
    /// Maximum fractional bits of the 8-bit LLR output.
    pub const MAX_LLR_FRAC_BITS: u8 = 7;

    pub fn new(
        post_sinr_frac_bits: u8,
        llr_frac_bits: u8,
        range_low: i16,
        range_high: i16,
    ) -> PhyResult<Self> {
        if post_sinr_frac_bits > Self::MAX_POST_SINR_FRAC_BITS {
            return Err(PhyError::invalid(format!(
                "post-SINR fractional bits {} exceed {}",
                post_sinr_frac_bits,
                Self::MAX_POST_SINR_FRAC_BITS
            )));
        }
        if llr_frac_bits > Self::MAX_LLR_FRAC_BITS {
            return Err(PhyError::invalid(format!(
                "LLR fractional bits {} exceed {}",
                llr_frac_bits,
                Self::MAX_LLR_FRAC_BITS
            )));
        }
        let i8_range = i8::MIN as i16..=i8::MAX as i16;
        if range_low > range_high || !i8_range.contains(&range_low) || !i8_range.contains(&range_high) {
            return Err(PhyError::invalid(format!(
                "LLR range [{}, {}] is not an ordered sub-range of [-128, 127]",
                range_low, range_high
            )));
        }
        Ok(Self {
            post_sinr_frac_bits,
            llr_frac_bits,
            range_low,
            range_high,
        })
    }

    pub fn post_sinr_frac_bits(&self) -> u8 {
        self.post_sinr_frac_bits
    }

    pub fn llr_frac_bits(&self) -> u8 {
        self.llr_frac_bits
    }

    pub fn range_low(&self) -> i16 {
        self.range_low
    }

    pub fn range_high(&self) -> i16 {
        self.range_high
    }
}

impl Default for LlrScaling {
    /// Q5.10 post-SINR, Q5.2 LLRs, symmetric 8-bit range.
    fn default() -> Self {
        Self {
            post_sinr_frac_bits: 10,
            llr_frac_bits: 2,
            range_low: -127,
            range_high: 127,
        }
    }
}

/// Equalizer output for one spatial layer over one batch of subcarriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerBatch {
    /// Symbol estimates, Q2.13.
    pub tx: Lanes<ComplexI16>,
    /// `1/(1-beta)` in the post-SINR format of the [`LlrScaling`].
    pub post_sinr: I16x16,
    /// Equalizer gain `beta`, Q2.13.
    pub beta: I16x16,
}

impl LayerBatch {
    pub fn new(tx: Lanes<ComplexI16>, post_sinr: I16x16, beta: I16x16) -> Self {
        Self {
            tx,
            post_sinr,
            beta,
        }
    }

    /// Quantize floating-point equalizer output into the demapper formats.
    ///
    /// Up to [`LANES`] values per slice; missing lanes are zero. Values out of
    /// range saturate.
    pub fn quantize(
        tx: &[Complex32],
        post_sinr: &[f32],
        beta: &[f32],
        scaling: &LlrScaling,
    ) -> PhyResult<Self> {
        let n = tx.len();
        if n > LANES || post_sinr.len() != n || beta.len() != n {
            return Err(PhyError::invalid(format!(
                "layer batch needs matching slices of at most {} lanes (tx {}, post_sinr {}, beta {})",
                LANES,
                n,
                post_sinr.len(),
                beta.len()
            )));
        }

        let q13 = |x: f32| quantize_i16(x, INPUT_FRAC_BITS);
        let qsinr = |x: f32| quantize_i16(x, scaling.post_sinr_frac_bits as u32);

        let mut batch = LayerBatch::default();
        for i in 0..n {
            batch.tx[i] = ComplexI16::new(q13(tx[i].re), q13(tx[i].im));
            batch.post_sinr.0[i] = qsinr(post_sinr[i]);
            batch.beta.0[i] = q13(beta[i]);
        }
        Ok(batch)
    }

    pub fn real(&self) -> I16x16 {
        I16x16::from_fn(|i| self.tx[i].re)
    }

    pub fn imag(&self) -> I16x16 {
        I16x16::from_fn(|i| self.tx[i].im)
    }

    /// Gather all three inputs with the same lane permutation.
    pub fn permute(&self, indices: &Lanes<u8>) -> Self {
        Self {
            tx: std::array::from_fn(|i| self.tx[indices[i] as usize & (LANES - 1)]),
            post_sinr: self.post_sinr.permute(indices),
            beta: self.beta.permute(indices),
        }
    }
}

fn quantize_i16(x: f32, frac_bits: u32) -> i16 {
    // `as` saturates and maps NaN to 0
    (x as f64 * (1u32 << frac_bits) as f64).round() as i16
}

/// Clamped soft bits of one layer, per axis and bit plane.
///
/// Plane 0 is the sign bit of the axis. Unused planes stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisLlrs {
    pub real: [I16x16; MAX_PLANES_PER_AXIS],
    pub imag: [I16x16; MAX_PLANES_PER_AXIS],
}

impl AxisLlrs {
    pub fn plane(&self, src: BitSource) -> &I16x16 {
        match src.axis {
            Axis::Real => &self.real[src.plane as usize],
            Axis::Imag => &self.imag[src.plane as usize],
        }
    }
}

/// Evaluate the piecewise max-log LLR of one axis for all lanes.
///
/// `y` is held wide so projections summing two Q13 components keep their
/// full range up to the final narrowing.
fn demap_axis(
    profile: &AxisProfile,
    y: &Lanes<Q13>,
    beta: I16x16,
    post_sinr: I16x16,
    scaling: &LlrScaling,
    planes: &mut [I16x16; MAX_PLANES_PER_AXIS],
) {
    let d = Q15::from_i16(profile.inv_norm_q15);
    let sinr_frac = scaling.post_sinr_frac_bits as u32;
    let llr_frac = scaling.llr_frac_bits as u32;

    for i in 0..LANES {
        let u = y[i].saturating_abs();
        let ud: Q13 = u.mul(d);
        let bd: Q13 = Q13::from_i16(beta[i]).mul(d);
        let bdd: Q13 = bd.mul(d);

        // Segment index = number of thresholds strictly below u
        let segment = profile
            .thresholds
            .iter()
            .enumerate()
            .fold(0usize, |seg, (j, &t)| {
                if u > bd.saturating_mul_int(t as i32) {
                    j + 1
                } else {
                    seg
                }
            });

        for (k, table) in profile.planes.iter().enumerate() {
            let seg = table[segment];
            let metric = ud
                .saturating_mul_int(seg.slope as i32)
                .saturating_add(bdd.saturating_mul_int(seg.offset as i32));
            let scaled = metric.mul_to_i16(post_sinr[i], sinr_frac, llr_frac);
            let signed = if k == 0 {
                copy_sign(y[i].raw().signum() as i16, scaled)
            } else {
                scaled
            };
            planes[k].0[i] = clamp_to_range(signed, scaling.range_low, scaling.range_high);
        }
    }
}

fn widen(v: I16x16) -> Lanes<Q13> {
    std::array::from_fn(|i| Q13::from_i16(v[i]))
}

/// Compute the soft bits of one layer.
pub fn demap_layer(modulation: ModulationOrder, layer: &LayerBatch, scaling: &LlrScaling) -> AxisLlrs {
    let profile = modulation.profile();
    let mut out = AxisLlrs::default();

    match modulation {
        ModulationOrder::Pi2Bpsk => {
            // Even-subcarrier rotation: bit 0 maps to (1+j)/sqrt(2)
            let projection: Lanes<Q13> = std::array::from_fn(|i| {
                Q13::from_raw(layer.tx[i].re as i32 + layer.tx[i].im as i32)
            });
            demap_axis(profile, &projection, layer.beta, layer.post_sinr, scaling, &mut out.real);
        }
        _ => {
            demap_axis(profile, &widen(layer.real()), layer.beta, layer.post_sinr, scaling, &mut out.real);
            demap_axis(profile, &widen(layer.imag()), layer.beta, layer.post_sinr, scaling, &mut out.imag);
        }
    }
    out
}

pub(crate) fn check_layer_count(layers: usize) -> PhyResult<()> {
    if layers == 0 || layers > MAX_LAYERS_PER_UE {
        return Err(PhyError::invalid(format!(
            "{} layers per UE (supported: 1 or {})",
            layers, MAX_LAYERS_PER_UE
        )));
    }
    Ok(())
}

/// Demapper for one modulation order and scaling policy.
#[derive(Debug, Clone)]
pub struct SoftDemapper {
    modulation: ModulationOrder,
    scaling: LlrScaling,
}

impl SoftDemapper {
    pub fn new(modulation: ModulationOrder, scaling: LlrScaling) -> Self {
        Self {
            modulation,
            scaling,
        }
    }

    pub fn modulation(&self) -> ModulationOrder {
        self.modulation
    }

    pub fn scaling(&self) -> &LlrScaling {
        &self.scaling
    }

    /// Bytes written by [`SoftDemapper::demap`] for this configuration.
    pub fn output_len(&self, layers: usize, n_sc: SubcarrierCount) -> usize {
        llr_store::output_len(self.modulation, layers, n_sc.get())
    }

    /// Soft bits of every layer, without storing them.
    pub fn compute(&self, layers: &[LayerBatch]) -> PhyResult<[AxisLlrs; MAX_LAYERS_PER_UE]> {
        check_layer_count(layers.len())?;
        let mut llrs = [AxisLlrs::default(); MAX_LAYERS_PER_UE];
        for (dst, layer) in llrs.iter_mut().zip(layers) {
            *dst = demap_layer(self.modulation, layer, &self.scaling);
        }
        Ok(llrs)
    }

    /// Demap one processing unit into `out[offset..]`.
    ///
    /// Writes exactly `layers × Qm × nSc` bytes and returns that count; the
    /// rest of `out` is untouched.
    pub fn demap(
        &self,
        layers: &[LayerBatch],
        n_sc: SubcarrierCount,
        out: &mut [i8],
        offset: usize,
    ) -> PhyResult<usize> {
        let llrs = self.compute(layers)?;
        llr_store::store_llrs(self.modulation, &llrs[..layers.len()], n_sc, out, offset)
    }
}
