//! Max-Log Reference Demapper — floating-point LLRs over the full constellation
//!
//! Exhaustive max-log soft demapping against the TS 38.211 §5.1 constellations
//! under the same equalizer model as the fixed-point demapper,
//! `y = beta*s + n` with noise power proportional to `beta*(1-beta)`:
//!
//! ```text
//!   LLR(b) = ( min_{s: b=1} |y - beta*s|² - min_{s: b=0} |y - beta*s|² ) / beta / (1-beta)
//! ```
//!
//! π/2-BPSK soft bits use half this scale, matching one QPSK axis.
//! Useful for validating the fixed-point tables and for offline tools.
//!
//! ## Example
//!
//! ```rust
//! use r4w_phy::reference::MaxLogDemapper;
//! use r4w_phy::constellation::ModulationOrder;
//! use num_complex::Complex64;
//!
//! let demapper = MaxLogDemapper::new(ModulationOrder::Qpsk);
//! let llrs = demapper.decode_symbol(Complex64::new(0.4, -0.2), 0.5, 2.0);
//! assert_eq!(llrs.len(), 2);
//! // Positive LLR = bit likely 0, negative = likely 1
//! assert!(llrs[0] > 0.0 && llrs[1] < 0.0);
//! ```

use crate::constellation::ModulationOrder;
use crate::types::{PhyError, PhyResult};
use num_complex::Complex64;

/// Amplitude of one PAM axis from its bits `c0, c1, ...` (38.211 Gray mapping).
fn pam_level(bits: &[bool]) -> f64 {
    let m = bits.len();
    let sign = |b: bool| if b { -1.0 } else { 1.0 };
    let mut a = 1.0;
    for k in (0..m.saturating_sub(1)).rev() {
        a = (1u32 << (m - 1 - k)) as f64 - sign(bits[k + 1]) * a;
    }
    sign(bits[0]) * a
}

/// Normalized constellation point for the bit label `bits` (b0 first).
///
/// The label must carry exactly `Qm` bits.
pub fn constellation_point(modulation: ModulationOrder, bits: &[bool]) -> PhyResult<Complex64> {
    if bits.len() != modulation.bits_per_symbol() {
        return Err(PhyError::invalid(format!(
            "{} label needs {} bits, got {}",
            modulation,
            modulation.bits_per_symbol(),
            bits.len()
        )));
    }
    Ok(label_point(modulation, bits))
}

fn label_point(modulation: ModulationOrder, bits: &[bool]) -> Complex64 {
    match modulation {
        // Even symbol index: bit 0 maps to (1+j)/sqrt(2)
        ModulationOrder::Pi2Bpsk => {
            let s = if bits[0] { -1.0 } else { 1.0 };
            Complex64::new(s, s) * std::f64::consts::FRAC_1_SQRT_2
        }
        _ => {
            let i_bits: Vec<bool> = bits.iter().step_by(2).copied().collect();
            let q_bits: Vec<bool> = bits.iter().skip(1).step_by(2).copied().collect();
            let levels = 1u32 << i_bits.len();
            // Mean power of a square M-QAM with odd integer levels: 2(L²-1)/3
            let norm = (2.0 * ((levels * levels) as f64 - 1.0) / 3.0).sqrt();
            Complex64::new(pam_level(&i_bits), pam_level(&q_bits)) / norm
        }
    }
}

/// Floating-point max-log demapper.
#[derive(Debug, Clone)]
pub struct MaxLogDemapper {
    modulation: ModulationOrder,
    /// Constellation points.
    constellation: Vec<Complex64>,
    /// Bit labels per constellation point, b0 first.
    labels: Vec<Vec<bool>>,
}

impl MaxLogDemapper {
    pub fn new(modulation: ModulationOrder) -> Self {
        let bps = modulation.bits_per_symbol();
        let labels: Vec<Vec<bool>> = (0..1usize << bps)
            .map(|i| (0..bps).map(|b| (i >> (bps - 1 - b)) & 1 == 1).collect())
            .collect();
        let constellation = labels
            .iter()
            .map(|bits| label_point(modulation, bits))
            .collect();
        Self {
            modulation,
            constellation,
            labels,
        }
    }

    pub fn modulation(&self) -> ModulationOrder {
        self.modulation
    }

    pub fn constellation(&self) -> &[Complex64] {
        &self.constellation
    }

    pub fn labels(&self) -> &[Vec<bool>] {
        &self.labels
    }

    pub fn bits_per_symbol(&self) -> usize {
        self.modulation.bits_per_symbol()
    }

    /// LLRs of one equalized symbol, in 38.211 bit order.
    ///
    /// `beta` must be positive; `inv_one_minus_beta` is `1/(1-beta)`.
    pub fn decode_symbol(&self, y: Complex64, beta: f64, inv_one_minus_beta: f64) -> Vec<f64> {
        let scale = match self.modulation {
            ModulationOrder::Pi2Bpsk => 0.5,
            _ => 1.0,
        } * inv_one_minus_beta
            / beta;

        (0..self.bits_per_symbol())
            .map(|bit| {
                let mut min_dist_0 = f64::INFINITY;
                let mut min_dist_1 = f64::INFINITY;
                for (point, label) in self.constellation.iter().zip(&self.labels) {
                    let dist = (y - *point * beta).norm_sqr();
                    if label[bit] {
                        min_dist_1 = min_dist_1.min(dist);
                    } else {
                        min_dist_0 = min_dist_0.min(dist);
                    }
                }
                (min_dist_1 - min_dist_0) * scale
            })
            .collect()
    }

    /// Decode a block of symbols sharing one `beta`.
    pub fn decode(&self, symbols: &[Complex64], beta: f64, inv_one_minus_beta: f64) -> Vec<f64> {
        symbols
            .iter()
            .flat_map(|&y| self.decode_symbol(y, beta, inv_one_minus_beta))
            .collect()
    }

    /// Label of the nearest point to `y / beta`.
    pub fn hard_decode(&self, y: Complex64, beta: f64) -> Vec<bool> {
        let mut min_dist = f64::INFINITY;
        let mut best_idx = 0;
        for (i, point) in self.constellation.iter().enumerate() {
            let dist = (y - *point * beta).norm_sqr();
            if dist < min_dist {
                min_dist = dist;
                best_idx = i;
            }
        }
        self.labels[best_idx].clone()
    }

    /// Convert LLRs to hard bits.
    pub fn llr_to_bits(llrs: &[f64]) -> Vec<bool> {
        llrs.iter().map(|&l| l < 0.0).collect()
    }
}
