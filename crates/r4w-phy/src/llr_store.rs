//! LLR Store — bit-order packing and partial-batch writes
//!
//! Interleaves the per-axis soft bits into 38.211 bit order and writes only
//! the valid part of a batch to the caller's buffer. A batch always holds
//! [`LANES`] lanes, but a processing unit may cover fewer subcarriers; bytes
//! belonging to invalid lanes are never written.
//!
//! ```text
//!   one layer, 16QAM:   RE0: I0 Q0 I1 Q1 | RE1: I0 Q0 I1 Q1 | ...
//!   two layers, QPSK:   RE0: L0.I0 L0.Q0 L1.I0 L1.Q0 | RE1: ...
//! ```

use crate::constellation::ModulationOrder;
use crate::soft_demapper::{check_layer_count, AxisLlrs, MAX_LAYERS_PER_UE};
use crate::types::{ensure_capacity, PhyError, PhyResult, LANES};
use std::fmt;

/// Bits per symbol of the largest constellation.
const MAX_BITS_PER_SYMBOL: usize = 8;

/// Staging size for one full batch of the largest configuration.
const STAGING_BYTES: usize = LANES * MAX_LAYERS_PER_UE * MAX_BITS_PER_SYMBOL;

/// Valid subcarriers in one processing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubcarrierCount {
    Sc4 = 4,
    Sc8 = 8,
    Sc12 = 12,
    Sc16 = 16,
}

impl SubcarrierCount {
    pub const ALL: [SubcarrierCount; 4] = [
        SubcarrierCount::Sc4,
        SubcarrierCount::Sc8,
        SubcarrierCount::Sc12,
        SubcarrierCount::Sc16,
    ];

    pub fn get(self) -> usize {
        self as usize
    }

    /// Row index into per-count tables: 0 for 4 subcarriers up to 3 for 16.
    pub fn class(self) -> usize {
        self.get() / 4 - 1
    }
}

impl TryFrom<usize> for SubcarrierCount {
    type Error = PhyError;

    fn try_from(n: usize) -> PhyResult<Self> {
        match n {
            4 => Ok(SubcarrierCount::Sc4),
            8 => Ok(SubcarrierCount::Sc8),
            12 => Ok(SubcarrierCount::Sc12),
            16 => Ok(SubcarrierCount::Sc16),
            other => Err(PhyError::invalid(format!(
                "unsupported subcarrier count {} (expected 4, 8, 12 or 16)",
                other
            ))),
        }
    }
}

impl fmt::Display for SubcarrierCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Bytes produced for `valid_res` resource elements.
pub fn output_len(modulation: ModulationOrder, layers: usize, valid_res: usize) -> usize {
    valid_res * layers * modulation.bits_per_symbol()
}

/// Store the first `n_sc` lanes of every layer at `out[offset..]`.
///
/// Returns the number of bytes written.
pub fn store_llrs(
    modulation: ModulationOrder,
    layers: &[AxisLlrs],
    n_sc: SubcarrierCount,
    out: &mut [i8],
    offset: usize,
) -> PhyResult<usize> {
    store_masked(modulation, layers, n_sc.get(), out, offset)
}

/// Store the first `valid_res` lanes (0..=16) of every layer.
pub(crate) fn store_masked(
    modulation: ModulationOrder,
    layers: &[AxisLlrs],
    valid_res: usize,
    out: &mut [i8],
    offset: usize,
) -> PhyResult<usize> {
    check_layer_count(layers.len())?;
    if valid_res > LANES {
        return Err(PhyError::invalid(format!(
            "{} valid resource elements exceed the batch width {}",
            valid_res, LANES
        )));
    }

    let len = output_len(modulation, layers.len(), valid_res);
    ensure_capacity(out.len(), offset, len)?;

    let staging = interleave(modulation, layers);
    out[offset..offset + len].copy_from_slice(&staging[..len]);
    Ok(len)
}

/// Full-width packing into a stack buffer; only a prefix is ever copied out.
fn interleave(modulation: ModulationOrder, layers: &[AxisLlrs]) -> [i8; STAGING_BYTES] {
    let order = modulation.bit_interleave();
    let qm = order.len();
    let stride = qm * layers.len();

    let mut staging = [0i8; STAGING_BYTES];
    for (l, llrs) in layers.iter().enumerate() {
        for (b, &src) in order.iter().enumerate() {
            let plane = llrs.plane(src);
            for re in 0..LANES {
                staging[re * stride + l * qm + b] = narrow_i8(plane[re]);
            }
        }
    }
    staging
}

#[inline]
fn narrow_i8(x: i16) -> i8 {
    x.clamp(i8::MIN as i16, i8::MAX as i16) as i8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_point::I16x16;

    const SENTINEL: i8 = 0x5a;

    /// Encodes (layer, axis, plane, lane) in each value so the layout is checkable.
    fn tagged(layer: i16) -> AxisLlrs {
        let mut llrs = AxisLlrs::default();
        for k in 0..4 {
            llrs.real[k] = I16x16::from_fn(|i| layer * 64 + (k as i16) * 16 + i as i16 - 100);
            llrs.imag[k] = I16x16::from_fn(|i| -(layer * 64 + (k as i16) * 16 + i as i16) + 20);
        }
        llrs
    }

    #[test]
    fn test_subcarrier_count() {
        for (class, n) in SubcarrierCount::ALL.iter().enumerate() {
            assert_eq!(n.class(), class);
            assert_eq!(SubcarrierCount::try_from(n.get()).unwrap(), *n);
        }
        assert!(SubcarrierCount::try_from(6).is_err());
        assert!(SubcarrierCount::try_from(0).is_err());
    }

    #[test]
    fn test_single_layer_bit_order() {
        let llrs = tagged(0);
        let mut out = [SENTINEL; 64];
        let n = store_llrs(ModulationOrder::Qam16, &[llrs], SubcarrierCount::Sc4, &mut out, 0).unwrap();
        assert_eq!(n, 16);
        for re in 0..4 {
            let sym = &out[re * 4..re * 4 + 4];
            assert_eq!(sym[0], llrs.real[0][re] as i8);
            assert_eq!(sym[1], llrs.imag[0][re] as i8);
            assert_eq!(sym[2], llrs.real[1][re] as i8);
            assert_eq!(sym[3], llrs.imag[1][re] as i8);
        }
    }

    #[test]
    fn test_two_layers_are_re_major() {
        let layers = [tagged(0), tagged(1)];
        let mut out = [SENTINEL; 128];
        let n = store_llrs(ModulationOrder::Qpsk, &layers, SubcarrierCount::Sc8, &mut out, 0).unwrap();
        assert_eq!(n, 8 * 2 * 2);
        for re in 0..8 {
            let base = re * 4;
            assert_eq!(out[base], layers[0].real[0][re] as i8);
            assert_eq!(out[base + 1], layers[0].imag[0][re] as i8);
            assert_eq!(out[base + 2], layers[1].real[0][re] as i8);
            assert_eq!(out[base + 3], layers[1].imag[0][re] as i8);
        }
    }

    #[test]
    fn test_partial_store_leaves_tail_untouched() {
        for modulation in ModulationOrder::ALL {
            for n_sc in SubcarrierCount::ALL {
                let mut out = [SENTINEL; 300];
                let offset = 7;
                let n = store_llrs(modulation, &[tagged(0)], n_sc, &mut out, offset).unwrap();
                assert_eq!(n, n_sc.get() * modulation.bits_per_symbol());
                assert!(out[..offset].iter().all(|&b| b == SENTINEL));
                assert!(
                    out[offset + n..].iter().all(|&b| b == SENTINEL),
                    "{} with {} subcarriers wrote past its region",
                    modulation,
                    n_sc
                );
            }
        }
    }

    #[test]
    fn test_out_of_range_values_narrow() {
        let mut llrs = AxisLlrs::default();
        llrs.real[0] = I16x16::splat(1000);
        llrs.imag[0] = I16x16::splat(-1000);
        let mut out = [0i8; 8];
        store_llrs(ModulationOrder::Qpsk, &[llrs], SubcarrierCount::Sc4, &mut out, 0).unwrap();
        assert_eq!(&out[..2], &[127, -128]);
    }

    #[test]
    fn test_buffer_too_short() {
        let mut out = [SENTINEL; 40];
        let err = store_llrs(ModulationOrder::Qam64, &[tagged(0)], SubcarrierCount::Sc8, &mut out, 0)
            .unwrap_err();
        assert_eq!(
            err,
            PhyError::BufferTooShort {
                expected: 48,
                actual: 40
            }
        );
        assert!(out.iter().all(|&b| b == SENTINEL));
    }

    #[test]
    fn test_masked_store_counts() {
        let mut out = [SENTINEL; 64];
        let n = store_masked(ModulationOrder::Qam16, &[tagged(0)], 6, &mut out, 0).unwrap();
        assert_eq!(n, 24);
        assert_eq!(out[24], SENTINEL);
        assert_eq!(store_masked(ModulationOrder::Qam16, &[tagged(0)], 0, &mut out, 0), Ok(0));
        assert!(store_masked(ModulationOrder::Qam16, &[tagged(0)], 17, &mut out, 0).is_err());
    }
}
