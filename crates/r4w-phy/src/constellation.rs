//! Constellation Constants — per-order scaling and piecewise LLR tables
//!
//! Each QAM order is a pair of Gray-coded PAM axes (3GPP TS 38.211 §5.1).
//! With the equalizer model `y = beta*s + n` the max-log LLR of every bit on
//! one axis is piecewise linear in `u = |y|`:
//!
//! ```text
//!   LLR_k(u) = d * (slope[j] * u + offset[j] * beta*d) / (1 - beta)
//!
//!   segment j:  [0, 2*beta*d) [2*beta*d, 4*beta*d) ... [(L-2)*beta*d, inf)
//! ```
//!
//! where `d` is the reciprocal of the constellation normalization
//! (`1/sqrt(2)`, `1/sqrt(10)`, `1/sqrt(42)`, `1/sqrt(170)`) and `L` the number
//! of PAM levels per axis. Slopes and offsets are small integers, so the
//! tables below are exact; only `d` is quantized.
//!
//! Plane 0 of each axis is the sign bit and is odd in `y` (the table gives
//! `|LLR|`, the demapper restores the sign). All other planes are even in `y`.

use crate::types::{PhyError, PhyResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 1/sqrt(2) in Q15
pub const INV_SQRT_2_Q15: i16 = 23170;
/// 1/sqrt(10) in Q15
pub const INV_SQRT_10_Q15: i16 = 10362;
/// 1/sqrt(42) in Q15
pub const INV_SQRT_42_Q15: i16 = 5056;
/// 1/sqrt(170) in Q15
pub const INV_SQRT_170_Q15: i16 = 2513;

/// Modulation order of one demapping call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModulationOrder {
    /// π/2-BPSK (transform precoding only)
    Pi2Bpsk,
    Qpsk,
    Qam16,
    Qam64,
    Qam256,
}

impl ModulationOrder {
    pub const ALL: [ModulationOrder; 5] = [
        ModulationOrder::Pi2Bpsk,
        ModulationOrder::Qpsk,
        ModulationOrder::Qam16,
        ModulationOrder::Qam64,
        ModulationOrder::Qam256,
    ];

    /// Coded bits per complex symbol (Qm).
    pub fn bits_per_symbol(self) -> usize {
        match self {
            ModulationOrder::Pi2Bpsk => 1,
            ModulationOrder::Qpsk => 2,
            ModulationOrder::Qam16 => 4,
            ModulationOrder::Qam64 => 6,
            ModulationOrder::Qam256 => 8,
        }
    }

    /// Bit planes evaluated per axis.
    pub fn planes_per_axis(self) -> usize {
        self.profile().planes.len()
    }

    pub fn profile(self) -> &'static AxisProfile {
        match self {
            ModulationOrder::Pi2Bpsk => &BPSK_PROFILE,
            ModulationOrder::Qpsk => &QPSK_PROFILE,
            ModulationOrder::Qam16 => &QAM16_PROFILE,
            ModulationOrder::Qam64 => &QAM64_PROFILE,
            ModulationOrder::Qam256 => &QAM256_PROFILE,
        }
    }

    /// Output order of the soft bits of one symbol.
    pub fn bit_interleave(self) -> &'static [BitSource] {
        match self {
            ModulationOrder::Pi2Bpsk => &BPSK_INTERLEAVE,
            ModulationOrder::Qpsk => &QPSK_INTERLEAVE,
            ModulationOrder::Qam16 => &QAM16_INTERLEAVE,
            ModulationOrder::Qam64 => &QAM64_INTERLEAVE,
            ModulationOrder::Qam256 => &QAM256_INTERLEAVE,
        }
    }
}

impl TryFrom<u8> for ModulationOrder {
    type Error = PhyError;

    /// Accepts Qm as signalled in the PUSCH configuration.
    fn try_from(qm: u8) -> PhyResult<Self> {
        match qm {
            1 => Ok(ModulationOrder::Pi2Bpsk),
            2 => Ok(ModulationOrder::Qpsk),
            4 => Ok(ModulationOrder::Qam16),
            6 => Ok(ModulationOrder::Qam64),
            8 => Ok(ModulationOrder::Qam256),
            other => Err(PhyError::invalid(format!(
                "unsupported modulation order Qm={}",
                other
            ))),
        }
    }
}

impl fmt::Display for ModulationOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModulationOrder::Pi2Bpsk => "pi/2-BPSK",
            ModulationOrder::Qpsk => "QPSK",
            ModulationOrder::Qam16 => "16QAM",
            ModulationOrder::Qam64 => "64QAM",
            ModulationOrder::Qam256 => "256QAM",
        };
        f.write_str(name)
    }
}

/// One linear piece: `slope * u + offset * beta*d`, in units of `d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub slope: i16,
    pub offset: i16,
}

const fn seg(slope: i16, offset: i16) -> Segment {
    Segment { slope, offset }
}

/// Piecewise description of one axis.
#[derive(Debug)]
pub struct AxisProfile {
    /// `d` in Q15.
    pub inv_norm_q15: i16,
    /// Segment boundaries as multiples of `beta*d`, ascending.
    pub thresholds: &'static [i16],
    /// `planes[k][j]`: bit plane k, segment j (`thresholds.len() + 1` segments).
    pub planes: &'static [&'static [Segment]],
}

impl AxisProfile {
    pub fn num_segments(&self) -> usize {
        self.thresholds.len() + 1
    }
}

/// π/2-BPSK: the projection I+Q is demapped as one axis with `sqrt(2) = 2d`.
pub static BPSK_PROFILE: AxisProfile = AxisProfile {
    inv_norm_q15: INV_SQRT_2_Q15,
    thresholds: &[],
    planes: &[&[seg(2, 0)]],
};

pub static QPSK_PROFILE: AxisProfile = AxisProfile {
    inv_norm_q15: INV_SQRT_2_Q15,
    thresholds: &[],
    planes: &[&[seg(4, 0)]],
};

pub static QAM16_PROFILE: AxisProfile = AxisProfile {
    inv_norm_q15: INV_SQRT_10_Q15,
    thresholds: &[2],
    planes: &[
        &[seg(4, 0), seg(8, -8)],
        &[seg(-4, 8), seg(-4, 8)],
    ],
};

pub static QAM64_PROFILE: AxisProfile = AxisProfile {
    inv_norm_q15: INV_SQRT_42_Q15,
    thresholds: &[2, 4, 6],
    planes: &[
        &[seg(4, 0), seg(8, -8), seg(12, -24), seg(16, -48)],
        &[seg(-8, 24), seg(-4, 16), seg(-4, 16), seg(-8, 40)],
        &[seg(4, -8), seg(4, -8), seg(-4, 24), seg(-4, 24)],
    ],
};

pub static QAM256_PROFILE: AxisProfile = AxisProfile {
    inv_norm_q15: INV_SQRT_170_Q15,
    thresholds: &[2, 4, 6, 8, 10, 12, 14],
    planes: &[
        &[
            seg(4, 0),
            seg(8, -8),
            seg(12, -24),
            seg(16, -48),
            seg(20, -80),
            seg(24, -120),
            seg(28, -168),
            seg(32, -224),
        ],
        &[
            seg(-16, 80),
            seg(-12, 72),
            seg(-8, 56),
            seg(-4, 32),
            seg(-4, 32),
            seg(-8, 72),
            seg(-12, 120),
            seg(-16, 176),
        ],
        &[
            seg(8, -24),
            seg(4, -16),
            seg(4, -16),
            seg(8, -40),
            seg(-8, 88),
            seg(-4, 48),
            seg(-4, 48),
            seg(-8, 104),
        ],
        &[
            seg(4, -8),
            seg(4, -8),
            seg(-4, 24),
            seg(-4, 24),
            seg(4, -40),
            seg(4, -40),
            seg(-4, 56),
            seg(-4, 56),
        ],
    ],
};

/// Axis a soft bit is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// In-phase (also carries the I+Q projection for π/2-BPSK)
    Real,
    /// Quadrature
    Imag,
}

/// Where output bit `b` of a symbol comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSource {
    pub axis: Axis,
    pub plane: u8,
}

const fn re(plane: u8) -> BitSource {
    BitSource { axis: Axis::Real, plane }
}

const fn im(plane: u8) -> BitSource {
    BitSource { axis: Axis::Imag, plane }
}

// 38.211 bit order: b0 b1 = sign bits (I, Q), then alternating amplitude bits.
static BPSK_INTERLEAVE: [BitSource; 1] = [re(0)];
static QPSK_INTERLEAVE: [BitSource; 2] = [re(0), im(0)];
static QAM16_INTERLEAVE: [BitSource; 4] = [re(0), im(0), re(1), im(1)];
static QAM64_INTERLEAVE: [BitSource; 6] = [re(0), im(0), re(1), im(1), re(2), im(2)];
static QAM256_INTERLEAVE: [BitSource; 8] =
    [re(0), im(0), re(1), im(1), re(2), im(2), re(3), im(3)];
