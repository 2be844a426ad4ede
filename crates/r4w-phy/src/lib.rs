//! # 5G NR PUSCH Receiver Kernels
//!
//! Fixed-point soft-bit demapping and small Hermitian matrix inversion for
//! the uplink receiver, operating on batches of 16 subcarriers at a time.
//!
//! ## Overview
//!
//! - **Soft Demapping**: max-log LLRs for π/2-BPSK, QPSK, 16QAM, 64QAM and
//!   256QAM from equalized symbols, in saturating 16-bit fixed point
//! - **DMRS-Aware Demapping**: skip the REs reserved for DMRS CDM groups and
//!   store data REs compactly, for one or many UEs
//! - **LLR Store**: 38.211 bit order, partial batches without overwriting
//!   neighbouring output
//! - **Cholesky Inverse**: batched N×N Hermitian positive-definite inverse
//!   for the MMSE equalizer
//!
//! ## Signal Flow
//!
//! ```text
//! RX: REs → Channel Est → Cholesky Inverse → MMSE Equalizer
//!                                                 │  tx, beta, 1/(1-beta)
//!                                                 v
//!           LDPC Decoder ← LLR Store ← Soft Demapper (DMRS-aware)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use r4w_phy::prelude::*;
//! use num_complex::Complex32;
//!
//! let scaling = LlrScaling::default();
//! let demapper = SoftDemapper::new(ModulationOrder::Qam16, scaling);
//!
//! // Equalizer output for 4 subcarriers, beta = 0.5
//! let tx = [Complex32::new(0.9, -0.2); 4];
//! let layer = LayerBatch::quantize(&tx, &[2.0; 4], &[0.5; 4], &scaling).unwrap();
//!
//! let mut llrs = vec![0i8; demapper.output_len(1, SubcarrierCount::Sc4)];
//! demapper.demap(&[layer], SubcarrierCount::Sc4, &mut llrs, 0).unwrap();
//! assert_eq!(&llrs[..4], &[15, -2, -6, 1]);
//! ```

pub mod cholesky;
pub mod config;
pub mod constellation;
pub mod dmrs_demapper;
pub mod fixed_point;
pub mod llr_store;
pub mod observe;
pub mod reference;
pub mod soft_demapper;
pub mod types;

#[cfg(feature = "parallel")]
pub mod parallel;

pub use cholesky::{CholeskyInverse, CholeskyOptions, HermitianBatch};
pub use config::{ConfigError, PhyConfig};
pub use constellation::ModulationOrder;
pub use dmrs_demapper::{demap_users, BatchPhase, DmrsConfig, DmrsDemapper, DmrsType, UeAllocation};
pub use llr_store::SubcarrierCount;
pub use soft_demapper::{AxisLlrs, LayerBatch, LlrScaling, SoftDemapper};
pub use types::{PhyError, PhyResult};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cholesky::{CholeskyInverse, CholeskyOptions, HermitianBatch};
    pub use crate::constellation::ModulationOrder;
    pub use crate::dmrs_demapper::{demap_users, BatchPhase, DmrsConfig, DmrsDemapper, DmrsType, UeAllocation};
    pub use crate::fixed_point::I16x16;
    pub use crate::llr_store::SubcarrierCount;
    pub use crate::soft_demapper::{LayerBatch, LlrScaling, SoftDemapper};
    pub use crate::types::{ComplexI16, PhyError, PhyResult, LANES};
}
