//! Parallel Processing Module
//!
//! Rayon-backed batch drivers for the PHY kernels. Every kernel is a pure
//! function over caller-owned buffers, so independent processing units can
//! run on any thread as long as their outputs do not overlap. Enable with
//! the `parallel` feature flag.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! r4w-phy = { version = "0.1", features = ["parallel"] }
//! ```
//!
//! ## Performance Considerations
//!
//! One batch of 16 subcarriers is a few hundred nanoseconds of work. Hand
//! whole slots (hundreds of units) to these drivers; for a handful of
//! batches the sequential kernels are faster.

use rayon::prelude::*;

use crate::cholesky::{CholeskyInverse, HermitianBatch};
use crate::llr_store::SubcarrierCount;
use crate::soft_demapper::{check_layer_count, LayerBatch, SoftDemapper};
use crate::types::{ensure_capacity, PhyResult};

/// One batch of one UE: 1 or 2 layers over `n_sc` valid subcarriers.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingUnit<'a> {
    pub layers: &'a [LayerBatch],
    pub n_sc: SubcarrierCount,
}

/// Parallel driver for many processing units sharing one demapper.
pub struct ParallelDemapper {
    demapper: SoftDemapper,
}

impl ParallelDemapper {
    pub fn new(demapper: SoftDemapper) -> Self {
        Self { demapper }
    }

    /// Output offset of every unit when stored back to back, plus the total.
    pub fn layout(&self, units: &[ProcessingUnit<'_>]) -> (Vec<usize>, usize) {
        let mut offsets = Vec::with_capacity(units.len());
        let mut total = 0;
        for unit in units {
            offsets.push(total);
            total += self.demapper.output_len(unit.layers.len(), unit.n_sc);
        }
        (offsets, total)
    }

    /// Demap all units into consecutive regions of `out`.
    ///
    /// The result is identical to calling [`SoftDemapper::demap`] for each
    /// unit in order with a running offset. Returns the total byte count.
    pub fn demap_units(&self, units: &[ProcessingUnit<'_>], out: &mut [i8]) -> PhyResult<usize> {
        for unit in units {
            check_layer_count(unit.layers.len())?;
        }
        let (_, total) = self.layout(units);
        ensure_capacity(out.len(), 0, total)?;

        // Split the output into one disjoint region per unit
        let mut regions = Vec::with_capacity(units.len());
        let mut rest = &mut out[..total];
        for unit in units {
            let len = self.demapper.output_len(unit.layers.len(), unit.n_sc);
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(len);
            regions.push(head);
            rest = tail;
        }

        tracing::trace!(units = units.len(), bytes = total, "parallel demap");

        units
            .par_iter()
            .zip(regions.into_par_iter())
            .try_for_each(|(unit, region)| {
                self.demapper
                    .demap(unit.layers, unit.n_sc, region, 0)
                    .map(|_| ())
            })?;
        Ok(total)
    }
}

/// Invert many Hermitian batches in parallel.
pub fn invert_batches<const N: usize>(
    inverse: &CholeskyInverse<N>,
    batches: &[HermitianBatch<N>],
) -> PhyResult<Vec<HermitianBatch<N>>> {
    batches.par_iter().map(|batch| inverse.invert(batch)).collect()
}
