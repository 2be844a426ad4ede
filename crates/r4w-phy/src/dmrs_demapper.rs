//! DMRS-Aware Demapping — data RE extraction on DMRS-bearing symbols
//!
//! On OFDM symbols that carry PUSCH DMRS, the CDM groups reserved for DMRS
//! (`0..cdm_groups_without_data`) carry no data. The demapper gathers the
//! data lanes of a batch to the front with a static permutation, demaps
//! them like any other batch, and stores only the data REs.
//!
//! ## CDM group layout (TS 38.211 §6.4.1.1.3)
//!
//! ```text
//!   subcarrier in PRB:   0  1  2  3  4  5  6  7  8  9 10 11
//!   type 1 group:        0  1  0  1  0  1  0  1  0  1  0  1
//!   type 2 group:        0  0  1  1  2  2  0  0  1  1  2  2
//! ```
//!
//! A 16-lane batch does not align with PRBs, so the tables are keyed by the
//! batch phase (first subcarrier modulo 12, always 0, 4 or 8).
//!
//! ## Example
//!
//! ```rust
//! use r4w_phy::prelude::*;
//!
//! let config = DmrsConfig::new(DmrsType::Type2, 1, 0).unwrap();
//! let demapper = DmrsDemapper::new(ModulationOrder::Qpsk, LlrScaling::default(), config);
//!
//! let mut out = [0i8; 64];
//! let layer = LayerBatch::default();
//! let n = demapper
//!     .demap(&[layer], SubcarrierCount::Sc16, BatchPhase::Sc0, &mut out, 0)
//!     .unwrap();
//! // 10 data REs out of 16, 2 bits each
//! assert_eq!(n, 20);
//! ```

use crate::constellation::ModulationOrder;
use crate::llr_store::{self, SubcarrierCount};
use crate::soft_demapper::{check_layer_count, LayerBatch, LlrScaling, SoftDemapper};
use crate::types::{ensure_capacity, Lanes, PhyError, PhyResult, SUBCARRIERS_PER_PRB};

/// PUSCH DMRS configuration type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmrsType {
    /// Comb-2: even/odd subcarriers, ports 0..=7
    Type1,
    /// Adjacent pairs, three CDM groups, ports 0..=11
    Type2,
}

impl DmrsType {
    /// Highest antenna port index (double-symbol DMRS included).
    pub fn max_port(self) -> u8 {
        match self {
            DmrsType::Type1 => 7,
            DmrsType::Type2 => 11,
        }
    }

    /// CDM group of an antenna port.
    pub fn cdm_group(self, port: u8) -> u8 {
        match self {
            DmrsType::Type1 => (port >> 1) & 1,
            DmrsType::Type2 => (port >> 1) % 3,
        }
    }

    /// CDM group occupying a subcarrier.
    pub fn cdm_group_of_subcarrier(self, subcarrier: usize) -> u8 {
        let k = subcarrier % SUBCARRIERS_PER_PRB;
        match self {
            DmrsType::Type1 => (k % 2) as u8,
            DmrsType::Type2 => ((k / 2) % 3) as u8,
        }
    }
}

impl TryFrom<u8> for DmrsType {
    type Error = PhyError;

    fn try_from(value: u8) -> PhyResult<Self> {
        match value {
            1 => Ok(DmrsType::Type1),
            2 => Ok(DmrsType::Type2),
            other => Err(PhyError::invalid(format!("unsupported DMRS type {}", other))),
        }
    }
}

/// Position of lane 0 inside its PRB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchPhase {
    Sc0,
    Sc4,
    Sc8,
}

impl BatchPhase {
    pub fn from_first_subcarrier(subcarrier: usize) -> PhyResult<Self> {
        match subcarrier % SUBCARRIERS_PER_PRB {
            0 => Ok(BatchPhase::Sc0),
            4 => Ok(BatchPhase::Sc4),
            8 => Ok(BatchPhase::Sc8),
            other => Err(PhyError::invalid(format!(
                "batch starting at subcarrier {} has phase {} (expected 0, 4 or 8)",
                subcarrier, other
            ))),
        }
    }

    pub fn offset(self) -> usize {
        match self {
            BatchPhase::Sc0 => 0,
            BatchPhase::Sc4 => 4,
            BatchPhase::Sc8 => 8,
        }
    }

    fn index(self) -> usize {
        self.offset() / 4
    }
}

/// DMRS setup of one UE on one DMRS symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DmrsConfig {
    dmrs_type: DmrsType,
    cdm_groups_without_data: u8,
    port: u8,
}

impl DmrsConfig {
    pub fn new(dmrs_type: DmrsType, cdm_groups_without_data: u8, port: u8) -> PhyResult<Self> {
        if !(1..=2).contains(&cdm_groups_without_data) {
            return Err(PhyError::invalid(format!(
                "{} CDM groups without data (supported: 1 or 2)",
                cdm_groups_without_data
            )));
        }
        if port > dmrs_type.max_port() {
            return Err(PhyError::invalid(format!(
                "DMRS port {} out of range for {:?} (max {})",
                port,
                dmrs_type,
                dmrs_type.max_port()
            )));
        }
        let group = dmrs_type.cdm_group(port);
        if group >= cdm_groups_without_data {
            return Err(PhyError::invalid(format!(
                "DMRS port {} is in CDM group {} but only {} group(s) are reserved",
                port, group, cdm_groups_without_data
            )));
        }
        Ok(Self {
            dmrs_type,
            cdm_groups_without_data,
            port,
        })
    }

    pub fn dmrs_type(&self) -> DmrsType {
        self.dmrs_type
    }

    pub fn cdm_groups_without_data(&self) -> u8 {
        self.cdm_groups_without_data
    }

    pub fn port(&self) -> u8 {
        self.port
    }

    /// True when the subcarrier carries data on a DMRS symbol.
    pub fn is_data_subcarrier(&self, subcarrier: usize) -> bool {
        self.dmrs_type.cdm_group_of_subcarrier(subcarrier) >= self.cdm_groups_without_data
    }

    /// Lane gather indices; data lanes first, ascending, zero padded.
    pub fn permutation(&self, phase: BatchPhase) -> &'static Lanes<u8> {
        let cdm = self.cdm_groups_without_data as usize - 1;
        match self.dmrs_type {
            DmrsType::Type1 => &PERMUTATION_TYPE1[cdm],
            DmrsType::Type2 => &PERMUTATION_TYPE2[cdm][phase.index()],
        }
    }

    /// Data REs among the first `n_sc` lanes.
    pub fn data_res(&self, n_sc: SubcarrierCount, phase: BatchPhase) -> usize {
        let cdm = self.cdm_groups_without_data as usize - 1;
        let count = match self.dmrs_type {
            DmrsType::Type1 => DATA_RE_COUNT_TYPE1[cdm][n_sc.class()],
            DmrsType::Type2 => DATA_RE_COUNT_TYPE2[cdm][phase.index()][n_sc.class()],
        };
        count as usize
    }
}

// Indexed by [cdm groups without data - 1]. Comb-2 has period 2 and every
// batch phase is even, so one row serves all phases.
static PERMUTATION_TYPE1: [Lanes<u8>; 2] = [
    [1, 3, 5, 7, 9, 11, 13, 15, 0, 0, 0, 0, 0, 0, 0, 0],
    [0; 16],
];

// Indexed by [cdm groups without data - 1][batch phase].
static PERMUTATION_TYPE2: [[Lanes<u8>; 3]; 2] = [
    [
        [2, 3, 4, 5, 8, 9, 10, 11, 14, 15, 0, 0, 0, 0, 0, 0],
        [0, 1, 4, 5, 6, 7, 10, 11, 12, 13, 0, 0, 0, 0, 0, 0],
        [0, 1, 2, 3, 6, 7, 8, 9, 12, 13, 14, 15, 0, 0, 0, 0],
    ],
    [
        [4, 5, 10, 11, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        [0, 1, 6, 7, 12, 13, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        [2, 3, 8, 9, 14, 15, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    ],
];

/// Data REs by [cdm - 1][nSc class] for DMRS type 1.
pub static DATA_RE_COUNT_TYPE1: [[u8; 4]; 2] = [[2, 4, 6, 8], [0, 0, 0, 0]];

/// Data REs by [cdm - 1][batch phase][nSc class] for DMRS type 2.
pub static DATA_RE_COUNT_TYPE2: [[[u8; 4]; 3]; 2] = [
    [[2, 4, 8, 10], [2, 6, 8, 10], [4, 6, 8, 12]],
    [[0, 2, 4, 4], [2, 4, 4, 6], [2, 2, 4, 6]],
];

/// Soft demapper for batches that mix data and DMRS REs.
#[derive(Debug, Clone)]
pub struct DmrsDemapper {
    inner: SoftDemapper,
    config: DmrsConfig,
}

impl DmrsDemapper {
    pub fn new(modulation: ModulationOrder, scaling: LlrScaling, config: DmrsConfig) -> Self {
        Self {
            inner: SoftDemapper::new(modulation, scaling),
            config,
        }
    }

    pub fn config(&self) -> &DmrsConfig {
        &self.config
    }

    pub fn modulation(&self) -> ModulationOrder {
        self.inner.modulation()
    }

    /// Bytes produced by one call.
    pub fn output_len(&self, layers: usize, n_sc: SubcarrierCount, phase: BatchPhase) -> usize {
        llr_store::output_len(self.modulation(), layers, self.config.data_res(n_sc, phase))
    }

    /// Demap the data REs of one batch into `out[offset..]`, compacted and
    /// in ascending subcarrier order.
    ///
    /// Returns the number of valid bytes written (`data REs × layers × Qm`).
    pub fn demap(
        &self,
        layers: &[LayerBatch],
        n_sc: SubcarrierCount,
        phase: BatchPhase,
        out: &mut [i8],
        offset: usize,
    ) -> PhyResult<usize> {
        check_layer_count(layers.len())?;
        let data_res = self.config.data_res(n_sc, phase);
        if data_res == 0 {
            return Ok(0);
        }

        let indices = self.config.permutation(phase);
        let mut gathered = [LayerBatch::default(); 2];
        for (dst, layer) in gathered.iter_mut().zip(layers) {
            *dst = layer.permute(indices);
        }
        let gathered = &gathered[..layers.len()];

        let llrs = self.inner.compute(gathered)?;
        llr_store::store_masked(self.modulation(), &llrs[..layers.len()], data_res, out, offset)
    }
}

/// One UE's share of a batch.
#[derive(Debug, Clone)]
pub struct UeAllocation<'a> {
    pub modulation: ModulationOrder,
    /// `None` on symbols without DMRS.
    pub dmrs: Option<DmrsConfig>,
    /// One or two layers.
    pub layers: &'a [LayerBatch],
    /// Write position of this UE in the shared buffer; advanced by each call.
    pub offset: usize,
}

impl UeAllocation<'_> {
    fn output_len(&self, n_sc: SubcarrierCount, phase: BatchPhase) -> usize {
        let res = match &self.dmrs {
            Some(dmrs) => dmrs.data_res(n_sc, phase),
            None => n_sc.get(),
        };
        llr_store::output_len(self.modulation, self.layers.len(), res)
    }
}

/// Demap every UE sharing a batch into one output buffer.
///
/// UEs are processed from the highest index down; each writes at its own
/// offset, which is then advanced past the bytes it produced. All requests
/// are validated before anything is written. Returns the total byte count.
pub fn demap_users(
    scaling: &LlrScaling,
    users: &mut [UeAllocation<'_>],
    n_sc: SubcarrierCount,
    phase: BatchPhase,
    out: &mut [i8],
) -> PhyResult<usize> {
    for ue in users.iter() {
        check_layer_count(ue.layers.len())?;
        ensure_capacity(out.len(), ue.offset, ue.output_len(n_sc, phase))?;
    }
    tracing::trace!(users = users.len(), n_sc = n_sc.get(), "demapping UE batch");

    let mut total = 0;
    for ue in users.iter_mut().rev() {
        let written = match ue.dmrs {
            Some(config) => {
                DmrsDemapper::new(ue.modulation, *scaling, config)
                    .demap(ue.layers, n_sc, phase, out, ue.offset)?
            }
            None => SoftDemapper::new(ue.modulation, *scaling).demap(ue.layers, n_sc, out, ue.offset)?,
        };
        ue.offset += written;
        total += written;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft_demapper::demap_layer;
    use crate::fixed_point::I16x16;
    use crate::types::{ComplexI16, LANES};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SENTINEL: i8 = 0x5a;

    fn all_configs() -> Vec<DmrsConfig> {
        let mut configs = Vec::new();
        for dmrs_type in [DmrsType::Type1, DmrsType::Type2] {
            for cdm in 1..=2 {
                for port in 0..=dmrs_type.max_port() {
                    if let Ok(c) = DmrsConfig::new(dmrs_type, cdm, port) {
                        configs.push(c);
                    }
                }
            }
        }
        configs
    }

    fn random_layer(rng: &mut StdRng) -> LayerBatch {
        let mut layer = LayerBatch::default();
        for i in 0..LANES {
            layer.tx[i] = ComplexI16::new(rng.gen_range(-12000..=12000), rng.gen_range(-12000..=12000));
            layer.beta.0[i] = rng.gen_range(1000..=7000);
            layer.post_sinr.0[i] = rng.gen_range(1024..=4096);
        }
        layer
    }

    #[test]
    fn test_config_validation() {
        assert!(DmrsConfig::new(DmrsType::Type1, 1, 0).is_ok());
        assert!(DmrsConfig::new(DmrsType::Type1, 1, 5).is_ok());
        // Port 2 is in CDM group 1, which carries data when only group 0 is reserved
        assert!(DmrsConfig::new(DmrsType::Type1, 1, 2).is_err());
        assert!(DmrsConfig::new(DmrsType::Type1, 2, 2).is_ok());
        assert!(DmrsConfig::new(DmrsType::Type1, 2, 8).is_err());
        assert!(DmrsConfig::new(DmrsType::Type1, 3, 0).is_err());
        assert!(DmrsConfig::new(DmrsType::Type1, 0, 0).is_err());
        assert!(DmrsConfig::new(DmrsType::Type2, 1, 6).is_ok());
        assert!(DmrsConfig::new(DmrsType::Type2, 2, 4).is_err());
        assert!(DmrsConfig::new(DmrsType::Type2, 2, 9).is_ok());
        assert!(DmrsConfig::new(DmrsType::Type2, 2, 12).is_err());
        assert!(DmrsType::try_from(3).is_err());
        assert_eq!(DmrsType::try_from(2).unwrap(), DmrsType::Type2);
    }

    #[test]
    fn test_batch_phase() {
        assert_eq!(BatchPhase::from_first_subcarrier(0).unwrap(), BatchPhase::Sc0);
        assert_eq!(BatchPhase::from_first_subcarrier(16).unwrap(), BatchPhase::Sc4);
        assert_eq!(BatchPhase::from_first_subcarrier(32).unwrap(), BatchPhase::Sc8);
        assert_eq!(BatchPhase::from_first_subcarrier(48).unwrap(), BatchPhase::Sc0);
        assert!(BatchPhase::from_first_subcarrier(6).is_err());
    }

    #[test]
    fn test_tables_match_cdm_layout() {
        for config in all_configs() {
            for phase in [BatchPhase::Sc0, BatchPhase::Sc4, BatchPhase::Sc8] {
                let data: Vec<u8> = (0..LANES)
                    .filter(|&i| config.is_data_subcarrier(phase.offset() + i))
                    .map(|i| i as u8)
                    .collect();
                let perm = config.permutation(phase);
                assert_eq!(&perm[..data.len()], &data[..], "{:?} {:?}", config, phase);
                assert!(perm[data.len()..].iter().all(|&i| i == 0));

                for n_sc in SubcarrierCount::ALL {
                    let expected = data.iter().filter(|&&i| (i as usize) < n_sc.get()).count();
                    assert_eq!(config.data_res(n_sc, phase), expected, "{:?} {:?} {}", config, phase, n_sc);
                }
            }
        }
    }

    #[test]
    fn test_type1_two_groups_has_no_data() {
        let config = DmrsConfig::new(DmrsType::Type1, 2, 3).unwrap();
        let demapper = DmrsDemapper::new(ModulationOrder::Qam64, LlrScaling::default(), config);
        let mut out = [SENTINEL; 8];
        let layer = LayerBatch::default();
        let n = demapper
            .demap(&[layer], SubcarrierCount::Sc16, BatchPhase::Sc0, &mut out, 0)
            .unwrap();
        assert_eq!(n, 0);
        assert!(out.iter().all(|&b| b == SENTINEL));
    }

    #[test]
    fn test_data_res_are_compacted_in_order() {
        let mut rng = StdRng::seed_from_u64(11);
        let scaling = LlrScaling::default();
        for config in all_configs() {
            for modulation in ModulationOrder::ALL {
                let layer = random_layer(&mut rng);
                let reference = demap_layer(modulation, &layer, &scaling);
                let demapper = DmrsDemapper::new(modulation, scaling, config);

                let phase = BatchPhase::Sc4;
                let mut out = [SENTINEL; 200];
                let n = demapper
                    .demap(&[layer], SubcarrierCount::Sc12, phase, &mut out, 3)
                    .unwrap();
                let qm = modulation.bits_per_symbol();
                let data_lanes: Vec<usize> = (0..12)
                    .filter(|&i| config.is_data_subcarrier(phase.offset() + i))
                    .collect();
                assert_eq!(n, data_lanes.len() * qm);

                for (slot, &lane) in data_lanes.iter().enumerate() {
                    let src = modulation.bit_interleave()[0];
                    assert_eq!(out[3 + slot * qm] as i16, reference.plane(src)[lane]);
                }
                assert!(out[3 + n..].iter().all(|&b| b == SENTINEL));
                assert!(out[..3].iter().all(|&b| b == SENTINEL));
            }
        }
    }

    #[test]
    fn test_two_layers_interleave_per_data_re() {
        let mut rng = StdRng::seed_from_u64(13);
        let scaling = LlrScaling::default();
        let config = DmrsConfig::new(DmrsType::Type2, 2, 1).unwrap();
        let phase = BatchPhase::Sc8;
        for modulation in ModulationOrder::ALL {
            let layers = [random_layer(&mut rng), random_layer(&mut rng)];
            let reference = [
                demap_layer(modulation, &layers[0], &scaling),
                demap_layer(modulation, &layers[1], &scaling),
            ];
            let demapper = DmrsDemapper::new(modulation, scaling, config);
            let qm = modulation.bits_per_symbol();

            for n_sc in SubcarrierCount::ALL {
                let mut out = [SENTINEL; 256];
                let n = demapper.demap(&layers, n_sc, phase, &mut out, 0).unwrap();
                assert_eq!(n, config.data_res(n_sc, phase) * 2 * qm);
                assert_eq!(n, demapper.output_len(2, n_sc, phase));

                let data_lanes: Vec<usize> = (0..n_sc.get())
                    .filter(|&i| config.is_data_subcarrier(phase.offset() + i))
                    .collect();
                for (slot, &lane) in data_lanes.iter().enumerate() {
                    for (l, llrs) in reference.iter().enumerate() {
                        for (b, &src) in modulation.bit_interleave().iter().enumerate() {
                            assert_eq!(
                                out[(slot * 2 + l) * qm + b] as i16,
                                llrs.plane(src)[lane],
                                "{} {} slot {} layer {} bit {}",
                                modulation,
                                n_sc,
                                slot,
                                l,
                                b
                            );
                        }
                    }
                }
                assert!(out[n..].iter().all(|&x| x == SENTINEL));
            }
        }
    }

    #[test]
    fn test_demap_users_lowest_index_written_last() {
        let positive = [LayerBatch {
            tx: [ComplexI16::new(8192, 8192); LANES],
            post_sinr: I16x16::splat(1 << 10),
            ..Default::default()
        }];
        let negative = [LayerBatch {
            tx: [ComplexI16::new(-8192, -8192); LANES],
            post_sinr: I16x16::splat(1 << 10),
            ..Default::default()
        }];
        // Both UEs target the same region; UE 0 runs last and wins
        let mut users = [
            UeAllocation {
                modulation: ModulationOrder::Qpsk,
                dmrs: None,
                layers: &positive,
                offset: 0,
            },
            UeAllocation {
                modulation: ModulationOrder::Qpsk,
                dmrs: None,
                layers: &negative,
                offset: 0,
            },
        ];
        let mut out = [SENTINEL; 8];
        let total = demap_users(
            &LlrScaling::default(),
            &mut users,
            SubcarrierCount::Sc4,
            BatchPhase::Sc0,
            &mut out,
        )
        .unwrap();
        assert_eq!(total, 16);
        assert_eq!(out, [11i8; 8]);
        assert_eq!(users[0].offset, 8);
        assert_eq!(users[1].offset, 8);
    }

    #[test]
    fn test_demap_users_descending_with_offsets() {
        let mut rng = StdRng::seed_from_u64(5);
        let scaling = LlrScaling::default();
        let a = [random_layer(&mut rng)];
        let b = [random_layer(&mut rng), random_layer(&mut rng)];
        let dmrs = DmrsConfig::new(DmrsType::Type1, 1, 1).unwrap();

        let mut users = [
            UeAllocation {
                modulation: ModulationOrder::Qpsk,
                dmrs: Some(dmrs),
                layers: &a,
                offset: 0,
            },
            UeAllocation {
                modulation: ModulationOrder::Qam16,
                dmrs: None,
                layers: &b,
                offset: 100,
            },
        ];
        let mut out = [SENTINEL; 256];
        let total = demap_users(&scaling, &mut users, SubcarrierCount::Sc8, BatchPhase::Sc0, &mut out).unwrap();

        // UE 0: 4 data REs x 1 layer x 2 bits; UE 1: 8 REs x 2 layers x 4 bits
        assert_eq!(total, 8 + 64);
        assert_eq!(users[0].offset, 8);
        assert_eq!(users[1].offset, 164);
        assert!(out[8..100].iter().all(|&x| x == SENTINEL));
        assert!(out[164..].iter().all(|&x| x == SENTINEL));

        let mut expected = [0i8; 64];
        SoftDemapper::new(ModulationOrder::Qam16, scaling)
            .demap(&b, SubcarrierCount::Sc8, &mut expected, 0)
            .unwrap();
        assert_eq!(&out[100..164], &expected[..]);
    }

    #[test]
    fn test_demap_users_validates_before_writing() {
        let layers = [LayerBatch {
            beta: I16x16::splat(4096),
            post_sinr: I16x16::splat(2048),
            ..Default::default()
        }];
        let mut users = [
            UeAllocation {
                modulation: ModulationOrder::Qpsk,
                dmrs: None,
                layers: &layers,
                offset: 0,
            },
            UeAllocation {
                modulation: ModulationOrder::Qam256,
                dmrs: None,
                layers: &layers,
                offset: 40,
            },
        ];
        let mut out = [SENTINEL; 64];
        let err = demap_users(
            &LlrScaling::default(),
            &mut users,
            SubcarrierCount::Sc4,
            BatchPhase::Sc0,
            &mut out,
        )
        .unwrap_err();
        assert_eq!(
            err,
            PhyError::BufferTooShort {
                expected: 72,
                actual: 64
            }
        );
        assert!(out.iter().all(|&x| x == SENTINEL));
        assert_eq!(users[0].offset, 0);
    }
}
