use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::constants::splits::RATIO_SCALE;
use crate::data::{JoinedRecord, Partitions};
use crate::errors::PipelineError;

/// Logical dataset partitions produced by the split engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitLabel {
    /// Training split.
    Train,
    /// Validation split.
    Validation,
    /// Test split.
    Test,
}

impl SplitLabel {
    /// File stem used for the partition's parquet file.
    pub fn file_stem(self) -> &'static str {
        match self {
            SplitLabel::Train => "train",
            SplitLabel::Validation => "validate",
            SplitLabel::Test => "test",
        }
    }

    /// Parquet filename for the partition (`train.parquet`, ...).
    pub fn file_name(self) -> String {
        format!("{}.parquet", self.file_stem())
    }
}

impl fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// Ratio configuration for train/validation/test assignment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    /// Fraction assigned to train.
    pub train: f32,
    /// Fraction assigned to validation.
    pub validation: f32,
    /// Fraction assigned to test.
    pub test: f32,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.6,
            validation: 0.2,
            test: 0.2,
        }
    }
}

impl SplitRatios {
    /// Validate that ratios are non-negative, sum to `1.0` (within epsilon),
    /// and carry at most four decimal places.
    ///
    /// Cuts are computed in basis points, so a finer ratio such as `0.12345`
    /// is refused instead of being silently rounded.
    pub fn normalized(self) -> Result<Self, PipelineError> {
        if self.train < 0.0 || self.validation < 0.0 || self.test < 0.0 {
            return Err(PipelineError::Configuration(
                "split ratios must be non-negative".to_string(),
            ));
        }
        if [self.train, self.validation, self.test]
            .into_iter()
            .any(|ratio| !is_whole_basis_points(ratio))
        {
            return Err(PipelineError::Configuration(
                "split ratios must have at most 4 decimal places".to_string(),
            ));
        }
        let sum = self.train + self.validation + self.test;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(PipelineError::Configuration(
                "split ratios must sum to 1.0".to_string(),
            ));
        }
        Ok(self)
    }

    /// Cut indices `(train_end, validation_end)` for `total` rows.
    ///
    /// Ratios are taken in basis points (see [`SplitRatios::normalized`]) and
    /// both cuts truncate an integer product, so `0.6/0.2/0.2` over 10 rows
    /// yields `(6, 8)` and over 7 rows yields `(4, 5)`.
    pub fn boundaries(self, total: usize) -> (usize, usize) {
        let train_bp = ratio_to_basis_points(self.train);
        let validation_bp = train_bp + ratio_to_basis_points(self.validation);
        let total = total as u128;
        let scale = RATIO_SCALE as u128;
        let train_end = (total * train_bp as u128 / scale) as usize;
        let validation_end = (total * validation_bp.min(RATIO_SCALE) as u128 / scale) as usize;
        (train_end, validation_end.max(train_end))
    }
}

fn is_whole_basis_points(ratio: f32) -> bool {
    let scaled = (ratio as f64) * RATIO_SCALE as f64;
    // f32 inputs like 0.6 land within ~1e-4 of a whole basis point.
    (scaled - scaled.round()).abs() < 1e-2
}

fn ratio_to_basis_points(ratio: f32) -> u64 {
    ((ratio as f64) * RATIO_SCALE as f64).round().max(0.0) as u64
}

#[derive(Debug, Clone)]
/// Small deterministic RNG used for reproducible shuffles across platforms.
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    /// Seeded generator; equal seeds yield equal streams.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64_internal(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

impl rand::RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64_internal() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_internal()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut offset = 0;
        while offset < dest.len() {
            let value = self.next_u64_internal();
            let bytes = value.to_le_bytes();
            let remaining = dest.len() - offset;
            let copy_len = remaining.min(bytes.len());
            dest[offset..offset + copy_len].copy_from_slice(&bytes[..copy_len]);
            offset += copy_len;
        }
    }
}

/// Shuffle `rows` in place with a seeded [`DeterministicRng`].
pub fn shuffle_rows<T>(rows: &mut [T], seed: u64) {
    let mut rng = DeterministicRng::new(seed);
    rows.shuffle(&mut rng);
}

/// Shuffle all rows once with `seed`, then cut the shuffled order into
/// contiguous train/validate/test blocks.
pub fn split_rows(
    mut rows: Vec<JoinedRecord>,
    ratios: SplitRatios,
    seed: u64,
) -> Result<Partitions, PipelineError> {
    let ratios = ratios.normalized()?;
    shuffle_rows(&mut rows, seed);
    let (train_end, validation_end) = ratios.boundaries(rows.len());

    let test = rows.split_off(validation_end);
    let validate = rows.split_off(train_end);
    let train = rows;

    info!(
        "[corpus_pairs:split] seed={} cuts=({}, {}) train={} validate={} test={}",
        seed,
        train_end,
        validation_end,
        train.len(),
        validate.len(),
        test.len()
    );

    Ok(Partitions {
        train,
        validate,
        test,
    })
}
