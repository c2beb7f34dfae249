//! Per-sample quantization of a block against its chosen predictor.

use crate::{
    block::HaloBuffer,
    container::FormatError,
    quantizer::{BACKGROUND_CODE, ESCAPE_CODE, Quantized, Quantizer},
    regression::RegressionModel,
};

/// Predictor of a block together with its (quantized) model.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BlockModel {
    /// Lorenzo extrapolation from the reconstructed neighbours
    Lorenzo,
    /// Quantized regression model
    Regression(RegressionModel),
}

/// Sample quantization parameters shared by all blocks.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SampleCoder {
    block_size: usize,
    regression: Quantizer,
    lorenzo: Quantizer,
    background: Option<f32>,
}

impl SampleCoder {
    /// Creates a coder with `intervals` quantization buckets of the
    /// `precision`, optionally substituting the `background` value.
    #[must_use]
    pub const fn new(
        block_size: usize,
        precision: f64,
        intervals: u32,
        background: Option<f32>,
    ) -> Self {
        let regression = Quantizer::with_intervals(precision, intervals);

        Self {
            block_size,
            regression,
            lorenzo: regression.reserving_background(),
            background,
        }
    }

    /// Quantizes all samples of the raw block in the `buffer`, appending one
    /// type code per sample to the `codes` and the escaped values to the
    /// `escapes`.
    ///
    /// Lorenzo blocks leave their reconstruction in the `buffer`. Returns the
    /// number of escaped samples.
    pub fn quantize_block(
        &self,
        buffer: &mut HaloBuffer,
        model: BlockModel,
        codes: &mut Vec<u32>,
        escapes: &mut Vec<f32>,
    ) -> usize {
        let escapes_before = escapes.len();
        let precision = self.regression.precision();

        for_each_cell(self.block_size, |(x, y, z)| {
            let actual = buffer.get(x, y, z);

            let quantized = match model {
                BlockModel::Regression(model) => self
                    .regression
                    .quantize(actual, model.predict(x - 1, y - 1, z - 1)),
                BlockModel::Lorenzo => match self.background {
                    Some(background)
                        if f64::from((actual - background).abs()) <= precision =>
                    {
                        buffer.set(x, y, z, background);
                        codes.push(BACKGROUND_CODE);
                        return;
                    }
                    _ => self.lorenzo.quantize(actual, buffer.lorenzo(x, y, z)),
                },
            };

            match quantized {
                Quantized::Predicted {
                    code,
                    reconstructed,
                } => {
                    debug_assert!(f64::from((actual - reconstructed).abs()) <= precision);

                    if model == BlockModel::Lorenzo {
                        buffer.set(x, y, z, reconstructed);
                    }
                    codes.push(code);
                }
                Quantized::Escaped => {
                    codes.push(ESCAPE_CODE);
                    escapes.push(actual);
                }
            }
        });

        escapes.len() - escapes_before
    }

    /// Reconstructs all samples of a block into the `buffer` from their
    /// type `codes`, taking escaped values from `escapes`.
    pub fn reconstruct_block(
        &self,
        buffer: &mut HaloBuffer,
        model: BlockModel,
        codes: &[u32],
        escapes: &mut impl Iterator<Item = f32>,
    ) -> Result<(), FormatError> {
        let mut codes = codes.iter().copied();
        let mut result = Ok(());

        for_each_cell(self.block_size, |(x, y, z)| {
            if result.is_err() {
                return;
            }

            let value = match codes.next() {
                None => Err(FormatError::Inconsistent("block has too few type codes")),
                Some(ESCAPE_CODE) => escapes.next().ok_or(FormatError::Inconsistent(
                    "block has fewer escapes than escape codes",
                )),
                Some(code) => Ok(match (model, self.background) {
                    (BlockModel::Regression(model), _) => self
                        .regression
                        .reconstruct(code, model.predict(x - 1, y - 1, z - 1)),
                    (BlockModel::Lorenzo, Some(background)) if code == BACKGROUND_CODE => {
                        background
                    }
                    (BlockModel::Lorenzo, _) => {
                        self.lorenzo.reconstruct(code, buffer.lorenzo(x, y, z))
                    }
                }),
            };

            match value {
                Ok(value) => buffer.set(x, y, z, value),
                Err(err) => result = Err(err),
            }
        });

        result
    }
}

/// Visits the buffer coordinates of all block samples in scan order.
fn for_each_cell(block_size: usize, mut visit: impl FnMut((usize, usize, usize))) {
    for x in 1..=block_size {
        for y in 1..=block_size {
            for z in 1..=block_size {
                visit((x, y, z));
            }
        }
    }
}
