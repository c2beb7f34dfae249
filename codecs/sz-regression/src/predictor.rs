//! Sampled per-block competition between the Lorenzo and regression
//! predictors.

use crate::{block::HaloBuffer, regression::RegressionModel};

/// Predictor that is used for all samples of a block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Predictor {
    /// 3-D Lorenzo extrapolation from the reconstructed lower neighbours
    Lorenzo,
    /// Linear regression model of the block
    Regression,
}

/// Bias added to each sampled Lorenzo error, relative to the precision, to
/// offset that the samples see raw instead of reconstructed neighbours
const LORENZO_NOISE: f64 = 1.22;

/// Selects the predictor for the raw block in the `buffer` by comparing the
/// absolute errors of both predictors on the block diagonal and its three
/// axis-reflections.
///
/// With a `background` value, each Lorenzo error is capped by the error of
/// substituting the background value. Ties go to the Lorenzo predictor.
#[must_use]
pub fn select_predictor(
    buffer: &HaloBuffer,
    block_size: usize,
    model: &RegressionModel,
    precision: f64,
    background: Option<f32>,
) -> Predictor {
    #[expect(clippy::cast_possible_truncation)]
    let noise = (precision * LORENZO_NOISE) as f32;

    let mut err_lorenzo = 0.0_f32;
    let mut err_regression = 0.0_f32;

    for i in 2..=block_size {
        let m = block_size - i + 1;

        for (x, y, z) in [(i, i, i), (i, i, m), (i, m, i), (i, m, m)] {
            let actual = buffer.get(x, y, z);

            let lorenzo = (buffer.lorenzo(x, y, z) - actual).abs() + noise;
            err_lorenzo += match background {
                Some(background) => lorenzo.min((background - actual).abs()),
                None => lorenzo,
            };

            err_regression += (model.predict(x - 1, y - 1, z - 1) - actual).abs();
        }
    }

    if err_regression < err_lorenzo {
        Predictor::Regression
    } else {
        Predictor::Lorenzo
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array, Array3};

    use super::*;

    fn select(volume: &Array3<f32>, precision: f64, background: Option<f32>) -> Predictor {
        let mut buffer = HaloBuffer::new(6);
        buffer.load(volume.view(), [0, 0, 0]);
        let model = RegressionModel::fit(volume.view());

        select_predictor(&buffer, 6, &model, precision, background)
    }

    #[test]
    #[expect(clippy::cast_precision_loss)]
    fn linear_block_selects_regression() {
        let volume = Array::from_shape_fn((6, 6, 6), |(i, j, k)| {
            3.0 * i as f32 + 0.5 * j as f32 - 2.0 * k as f32 + 7.0
        });

        assert_eq!(select(&volume, 0.01, None), Predictor::Regression);
    }

    #[test]
    fn step_block_selects_lorenzo() {
        let volume = Array::from_shape_fn((6, 6, 6), |(i, _, _)| if i < 3 { 0.0 } else { 100.0 });

        assert_eq!(select(&volume, 0.01, None), Predictor::Lorenzo);
    }

    #[test]
    fn noise_breaks_exact_ties_toward_regression() {
        let volume = Array::from_elem((6, 6, 6), 0.0_f32);

        // the noise keeps the Lorenzo error positive for a non-zero precision
        assert_eq!(select(&volume, 0.5, None), Predictor::Regression);
        assert_eq!(select(&volume, 0.0, None), Predictor::Lorenzo);
    }

    #[test]
    fn background_favours_lorenzo() {
        let volume = Array::from_shape_fn((6, 6, 6), |(i, j, k)| {
            if (i + j + k) % 5 == 0 { 4.0 } else { 0.0 }
        });

        assert_eq!(select(&volume, 0.01, Some(0.0)), Predictor::Lorenzo);
    }
}
