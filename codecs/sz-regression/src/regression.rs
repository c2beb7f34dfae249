//! Per-block least-squares fit of a linear model over the local coordinates.

use ndarray::ArrayView3;

/// Linear model `a * ii + b * jj + c * kk + d` over the local coordinates of
/// a block.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RegressionModel {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
}

impl RegressionModel {
    /// Fits the model to a cubic `block` by closed-form least squares over the
    /// value moments.
    #[must_use]
    #[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn fit(block: ArrayView3<f32>) -> Self {
        let (block_size, _, _) = block.dim();

        let mut fx = 0.0_f32;
        let mut fy = 0.0_f32;
        let mut fz = 0.0_f32;
        let mut f = 0.0_f32;

        for (i, plane) in block.outer_iter().enumerate() {
            let mut sum_x = 0.0_f32;
            for (j, row) in plane.outer_iter().enumerate() {
                let mut sum_y = 0.0_f32;
                for (k, value) in row.iter().enumerate() {
                    sum_y += value;
                    fz += value * k as f32;
                }
                fy += sum_y * j as f32;
                sum_x += sum_y;
            }
            fx += sum_x * i as f32;
            f += sum_x;
        }

        let n = block_size as f32;
        let coeff = (1.0 / (block_size * block_size * block_size) as f64) as f32;
        let slope = |moment: f32| (2.0 * moment / (n - 1.0) - f) * 6.0 * coeff / (n + 1.0);

        let a = slope(fx);
        let b = slope(fy);
        let c = slope(fz);
        let d = f * coeff - ((n - 1.0) * a / 2.0 + (n - 1.0) * b / 2.0 + (n - 1.0) * c / 2.0);

        Self { a, b, c, d }
    }

    /// Predicts the value at the local coordinates `(ii, jj, kk)`.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn predict(&self, ii: usize, jj: usize, kk: usize) -> f32 {
        self.a * ii as f32 + self.b * jj as f32 + self.c * kk as f32 + self.d
    }

    #[must_use]
    pub const fn get(&self, coefficient: Coefficient) -> f32 {
        match coefficient {
            Coefficient::A => self.a,
            Coefficient::B => self.b,
            Coefficient::C => self.c,
            Coefficient::D => self.d,
        }
    }

    pub const fn set(&mut self, coefficient: Coefficient, value: f32) {
        match coefficient {
            Coefficient::A => self.a = value,
            Coefficient::B => self.b = value,
            Coefficient::C => self.c = value,
            Coefficient::D => self.d = value,
        }
    }
}

/// Coefficient of a [`RegressionModel`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Coefficient {
    A,
    B,
    C,
    D,
}

/// Relative precision of the quantized coefficients
const RELATIVE_COEFFICIENT_ERROR: f32 = 0.025;

impl Coefficient {
    pub const ALL: [Self; 4] = [Self::A, Self::B, Self::C, Self::D];

    /// Precision with which the coefficient is quantized, such that the
    /// prediction error summed over a block stays a fraction of the sample
    /// `precision`.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn precision(self, precision: f64, block_size: usize) -> f64 {
        let precision = f64::from(RELATIVE_COEFFICIENT_ERROR) * precision;

        match self {
            Self::A | Self::B | Self::C => precision / block_size as f64,
            Self::D => precision,
        }
    }
}
