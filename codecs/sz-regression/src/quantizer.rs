//! Bounded-error scalar quantization of prediction residuals.

/// Type code signalling that the value is stored losslessly in an escape list
pub const ESCAPE_CODE: u32 = 0;

/// Type code signalling that the value equals the volume background value
pub const BACKGROUND_CODE: u32 = 1;

/// Outcome of quantizing one value against its prediction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Quantized {
    /// The value is represented by a bucket `code`, which decodes to the
    /// `reconstructed` value
    Predicted {
        /// Radius-offset bucket index
        code: u32,
        /// Value that a decoder reconstructs from the `code`
        reconstructed: f32,
    },
    /// The value could not be quantized within the precision and must be
    /// stored losslessly
    Escaped,
}

impl Quantized {
    /// The type code that represents this outcome in a code stream.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Predicted { code, .. } => *code,
            Self::Escaped => ESCAPE_CODE,
        }
    }
}

/// Linear quantizer with `capacity` buckets of width `2 * precision`, centred
/// on `radius`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Quantizer {
    precision: f64,
    capacity: u32,
    radius: u32,
}

impl Quantizer {
    /// Creates a quantizer with an explicit bucket `capacity` and `radius`.
    #[must_use]
    pub const fn new(precision: f64, capacity: u32, radius: u32) -> Self {
        Self {
            precision,
            capacity,
            radius,
        }
    }

    /// Creates a quantizer whose capacity is the number of quantization
    /// `intervals` and whose radius is half of it.
    #[must_use]
    pub const fn with_intervals(precision: f64, intervals: u32) -> Self {
        Self::new(precision, intervals, intervals / 2)
    }

    /// Shrinks the capacity by two buckets so that the escape and background
    /// codes can never be produced as bucket codes.
    #[must_use]
    pub const fn reserving_background(self) -> Self {
        Self {
            capacity: self.capacity.saturating_sub(2),
            ..self
        }
    }

    #[must_use]
    pub const fn precision(&self) -> f64 {
        self.precision
    }

    #[must_use]
    pub const fn radius(&self) -> u32 {
        self.radius
    }

    /// Quantizes the `actual` value against its `predicted` value.
    ///
    /// A bucket code is only emitted if its reconstruction lies within the
    /// precision of the `actual` value, otherwise the value is escaped.
    #[must_use]
    pub fn quantize(&self, actual: f32, predicted: f32) -> Quantized {
        let Some(code) = self.bucket(f64::from(actual - predicted)) else {
            return Quantized::Escaped;
        };

        let reconstructed = self.reconstruct(code, predicted);

        // guard against the reconstruction falling outside of the bound at
        //  representable-value boundaries
        if f64::from((actual - reconstructed).abs()) > self.precision {
            return Quantized::Escaped;
        }

        Quantized::Predicted {
            code,
            reconstructed,
        }
    }

    /// Reconstructs the value encoded by the bucket `code` relative to the
    /// `predicted` value.
    #[must_use]
    #[expect(clippy::cast_possible_truncation)]
    pub fn reconstruct(&self, code: u32, predicted: f32) -> f32 {
        (f64::from(predicted) + self.offset(code)) as f32
    }

    /// Computes the bucket code of a residual `diff`, or [`None`] if the
    /// residual exceeds the capacity.
    #[must_use]
    pub fn bucket(&self, diff: f64) -> Option<u32> {
        let mut bucket_count = diff.abs() / self.precision + 1.0;

        if !bucket_count.is_finite() || bucket_count >= f64::from(self.capacity) {
            return None;
        }

        if diff < 0.0 {
            bucket_count = -bucket_count;
        }

        #[expect(clippy::cast_possible_truncation)]
        let steps = (bucket_count / 2.0) as i64;

        u32::try_from(i64::from(self.radius) + steps).ok()
    }

    /// The reconstruction offset `2 * (code - radius) * precision` of a bucket
    /// `code`.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn offset(&self, code: u32) -> f64 {
        let steps = i64::from(code) - i64::from(self.radius);
        2.0 * (steps as f64) * self.precision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_prediction_is_centred() {
        let quantizer = Quantizer::with_intervals(0.1, 64);

        assert_eq!(
            quantizer.quantize(4.0, 4.0),
            Quantized::Predicted {
                code: 32,
                reconstructed: 4.0
            }
        );
    }

    #[test]
    fn reconstruction_is_within_precision() {
        let quantizer = Quantizer::with_intervals(0.01, 1024);

        for i in -400..400 {
            #[expect(clippy::cast_precision_loss)]
            let actual = 1.0 + (i as f32) * 0.00737;

            match quantizer.quantize(actual, 1.0) {
                Quantized::Predicted {
                    code,
                    reconstructed,
                } => {
                    assert!(f64::from((actual - reconstructed).abs()) <= 0.01);
                    assert_eq!(quantizer.reconstruct(code, 1.0), reconstructed);
                    assert_ne!(code, ESCAPE_CODE);
                }
                Quantized::Escaped => panic!("{actual} should be predictable"),
            }
        }
    }

    #[test]
    fn residual_beyond_capacity_escapes() {
        let quantizer = Quantizer::with_intervals(0.5, 32);

        assert_eq!(quantizer.quantize(15.5, 0.0), Quantized::Escaped);
        assert!(matches!(
            quantizer.quantize(14.0, 0.0),
            Quantized::Predicted { .. }
        ));
        assert_eq!(quantizer.quantize(f32::NAN, 0.0), Quantized::Escaped);
        assert_eq!(quantizer.quantize(f32::INFINITY, 0.0), Quantized::Escaped);
    }

    #[test]
    fn reserved_capacity_never_emits_background() {
        let quantizer = Quantizer::with_intervals(1.0, 8).reserving_background();

        for i in -20..=20 {
            #[expect(clippy::cast_precision_loss)]
            let code = quantizer.quantize(i as f32, 0.0).code();
            assert!(code == ESCAPE_CODE || code > BACKGROUND_CODE);
        }
    }
}
