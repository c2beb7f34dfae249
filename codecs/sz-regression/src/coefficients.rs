//! Bounded-error delta quantization of the regression coefficient streams.

use crate::{
    container::{ByteReader, ByteWriter, FormatError},
    huffman::{HuffmanError, HuffmanTable},
    quantizer::{ESCAPE_CODE, Quantized, Quantizer},
    regression::{Coefficient, RegressionModel},
};

const COEFFICIENT_CAPACITY: u32 = 65536;
const COEFFICIENT_RADIUS: u32 = COEFFICIENT_CAPACITY / 2;

/// Running state of the delta quantization of one coefficient stream.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DeltaState {
    last: f32,
}

impl DeltaState {
    /// Quantizes the next `value` of the stream against the last reconstructed
    /// value.
    ///
    /// The returned state continues from the reconstruction, or from the raw
    /// `value` if it had to be escaped.
    #[must_use]
    pub fn quantize(self, value: f32, quantizer: &Quantizer) -> (Self, Quantized) {
        let quantized = quantizer.quantize(value, self.last);

        let last = match quantized {
            Quantized::Predicted { reconstructed, .. } => reconstructed,
            Quantized::Escaped => value,
        };

        (Self { last }, quantized)
    }

    /// Reconstructs the next value of the stream from its `code`, taking the
    /// value from the `escapes` if it was escaped.
    pub fn reconstruct(
        self,
        code: u32,
        quantizer: &Quantizer,
        escapes: &mut impl Iterator<Item = f32>,
    ) -> Result<(Self, f32), FormatError> {
        let last = if code == ESCAPE_CODE {
            escapes.next().ok_or(FormatError::Inconsistent(
                "coefficient stream has fewer escapes than escape codes",
            ))?
        } else {
            quantizer.reconstruct(code, self.last)
        };

        Ok((Self { last }, last))
    }

    #[must_use]
    pub const fn last(&self) -> f32 {
        self.last
    }
}

/// Quantized codes and escaped values of one coefficient across all
/// regression blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct CoefficientStream {
    pub quantizer: Quantizer,
    pub codes: Vec<u32>,
    pub escapes: Vec<f32>,
}

/// Quantizes the four coefficient streams of the `models`, in block order,
/// and replaces every coefficient with its reconstruction.
#[must_use]
pub fn quantize_coefficients(
    models: &mut [RegressionModel],
    precision: f64,
    block_size: usize,
) -> [CoefficientStream; 4] {
    Coefficient::ALL.map(|coefficient| {
        let quantizer = Quantizer::new(
            coefficient.precision(precision, block_size),
            COEFFICIENT_CAPACITY,
            COEFFICIENT_RADIUS,
        );

        let mut codes = Vec::with_capacity(models.len());
        let mut escapes = Vec::new();
        let mut state = DeltaState::default();

        for model in models.iter_mut() {
            let value = model.get(coefficient);
            let (next, quantized) = state.quantize(value, &quantizer);
            state = next;

            if quantized == Quantized::Escaped {
                escapes.push(value);
            }
            codes.push(quantized.code());
            model.set(coefficient, state.last());
        }

        log::trace!(
            "{coefficient:?} coefficients have {} escapes out of {}",
            escapes.len(),
            codes.len()
        );

        CoefficientStream {
            quantizer,
            codes,
            escapes,
        }
    })
}

/// Writes the coefficient streams, each with its own Huffman table.
pub fn write_coefficients(
    writer: &mut ByteWriter,
    streams: &[CoefficientStream; 4],
) -> Result<(), HuffmanError> {
    for stream in streams {
        let table = HuffmanTable::from_symbols(&stream.codes);
        let encoded = table.encode(&stream.codes)?;

        writer.put_f64(stream.quantizer.precision());
        writer.put_u32(stream.quantizer.radius());
        writer.put_huffman_table(&table);
        writer.put_section(&encoded);
        writer.put_len_u32(stream.escapes.len());
        for escape in &stream.escapes {
            writer.put_f32(*escape);
        }
    }

    Ok(())
}

/// Reads the coefficient streams of `count` regression blocks and
/// reconstructs their models.
pub fn read_coefficients(
    reader: &mut ByteReader,
    count: usize,
) -> Result<Vec<RegressionModel>, FormatError> {
    let mut models = vec![RegressionModel::default(); count];

    for coefficient in Coefficient::ALL {
        let precision = reader.f64("coefficient precision")?;
        let radius = reader.u32("coefficient radius")?;
        let table = reader.huffman_table()?;
        let encoded = reader.section("coefficient codes")?;
        let escape_count = reader.len_u32("coefficient escape count")?;

        if precision.is_nan() || precision <= 0.0 {
            return Err(FormatError::Inconsistent(
                "coefficient precision must be positive",
            ));
        }
        if escape_count > count {
            return Err(FormatError::Inconsistent(
                "coefficient escape count exceeds the number of blocks",
            ));
        }

        let escapes = (0..escape_count)
            .map(|_| reader.f32("coefficient escape"))
            .collect::<Result<Vec<_>, _>>()?;
        let mut escapes = escapes.into_iter();

        let codes = table.decode(encoded, count)?;
        let quantizer = Quantizer::new(precision, COEFFICIENT_CAPACITY, radius);

        let mut state = DeltaState::default();
        for (model, code) in models.iter_mut().zip(codes) {
            let (next, value) = state.reconstruct(code, &quantizer, &mut escapes)?;
            model.set(coefficient, value);
            state = next;
        }

        if escapes.next().is_some() {
            return Err(FormatError::Inconsistent(
                "coefficient stream has more escapes than escape codes",
            ));
        }
    }

    Ok(models)
}
