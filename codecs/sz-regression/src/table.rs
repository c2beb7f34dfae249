//! One-dimensional bounded-error codec for per-block integer tables.

use crate::{
    container::{ByteReader, ByteWriter, FormatError},
    huffman::{HuffmanError, HuffmanTable},
    quantizer::{ESCAPE_CODE, Quantizer},
};

/// Precision with which per-block tables are stored, which makes the codec
/// lossless for integers
pub const LOSSLESS_PRECISION: f64 = 0.5;

const TABLE_CAPACITY: u32 = 65536;
const TABLE_RADIUS: u32 = TABLE_CAPACITY / 2;

/// Compresses the `values` by quantizing the difference to the previously
/// reconstructed value with the given `precision`.
///
/// Values that cannot be quantized within the `precision` are stored raw.
///
/// # Errors
///
/// Errors with [`HuffmanError`] if the quantized codes cannot be
/// entropy-coded.
pub fn compress_table(values: &[u64], precision: f64) -> Result<Vec<u8>, HuffmanError> {
    let quantizer = Quantizer::new(precision, TABLE_CAPACITY, TABLE_RADIUS);

    let mut codes = Vec::with_capacity(values.len());
    let mut escapes = Vec::new();
    let mut last = 0.0_f64;

    for value in values {
        #[expect(clippy::cast_precision_loss)]
        let actual = *value as f64;

        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let representable = actual as u64 == *value;

        let code = quantizer
            .bucket(actual - last)
            .filter(|_| representable)
            .map(|code| (code, last + quantizer.offset(code)))
            .filter(|(_, reconstructed)| (actual - reconstructed).abs() <= precision);

        if let Some((code, reconstructed)) = code {
            codes.push(code);
            last = reconstructed;
        } else {
            codes.push(ESCAPE_CODE);
            escapes.push(*value);
            last = actual;
        }
    }

    let table = HuffmanTable::from_symbols(&codes);
    let encoded = table.encode(&codes)?;

    let mut writer = ByteWriter::default();
    writer.put_usize(values.len());
    writer.put_f64(precision);
    writer.put_u32(quantizer.radius());
    writer.put_huffman_table(&table);
    writer.put_section(&encoded);
    writer.put_usize(escapes.len());
    for escape in escapes {
        writer.put_u64(escape);
    }

    Ok(writer.into_bytes())
}

/// Decompresses a table of `len` values that was compressed with
/// [`compress_table`].
///
/// # Errors
///
/// Errors with [`FormatError`] if the `bytes` are not a valid compressed
/// table of `len` values.
pub fn decompress_table(bytes: &[u8], len: usize) -> Result<Vec<u64>, FormatError> {
    let mut reader = ByteReader::new(bytes);

    let count = reader.usize("table length")?;
    if count != len {
        return Err(FormatError::Inconsistent(
            "table length does not match the number of blocks",
        ));
    }
    let precision = reader.f64("table precision")?;
    let radius = reader.u32("table radius")?;
    let table = reader.huffman_table()?;
    let encoded = reader.section("table codes")?;
    let escape_count = reader.usize("table escape count")?;

    if precision.is_nan() || precision <= 0.0 {
        return Err(FormatError::Inconsistent("table precision must be positive"));
    }
    if escape_count > count || escape_count > reader.remaining() / 8 {
        return Err(FormatError::Inconsistent(
            "table escape count exceeds its length",
        ));
    }

    let mut escapes = (0..escape_count)
        .map(|_| reader.u64("table escape"))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();
    reader.finish()?;

    let codes = table.decode(encoded, count)?;
    let quantizer = Quantizer::new(precision, TABLE_CAPACITY, radius);

    let mut values = Vec::with_capacity(count);
    let mut last = 0.0_f64;

    for code in codes {
        if code == ESCAPE_CODE {
            let value = escapes.next().ok_or(FormatError::Inconsistent(
                "table has fewer escapes than escape codes",
            ))?;
            values.push(value);

            #[expect(clippy::cast_precision_loss)]
            let escaped = value as f64;
            last = escaped;
        } else {
            last += quantizer.offset(code);

            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            values.push(last.round().max(0.0) as u64);
        }
    }

    if escapes.next().is_some() {
        return Err(FormatError::Inconsistent(
            "table has more escapes than escape codes",
        ));
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_tables_are_lossless() -> Result<(), FormatError> {
        let values = [0, 3, 3, 17, 216, 180, 0, 1, 65_536 * 3, 42, u64::MAX, 7];

        let compressed = compress_table(&values, LOSSLESS_PRECISION)?;
        assert_eq!(decompress_table(&compressed, values.len())?, values);

        Ok(())
    }

    #[test]
    fn large_jumps_are_escaped() -> Result<(), FormatError> {
        let values = [1_u64 << 40, 5, (1 << 53) | 1];

        let compressed = compress_table(&values, LOSSLESS_PRECISION)?;

        // count, precision, radius, then the Huffman table
        let mut reader = ByteReader::new(&compressed);
        reader.take(8 + 8 + 4, "prefix")?;
        let table = reader.huffman_table()?;
        let encoded = reader.section("codes")?;
        assert_eq!(table.decode(encoded, 3)?, [ESCAPE_CODE, ESCAPE_CODE, ESCAPE_CODE]);
        assert_eq!(reader.usize("escapes")?, 3);

        assert_eq!(decompress_table(&compressed, values.len())?, values);

        Ok(())
    }

    #[test]
    fn empty_table() -> Result<(), FormatError> {
        let compressed = compress_table(&[], LOSSLESS_PRECISION)?;
        assert!(decompress_table(&compressed, 0)?.is_empty());

        Ok(())
    }

    #[test]
    fn truncated_table_is_rejected() -> Result<(), FormatError> {
        let compressed = compress_table(&[1, 2, 3, 4], LOSSLESS_PRECISION)?;

        for len in 0..compressed.len() {
            assert!(decompress_table(compressed.get(..len).unwrap_or_default(), 4).is_err());
        }

        Ok(())
    }

    #[test]
    fn forged_table_length_is_rejected() {
        let mut writer = ByteWriter::default();
        writer.put_usize(usize::MAX >> 2);
        writer.put_f64(LOSSLESS_PRECISION);
        writer.put_u32(TABLE_RADIUS);
        writer.put_huffman_table(&HuffmanTable::from_symbols(&[TABLE_RADIUS]));
        writer.put_section(&[0]);
        writer.put_usize(0);
        let forged = writer.into_bytes();

        assert!(matches!(
            decompress_table(&forged, 1),
            Err(FormatError::Inconsistent(_))
        ));
        assert!(matches!(
            decompress_table(&forged, usize::MAX >> 2),
            Err(FormatError::Entropy(HuffmanError::UnexpectedEnd { .. }))
        ));
    }
}
