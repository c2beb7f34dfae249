//! Decompression pipeline from the byte container back into a volume.

use ndarray::ArrayViewMut3;

use crate::{
    block::{BlockGrid, HaloBuffer, store_block},
    coefficients::read_coefficients,
    container::{ByteReader, FormatError},
    samples::{BlockModel, SampleCoder},
    table::decompress_table,
};

const MIN_BLOCK_SIZE: usize = 2;
const MAX_BLOCK_SIZE: usize = 64;

/// Decompresses the container `bytes` into the `volume`, which must have the
/// shape that was compressed.
pub fn decompress_volume(bytes: &[u8], mut volume: ArrayViewMut3<f32>) -> Result<(), FormatError> {
    let mut reader = ByteReader::new(bytes);

    let width = reader.header()?;
    if reader.size(width, "number of elements")? != volume.len() {
        return Err(FormatError::Inconsistent(
            "number of elements does not match the shape",
        ));
    }

    let block_size = reader.len_u32("block size")?;
    if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
        return Err(FormatError::Inconsistent("block size is out of range"));
    }

    let precision = reader.f64("precision")?;
    if precision.is_nan() || precision <= 0.0 {
        return Err(FormatError::Inconsistent("precision must be positive"));
    }

    let intervals = reader.u32("number of intervals")?;
    let table = reader.huffman_table()?;

    let background = match (reader.u8("background flag")?, reader.f32("background value")?) {
        (0, _) => None,
        (1, background) => Some(background),
        _ => return Err(FormatError::Inconsistent("background flag is not a boolean")),
    };

    let (r1, r2, r3) = volume.dim();
    let grid = BlockGrid::new([r1, r2, r3], block_size);

    log::debug!(
        "decompressing a {:?} volume in {:?} blocks of size {block_size}",
        grid.extents(),
        grid.blocks_per_axis()
    );

    let lorenzo_blocks = reader.bitmap(grid.num_blocks(), "predictor bitmap")?;
    let regression_count = lorenzo_blocks.iter().filter(|lorenzo| !**lorenzo).count();

    let regression_models = if regression_count > 0 {
        read_coefficients(&mut reader, regression_count)?
    } else {
        Vec::new()
    };

    let escape_total = reader.usize("number of escapes")?;
    let escape_counts = decompress_table(reader.section("escape counts")?, grid.num_blocks())?;
    if escape_counts
        .iter()
        .try_fold(0_u64, |sum, count| sum.checked_add(*count))
        .and_then(|sum| usize::try_from(sum).ok())
        != Some(escape_total)
    {
        return Err(FormatError::Inconsistent(
            "escape counts do not sum to the number of escapes",
        ));
    }
    if escape_total > reader.remaining() / 4 {
        return Err(FormatError::UnexpectedEnd { field: "escapes" });
    }

    let escapes = (0..escape_total)
        .map(|_| reader.f32("escape"))
        .collect::<Result<Vec<_>, _>>()?;
    let mut escapes = escapes.into_iter();

    let block_sizes = decompress_table(reader.section("block sizes")?, grid.num_blocks())?;
    if block_sizes
        .iter()
        .try_fold(0_u64, |sum, size| sum.checked_add(*size))
        .and_then(|sum| usize::try_from(sum).ok())
        != Some(reader.remaining())
    {
        return Err(FormatError::Inconsistent(
            "block sizes do not match the encoded samples",
        ));
    }

    let coder = SampleCoder::new(block_size, precision, intervals, background);
    let mut buffer = HaloBuffer::new(block_size);
    let mut regression_models = regression_models.into_iter();

    for (((block, lorenzo), escape_count), size) in grid
        .blocks()
        .zip(lorenzo_blocks)
        .zip(escape_counts)
        .zip(block_sizes)
    {
        let size = usize::try_from(size)
            .map_err(|_| FormatError::Inconsistent("block size exceeds the address space"))?;
        let escape_count = usize::try_from(escape_count)
            .map_err(|_| FormatError::Inconsistent("escape count exceeds the address space"))?;

        let codes = table.decode(reader.take(size, "block codes")?, grid.block_elements())?;

        let model = if lorenzo {
            BlockModel::Lorenzo
        } else {
            regression_models
                .next()
                .map(BlockModel::Regression)
                .ok_or(FormatError::Inconsistent("missing regression coefficients"))?
        };

        let mut block_escapes = escapes.by_ref().take(escape_count);
        coder.reconstruct_block(&mut buffer, model, &codes, &mut block_escapes)?;
        if block_escapes.next().is_some() {
            return Err(FormatError::Inconsistent(
                "block has more escapes than escape codes",
            ));
        }

        store_block(buffer.interior(), grid.origin(block), volume.view_mut());
    }

    reader.finish()
}
