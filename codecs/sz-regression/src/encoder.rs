//! Compression pipeline from a raw volume to the byte container.

use ndarray::{Array3, ArrayView3};

use crate::{
    SzRegressionCodec,
    block::{BlockGrid, HaloBuffer, fill_block},
    coefficients::{quantize_coefficients, write_coefficients},
    container::ByteWriter,
    huffman::{HuffmanError, HuffmanTable},
    intervals::{background_value, fit_interval_count_and_background},
    predictor::{Predictor, select_predictor},
    regression::RegressionModel,
    samples::{BlockModel, SampleCoder},
    table::{LOSSLESS_PRECISION, compress_table},
};

/// Compresses the `volume` into a container with the `config`.
///
/// The number of elements must fit into the configured size type.
pub fn compress_volume(
    volume: ArrayView3<f32>,
    config: &SzRegressionCodec,
) -> Result<Vec<u8>, HuffmanError> {
    let precision = config.precision.get();
    let block_size = config.block_size.get();
    let width = config.size_type.width();

    let (r1, r2, r3) = volume.dim();
    let grid = BlockGrid::new([r1, r2, r3], block_size);

    log::debug!(
        "compressing a {r1}x{r2}x{r3} volume in {:?} blocks of size {block_size}",
        grid.blocks_per_axis()
    );

    let models = fit_models(volume, &grid);

    let (intervals, background) = match config.intervals {
        Some(intervals) => (intervals.get(), None),
        None => {
            let fit = fit_interval_count_and_background(volume, precision);
            let background = fit
                .uses_background()
                .then(|| background_value(volume, fit.dense_position, precision));

            log::debug!(
                "fitted {} intervals with background frequency {} against {} correct \
                 predictions",
                fit.intervals,
                fit.background_frequency,
                fit.correct_frequency
            );

            (fit.intervals, background)
        }
    };
    log::debug!("using {intervals} intervals and background value {background:?}");

    let mut buffer = HaloBuffer::new(block_size);

    let predictors = grid
        .blocks()
        .zip(&models)
        .map(|(block, model)| {
            buffer.load(volume, grid.origin(block));
            select_predictor(&buffer, block_size, model, precision, background)
        })
        .collect::<Vec<_>>();

    let mut regression_models = models
        .iter()
        .zip(&predictors)
        .filter(|(_, predictor)| **predictor == Predictor::Regression)
        .map(|(model, _)| *model)
        .collect::<Vec<_>>();

    log::debug!(
        "{} of {} blocks use the regression predictor",
        regression_models.len(),
        grid.num_blocks()
    );

    // the sample quantization only ever sees the quantized coefficients
    let coefficients = (!regression_models.is_empty())
        .then(|| quantize_coefficients(&mut regression_models, precision, block_size));

    let coder = SampleCoder::new(block_size, precision, intervals, background);

    let mut codes = Vec::with_capacity(grid.num_blocks() * grid.block_elements());
    let mut escapes = Vec::new();
    let mut escape_counts = Vec::with_capacity(grid.num_blocks());
    let mut regression_models = regression_models.iter();

    for (block, predictor) in grid.blocks().zip(&predictors) {
        buffer.load(volume, grid.origin(block));

        let model = match predictor {
            Predictor::Lorenzo => None,
            Predictor::Regression => regression_models.next(),
        };
        let model = model.map_or(BlockModel::Lorenzo, |model| BlockModel::Regression(*model));

        let escape_count = coder.quantize_block(&mut buffer, model, &mut codes, &mut escapes);
        escape_counts.push(escape_count as u64);
    }

    log::debug!("{} of {} samples were escaped", escapes.len(), codes.len());

    let table = HuffmanTable::from_symbols(&codes);

    let mut block_streams = Vec::new();
    let mut block_sizes = Vec::with_capacity(grid.num_blocks());
    for block_codes in codes.chunks(grid.block_elements()) {
        let encoded = table.encode(block_codes)?;
        block_sizes.push(encoded.len() as u64);
        block_streams.extend_from_slice(&encoded);
    }

    let mut writer = ByteWriter::default();
    writer.put_header(width);
    writer.put_size(width, volume.len());
    writer.put_len_u32(block_size);
    writer.put_f64(precision);
    writer.put_u32(intervals);
    writer.put_huffman_table(&table);
    writer.put_u8(u8::from(background.is_some()));
    writer.put_f32(background.unwrap_or(0.0));
    writer.put_bitmap(
        &predictors
            .iter()
            .map(|predictor| *predictor == Predictor::Lorenzo)
            .collect::<Vec<_>>(),
    );
    if let Some(coefficients) = &coefficients {
        write_coefficients(&mut writer, coefficients)?;
    }
    writer.put_usize(escapes.len());
    writer.put_section(&compress_table(&escape_counts, LOSSLESS_PRECISION)?);
    for escape in escapes {
        writer.put_f32(escape);
    }
    writer.put_section(&compress_table(&block_sizes, LOSSLESS_PRECISION)?);
    writer.put_bytes(&block_streams);

    log::debug!("compressed {} samples into {} bytes", volume.len(), writer.len());

    Ok(writer.into_bytes())
}

/// Fits the regression model of every block, in visitation order.
fn fit_models(volume: ArrayView3<f32>, grid: &BlockGrid) -> Vec<RegressionModel> {
    let block_size = grid.block_size();
    let mut block = Array3::zeros((block_size, block_size, block_size));

    grid.blocks()
        .map(|coord| {
            fill_block(volume, grid.origin(coord), block.view_mut());
            RegressionModel::fit(block.view())
        })
        .collect()
}
