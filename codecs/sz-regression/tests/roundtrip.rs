#![allow(missing_docs)]
#![expect(clippy::unwrap_used)]

use ::{log as _, postcard as _, schemars as _, serde as _, thiserror as _};

use ndarray::{Array, Array1, Array3, ArrayView3};
use ndarray_rand::{
    RandomExt,
    rand::{SeedableRng, rngs::SmallRng},
    rand_distr::Uniform,
};
use numcodecs::{AnyArray, AnyArrayAssignError, AnyCowArray, Codec, StaticCodec};
use numcodecs_sz_regression::{
    SzRegressionCodec, SzRegressionCodecError, compress, decompress, decompress_into,
};
use serde::Deserialize;
use serde_json::json;

fn codec(config: serde_json::Value) -> SzRegressionCodec {
    SzRegressionCodec::from_config(Deserialize::deserialize(config).unwrap())
}

fn roundtrip(
    data: ArrayView3<f32>,
    codec: &SzRegressionCodec,
) -> Result<Array3<f32>, SzRegressionCodecError> {
    let encoded = compress(data, codec)?;

    let mut decoded = Array3::from_elem(data.dim(), f32::NAN);
    decompress_into(&encoded, decoded.view_mut())?;

    Ok(decoded)
}

fn assert_error_bounded(original: ArrayView3<f32>, decoded: ArrayView3<f32>, precision: f64) {
    assert_eq!(original.dim(), decoded.dim());

    for ((index, original), decoded) in original.indexed_iter().zip(decoded) {
        let error = f64::from((original - decoded).abs());
        assert!(
            error <= precision,
            "error {error} at {index:?} exceeds {precision}: {original} vs {decoded}"
        );
    }
}

#[expect(clippy::cast_precision_loss)]
fn smooth(shape: (usize, usize, usize)) -> Array3<f32> {
    Array::from_shape_fn(shape, |(i, j, k)| {
        let (x, y, z) = (i as f32 * 0.11, j as f32 * 0.07, k as f32 * 0.05);
        (x.sin() * y.cos() + z) * 25.0
    })
}

#[test]
fn random_volume_is_error_bounded() -> Result<(), SzRegressionCodecError> {
    std::mem::drop(simple_logger::init());

    let data = Array::random_using(
        (24, 20, 17),
        Uniform::new(0.0_f32, 100.0),
        &mut SmallRng::seed_from_u64(42),
    );

    for precision in [0.01, 0.5, 10.0] {
        let codec = codec(json!({ "eb_abs": precision }));
        let decoded = roundtrip(data.view(), &codec)?;
        assert_error_bounded(data.view(), decoded.view(), precision);
    }

    Ok(())
}

#[test]
fn smooth_volume_is_error_bounded() -> Result<(), SzRegressionCodecError> {
    std::mem::drop(simple_logger::init());

    let data = smooth((30, 25, 20));

    for block_size in [2, 3, 6, 8] {
        let codec = codec(json!({ "eb_abs": 0.05, "block_size": block_size }));
        let decoded = roundtrip(data.view(), &codec)?;
        assert_error_bounded(data.view(), decoded.view(), 0.05);
    }

    Ok(())
}

#[test]
fn compression_is_deterministic() -> Result<(), SzRegressionCodecError> {
    let data = smooth((17, 13, 11));
    let codec = codec(json!({ "eb_abs": 0.1 }));

    assert_eq!(compress(data.view(), &codec)?, compress(data.view(), &codec)?);

    Ok(())
}

#[test]
#[expect(clippy::cast_precision_loss)]
fn ramp_compresses_well() -> Result<(), SzRegressionCodecError> {
    let data = Array::from_shape_fn((32, 32, 32), |(i, j, k)| {
        (i + 2 * j + 3 * k) as f32 * 0.25
    });
    let codec = codec(json!({ "eb_abs": 0.01 }));

    let encoded = compress(data.view(), &codec)?;
    assert!(encoded.len() < data.len() * 4 / 8);

    let decoded = roundtrip(data.view(), &codec)?;
    assert_error_bounded(data.view(), decoded.view(), 0.01);

    Ok(())
}

#[test]
fn constant_volume_compresses_well() -> Result<(), SzRegressionCodecError> {
    let data = Array3::from_elem((32, 32, 32), 42.5_f32);
    let codec = codec(json!({ "eb_abs": 0.001 }));

    let encoded = compress(data.view(), &codec)?;
    assert!(encoded.len() < data.len() * 4 / 8);

    let decoded = roundtrip(data.view(), &codec)?;
    assert_error_bounded(data.view(), decoded.view(), 0.001);

    Ok(())
}

#[test]
fn partial_boundary_blocks_are_clamped() -> Result<(), SzRegressionCodecError> {
    let codec = codec(json!({ "eb_abs": 0.01 }));

    for shape in [(7, 6, 6), (6, 7, 6), (6, 6, 7), (1, 1, 1), (2, 3, 5), (13, 1, 8)] {
        let data = smooth(shape);
        let decoded = roundtrip(data.view(), &codec)?;
        assert_error_bounded(data.view(), decoded.view(), 0.01);
    }

    Ok(())
}

#[test]
fn outliers_and_non_finite_values_are_preserved() -> Result<(), SzRegressionCodecError> {
    let mut data = smooth((12, 12, 12));
    *data.get_mut([3, 4, 5]).unwrap() = 1.0e30;
    *data.get_mut([7, 7, 7]).unwrap() = f32::INFINITY;
    *data.get_mut([11, 0, 2]).unwrap() = f32::NAN;

    let codec = codec(json!({ "eb_abs": 0.01 }));
    let decoded = roundtrip(data.view(), &codec)?;

    assert_eq!(decoded.get([3, 4, 5]), Some(&1.0e30));
    assert_eq!(decoded.get([7, 7, 7]), Some(&f32::INFINITY));
    assert!(decoded.get([11, 0, 2]).unwrap().is_nan());

    for ((index, original), decoded) in data.indexed_iter().zip(&decoded) {
        if original.is_finite() {
            assert!(
                f64::from((original - decoded).abs()) <= 0.01,
                "error at {index:?}: {original} vs {decoded}"
            );
        }
    }

    Ok(())
}

#[test]
fn fixed_intervals_are_error_bounded() -> Result<(), SzRegressionCodecError> {
    let smooth = smooth((20, 20, 20));
    let random = Array::random_using(
        (20, 20, 20),
        Uniform::new(-1000.0_f32, 1000.0),
        &mut SmallRng::seed_from_u64(7),
    );

    for intervals in [4, 256, 65536] {
        let codec = codec(json!({ "eb_abs": 0.1, "intervals": intervals }));

        for data in [&smooth, &random] {
            let decoded = roundtrip(data.view(), &codec)?;
            assert_error_bounded(data.view(), decoded.view(), 0.1);
        }
    }

    Ok(())
}

#[test]
fn u32_size_type_saves_four_bytes() -> Result<(), SzRegressionCodecError> {
    let data = smooth((10, 10, 10));

    let wide = compress(data.view(), &codec(json!({ "eb_abs": 0.1 })))?;
    let narrow_codec = codec(json!({ "eb_abs": 0.1, "size_type": "u32" }));
    let narrow = compress(data.view(), &narrow_codec)?;

    assert_eq!(wide.len(), narrow.len() + 4);

    let decoded = roundtrip(data.view(), &narrow_codec)?;
    assert_error_bounded(data.view(), decoded.view(), 0.1);

    Ok(())
}

#[test]
fn empty_volumes_roundtrip() -> Result<(), SzRegressionCodecError> {
    let codec = codec(json!({ "eb_abs": 0.1 }));

    for shape in [(0, 0, 0), (0, 4, 4), (4, 0, 4), (4, 4, 0)] {
        let data = Array3::<f32>::zeros(shape);

        let AnyArray::F32(decoded) = decompress(&compress(data.view(), &codec)?)? else {
            panic!("decoded array should be f32");
        };
        assert_eq!(decoded.shape(), data.shape());
    }

    Ok(())
}

#[test]
fn codec_api() -> Result<(), SzRegressionCodecError> {
    let data = smooth((9, 8, 7));
    let codec = codec(json!({ "eb_abs": 0.02 }));

    let encoded = codec.encode(AnyCowArray::F32(data.view().into_dyn().into()))?;
    let AnyArray::U8(bytes) = &encoded else {
        panic!("encoded array should be bytes");
    };
    assert_eq!(bytes.ndim(), 1);

    let AnyArray::F32(decoded) = codec.decode(encoded.cow())? else {
        panic!("decoded array should be f32");
    };
    assert_error_bounded(
        data.view(),
        decoded.view().into_dimensionality().unwrap(),
        0.02,
    );

    let mut decoded = Array3::<f32>::zeros((9, 8, 7)).into_dyn();
    codec.decode_into(encoded.view(), numcodecs::AnyArrayViewMut::F32(decoded.view_mut()))?;
    assert_error_bounded(
        data.view(),
        decoded.view().into_dimensionality().unwrap(),
        0.02,
    );

    let mut wrong_shape = Array3::<f32>::zeros((9, 8, 6)).into_dyn();
    assert!(matches!(
        codec.decode_into(
            encoded.view(),
            numcodecs::AnyArrayViewMut::F32(wrong_shape.view_mut())
        ),
        Err(SzRegressionCodecError::MismatchedDecodeIntoArray {
            source: AnyArrayAssignError::ShapeMismatch { .. }
        })
    ));

    let mut wrong_dtype = Array3::<f64>::zeros((9, 8, 7)).into_dyn();
    assert!(matches!(
        codec.decode_into(
            encoded.view(),
            numcodecs::AnyArrayViewMut::F64(wrong_dtype.view_mut())
        ),
        Err(SzRegressionCodecError::MismatchedDecodeIntoArray {
            source: AnyArrayAssignError::DTypeMismatch { .. }
        })
    ));

    assert!(matches!(
        codec.decode(AnyCowArray::F32(data.view().into_dyn().into())),
        Err(SzRegressionCodecError::EncodedDataNotBytes { .. })
    ));

    let two_dimensional = Array::<u8, _>::zeros((2, 4)).into_dyn();
    assert!(matches!(
        codec.decode(AnyCowArray::U8(two_dimensional.view().into())),
        Err(SzRegressionCodecError::EncodedDataNotOneDimensional { .. })
    ));

    Ok(())
}

#[test]
fn corrupt_data_is_rejected() -> Result<(), SzRegressionCodecError> {
    let data = smooth((9, 8, 7));
    let codec = codec(json!({ "eb_abs": 0.02 }));
    let encoded = compress(data.view(), &codec)?;

    let truncated = Array1::from(encoded.get(..encoded.len() / 2).unwrap().to_vec());
    assert!(matches!(
        codec.decode(AnyCowArray::U8(truncated.into_dyn().into())),
        Err(SzRegressionCodecError::InvalidContainer { .. })
    ));

    assert!(matches!(
        decompress(&[]),
        Err(SzRegressionCodecError::HeaderDecodeFailed { .. })
    ));

    Ok(())
}
