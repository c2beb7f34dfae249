//! [![CI Status]][workflow] [![MSRV]][repo] [![Latest Version]][crates.io] [![Rust Doc Crate]][docs.rs] [![Rust Doc Main]][docs]
//!
//! [CI Status]: https://img.shields.io/github/actions/workflow/status/juntyr/numcodecs-rs/ci.yml?branch=main
//! [workflow]: https://github.com/juntyr/numcodecs-rs/actions/workflows/ci.yml?query=branch%3Amain
//!
//! [MSRV]: https://img.shields.io/badge/MSRV-1.85.0-blue
//! [repo]: https://github.com/juntyr/numcodecs-rs
//!
//! [Latest Version]: https://img.shields.io/crates/v/numcodecs-sz-regression
//! [crates.io]: https://crates.io/crates/numcodecs-sz-regression
//!
//! [Rust Doc Crate]: https://img.shields.io/docsrs/numcodecs-sz-regression
//! [docs.rs]: https://docs.rs/numcodecs-sz-regression/
//!
//! [Rust Doc Main]: https://img.shields.io/badge/docs-main-blue
//! [docs]: https://juntyr.github.io/numcodecs-rs/numcodecs_sz_regression
//!
//! Block-adaptive regression and Lorenzo error-bounded codec implementation
//! for the [`numcodecs`] API.
//!
//! The codec splits a three-dimensional `f32` volume into cubic blocks and
//! predicts every block either with a quantized linear regression model or
//! with the Lorenzo predictor, whichever is estimated to be more accurate.
//! All prediction residuals are quantized into buckets of twice the absolute
//! error bound and entropy-coded with a canonical Huffman code. Every
//! decompressed value differs from its original by at most the error bound.

#![allow(clippy::multiple_crate_versions)] // embedded-io

#[cfg(test)]
use ::serde_json as _;

use std::borrow::Cow;

use ndarray::{Array, Array1, ArrayView3, ArrayViewMut3, Ix3};
use numcodecs::{
    AnyArray, AnyArrayAssignError, AnyArrayDType, AnyArrayView, AnyArrayViewMut, AnyCowArray,
    Codec, StaticCodec, StaticCodecConfig,
};
use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

mod block;
mod coefficients;
mod container;
mod decoder;
mod encoder;
mod huffman;
mod intervals;
mod predictor;
mod quantizer;
mod regression;
mod samples;
mod table;

use container::{FormatError, SizeWidth};
use huffman::HuffmanError;

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
/// Codec providing error-bounded compression of three-dimensional `f32` data
/// with block-wise regression and Lorenzo prediction
pub struct SzRegressionCodec {
    /// Positive absolute error bound
    #[serde(rename = "eb_abs")]
    pub precision: Positive<f64>,
    /// Edge length of the cubic prediction blocks
    #[serde(default)]
    pub block_size: BlockSize,
    /// Fixed number of quantization intervals.
    ///
    /// If no number is given, it is estimated from a sample of the data,
    /// which also enables the substitution of a dominant background value.
    #[serde(default)]
    pub intervals: Option<QuantizationIntervals>,
    /// Width of the element count stored in the compressed data
    #[serde(default)]
    pub size_type: SizeType,
}

impl Codec for SzRegressionCodec {
    type Error = SzRegressionCodecError;

    fn encode(&self, data: AnyCowArray) -> Result<AnyArray, Self::Error> {
        match data {
            AnyCowArray::F32(data) => {
                let data = data.view().into_dimensionality::<Ix3>().map_err(|_| {
                    SzRegressionCodecError::NonThreeDimensionalData {
                        shape: data.shape().to_vec(),
                    }
                })?;

                Ok(AnyArray::U8(Array1::from(compress(data, self)?).into_dyn()))
            }
            encoded => Err(SzRegressionCodecError::UnsupportedDtype(encoded.dtype())),
        }
    }

    fn decode(&self, encoded: AnyCowArray) -> Result<AnyArray, Self::Error> {
        let AnyCowArray::U8(encoded) = encoded else {
            return Err(SzRegressionCodecError::EncodedDataNotBytes {
                dtype: encoded.dtype(),
            });
        };

        if !matches!(encoded.shape(), [_]) {
            return Err(SzRegressionCodecError::EncodedDataNotOneDimensional {
                shape: encoded.shape().to_vec(),
            });
        }

        decompress(&AnyCowArray::U8(encoded).as_bytes())
    }

    fn decode_into(
        &self,
        encoded: AnyArrayView,
        decoded: AnyArrayViewMut,
    ) -> Result<(), Self::Error> {
        let AnyArrayView::U8(encoded) = encoded else {
            return Err(SzRegressionCodecError::EncodedDataNotBytes {
                dtype: encoded.dtype(),
            });
        };

        if !matches!(encoded.shape(), [_]) {
            return Err(SzRegressionCodecError::EncodedDataNotOneDimensional {
                shape: encoded.shape().to_vec(),
            });
        }

        let AnyArrayViewMut::F32(decoded) = decoded else {
            return Err(SzRegressionCodecError::MismatchedDecodeIntoArray {
                source: AnyArrayAssignError::DTypeMismatch {
                    src: AnyArrayDType::F32,
                    dst: decoded.dtype(),
                },
            });
        };

        let encoded = AnyArrayView::U8(encoded);
        let encoded = encoded.as_bytes();
        let (shape, container) = decode_header(&encoded)?;

        if decoded.shape() != shape {
            return Err(SzRegressionCodecError::MismatchedDecodeIntoArray {
                source: AnyArrayAssignError::ShapeMismatch {
                    src: shape.to_vec(),
                    dst: decoded.shape().to_vec(),
                },
            });
        }

        let decoded = decoded.into_dimensionality::<Ix3>().map_err(|_| {
            SzRegressionCodecError::NonThreeDimensionalData {
                shape: shape.to_vec(),
            }
        })?;

        decode_container(container, decoded)
    }
}

impl StaticCodec for SzRegressionCodec {
    const CODEC_ID: &'static str = "sz-regression";

    type Config<'de> = Self;

    fn from_config(config: Self::Config<'_>) -> Self {
        config
    }

    fn get_config(&self) -> StaticCodecConfig<Self> {
        StaticCodecConfig::from(self)
    }
}

#[expect(clippy::derive_partial_eq_without_eq)] // floats are not Eq
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd)]
/// Positive floating point number
pub struct Positive<T>(T);

impl Positive<f64> {
    /// Creates a positive number, or returns `None` if `value` is not
    /// positive.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        (value > 0.0).then_some(Self(value))
    }

    #[must_use]
    /// Returns the positive number.
    pub const fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq<f64> for Positive<f64> {
    fn eq(&self, other: &f64) -> bool {
        self.0 == *other
    }
}

impl Serialize for Positive<f64> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> Deserialize<'de> for Positive<f64> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let x = f64::deserialize(deserializer)?;

        Self::new(x).ok_or_else(|| {
            serde::de::Error::invalid_value(serde::de::Unexpected::Float(x), &"a positive value")
        })
    }
}

impl JsonSchema for Positive<f64> {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("PositiveF64")
    }

    fn schema_id() -> Cow<'static, str> {
        Cow::Borrowed(concat!(module_path!(), "::", "Positive<f64>"))
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "type": "number",
            "exclusiveMinimum": 0.0
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[schemars(transparent)]
/// Edge length of the cubic prediction blocks, in `2..=64`.
pub struct BlockSize {
    #[schemars(range(min = 2, max = 64))]
    size: u8,
}

impl BlockSize {
    /// Smallest supported block edge length
    pub const MIN: u8 = 2;
    /// Largest supported block edge length
    pub const MAX: u8 = 64;

    /// Creates a block size, or returns `None` if `size` is not in
    /// `2..=64`.
    #[must_use]
    pub const fn new(size: u8) -> Option<Self> {
        if size >= Self::MIN && size <= Self::MAX {
            Some(Self { size })
        } else {
            None
        }
    }

    #[must_use]
    /// Returns the block edge length.
    pub fn get(self) -> usize {
        usize::from(self.size)
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        Self { size: 6 }
    }
}

impl Serialize for BlockSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.size.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BlockSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let size = u8::deserialize(deserializer)?;

        Self::new(size).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "block size {size} is not in {}..={}",
                Self::MIN,
                Self::MAX
            ))
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[schemars(transparent)]
/// Even number of quantization intervals, in `4..=2^24`.
pub struct QuantizationIntervals {
    #[schemars(range(min = 4, max = 16_777_216))]
    intervals: u32,
}

impl QuantizationIntervals {
    /// Smallest supported number of intervals
    pub const MIN: u32 = 4;
    /// Largest supported number of intervals
    pub const MAX: u32 = 1 << 24;

    /// Creates a number of intervals, or returns `None` if `intervals` is odd
    /// or not in `4..=2^24`.
    #[must_use]
    pub const fn new(intervals: u32) -> Option<Self> {
        if intervals >= Self::MIN && intervals <= Self::MAX && intervals % 2 == 0 {
            Some(Self { intervals })
        } else {
            None
        }
    }

    #[must_use]
    /// Returns the number of intervals.
    pub const fn get(self) -> u32 {
        self.intervals
    }
}

impl Serialize for QuantizationIntervals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.intervals.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for QuantizationIntervals {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let intervals = u32::deserialize(deserializer)?;

        Self::new(intervals).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "intervals {intervals} is not an even number in {}..={}",
                Self::MIN,
                Self::MAX
            ))
        })
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
/// Width of the element count stored in the compressed data
pub enum SizeType {
    /// 32 bit element count, which limits the data to `2^32 - 1` elements
    #[serde(rename = "u32")]
    U32,
    /// 64 bit element count
    #[default]
    #[serde(rename = "u64")]
    U64,
}

impl SizeType {
    const fn width(self) -> SizeWidth {
        match self {
            Self::U32 => SizeWidth::U32,
            Self::U64 => SizeWidth::U64,
        }
    }
}

#[derive(Debug, Error)]
/// Errors that may occur when applying the [`SzRegressionCodec`].
pub enum SzRegressionCodecError {
    /// [`SzRegressionCodec`] does not support the dtype
    #[error("SzRegression does not support the dtype {0}")]
    UnsupportedDtype(AnyArrayDType),
    /// [`SzRegressionCodec`] only supports three-dimensional data
    #[error("SzRegression only supports three-dimensional data but received an array of shape {shape:?}")]
    NonThreeDimensionalData {
        /// The unexpected shape of the data
        shape: Vec<usize>,
    },
    /// [`SzRegressionCodec`] cannot store the number of elements with the
    /// configured size type
    #[error("SzRegression cannot encode {len} elements with the size type {size_type:?}")]
    TooManyElements {
        /// The number of elements
        len: usize,
        /// The configured size type
        size_type: SizeType,
    },
    /// [`SzRegressionCodec`] failed to encode the header
    #[error("SzRegression failed to encode the header")]
    HeaderEncodeFailed {
        /// Opaque source error
        source: SzRegressionHeaderError,
    },
    /// [`SzRegressionCodec`] failed to entropy-code the data
    #[error("SzRegression failed to entropy-code the data")]
    EntropyCodingFailed {
        /// Opaque source error
        source: SzRegressionEntropyError,
    },
    /// [`SzRegressionCodec`] can only decode one-dimensional byte arrays but
    /// received an array of a different dtype
    #[error(
        "SzRegression can only decode one-dimensional byte arrays but received an array of dtype {dtype}"
    )]
    EncodedDataNotBytes {
        /// The unexpected dtype of the encoded array
        dtype: AnyArrayDType,
    },
    /// [`SzRegressionCodec`] can only decode one-dimensional byte arrays but
    /// received an array of a different shape
    #[error(
        "SzRegression can only decode one-dimensional byte arrays but received a byte array of shape {shape:?}"
    )]
    EncodedDataNotOneDimensional {
        /// The unexpected shape of the encoded array
        shape: Vec<usize>,
    },
    /// [`SzRegressionCodec`] failed to decode the header
    #[error("SzRegression failed to decode the header")]
    HeaderDecodeFailed {
        /// Opaque source error
        source: SzRegressionHeaderError,
    },
    /// [`SzRegressionCodec`] decoded an invalid compressed container
    #[error("SzRegression decoded an invalid compressed container")]
    InvalidContainer {
        /// Opaque source error
        source: SzRegressionFormatError,
    },
    /// [`SzRegressionCodec`] cannot decode into the provided array
    #[error("SzRegression cannot decode into the provided array")]
    MismatchedDecodeIntoArray {
        /// The source of the error
        #[from]
        source: AnyArrayAssignError,
    },
}

#[derive(Debug, Error)]
#[error(transparent)]
/// Opaque error for when encoding or decoding the header fails
pub struct SzRegressionHeaderError(postcard::Error);

#[derive(Debug, Error)]
#[error(transparent)]
/// Opaque error for when entropy coding fails
pub struct SzRegressionEntropyError(HuffmanError);

#[derive(Debug, Error)]
#[error(transparent)]
/// Opaque error for when the compressed container is malformed
pub struct SzRegressionFormatError(FormatError);

/// Compresses the three-dimensional `data` array with the error-bounded
/// block-regression codec configured by `config`.
///
/// # Errors
///
/// Errors with
/// - [`SzRegressionCodecError::HeaderEncodeFailed`] if encoding the header
///   failed
/// - [`SzRegressionCodecError::TooManyElements`] if the number of elements
///   does not fit the configured size type
/// - [`SzRegressionCodecError::EntropyCodingFailed`] if entropy coding
///   failed
pub fn compress(
    data: ArrayView3<f32>,
    config: &SzRegressionCodec,
) -> Result<Vec<u8>, SzRegressionCodecError> {
    let mut encoded = postcard::to_extend(
        &CompressionHeader {
            shape: Cow::Borrowed(data.shape()),
        },
        Vec::new(),
    )
    .map_err(|err| SzRegressionCodecError::HeaderEncodeFailed {
        source: SzRegressionHeaderError(err),
    })?;

    // empty volumes are fully described by their shape
    if data.is_empty() {
        return Ok(encoded);
    }

    if !config.size_type.width().fits(data.len()) {
        return Err(SzRegressionCodecError::TooManyElements {
            len: data.len(),
            size_type: config.size_type,
        });
    }

    let container = encoder::compress_volume(data, config).map_err(|err| {
        SzRegressionCodecError::EntropyCodingFailed {
            source: SzRegressionEntropyError(err),
        }
    })?;
    encoded.extend_from_slice(&container);

    Ok(encoded)
}

/// Decompresses the `encoded` data into a three-dimensional `f32` array.
///
/// # Errors
///
/// Errors with
/// - [`SzRegressionCodecError::HeaderDecodeFailed`] if decoding the header
///   failed
/// - [`SzRegressionCodecError::InvalidContainer`] if the compressed
///   container is malformed
pub fn decompress(encoded: &[u8]) -> Result<AnyArray, SzRegressionCodecError> {
    let (header, container) = decode_header(encoded)?;

    let mut decoded = Array::zeros(header);
    decode_container(container, decoded.view_mut())?;

    Ok(AnyArray::F32(decoded.into_dyn()))
}

/// Decompresses the `encoded` data into the three-dimensional `decoded`
/// array.
///
/// # Errors
///
/// Errors with
/// - [`SzRegressionCodecError::HeaderDecodeFailed`] if decoding the header
///   failed
/// - [`SzRegressionCodecError::MismatchedDecodeIntoArray`] if the `decoded`
///   array has the wrong shape
/// - [`SzRegressionCodecError::InvalidContainer`] if the compressed
///   container is malformed
pub fn decompress_into(
    encoded: &[u8],
    decoded: ArrayViewMut3<f32>,
) -> Result<(), SzRegressionCodecError> {
    let (shape, container) = decode_header(encoded)?;

    if decoded.shape() != shape {
        return Err(SzRegressionCodecError::MismatchedDecodeIntoArray {
            source: AnyArrayAssignError::ShapeMismatch {
                src: shape.to_vec(),
                dst: decoded.shape().to_vec(),
            },
        });
    }

    decode_container(container, decoded)
}

fn decode_header(encoded: &[u8]) -> Result<([usize; 3], &[u8]), SzRegressionCodecError> {
    let (header, container) =
        postcard::take_from_bytes::<CompressionHeader>(encoded).map_err(|err| {
            SzRegressionCodecError::HeaderDecodeFailed {
                source: SzRegressionHeaderError(err),
            }
        })?;

    let [r1, r2, r3] = *header.shape else {
        return Err(SzRegressionCodecError::NonThreeDimensionalData {
            shape: header.shape.into_owned(),
        });
    };

    Ok(([r1, r2, r3], container))
}

fn decode_container(
    container: &[u8],
    decoded: ArrayViewMut3<f32>,
) -> Result<(), SzRegressionCodecError> {
    if decoded.is_empty() {
        if !container.is_empty() {
            return Err(SzRegressionCodecError::InvalidContainer {
                source: SzRegressionFormatError(FormatError::TrailingBytes(container.len())),
            });
        }
        return Ok(());
    }

    decoder::decompress_volume(container, decoded).map_err(|err| {
        SzRegressionCodecError::InvalidContainer {
            source: SzRegressionFormatError(err),
        }
    })
}

#[derive(Serialize, Deserialize)]
struct CompressionHeader<'a> {
    #[serde(borrow)]
    shape: Cow<'a, [usize]>,
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array3};

    use super::*;

    fn codec(precision: f64) -> SzRegressionCodec {
        SzRegressionCodec {
            precision: Positive(precision),
            block_size: BlockSize::default(),
            intervals: None,
            size_type: SizeType::default(),
        }
    }

    #[test]
    fn unsupported_dtype() {
        let data = Array3::<f64>::zeros((4, 4, 4));
        let result = codec(0.1).encode(AnyCowArray::F64(data.into_dyn().into()));

        assert!(matches!(
            result,
            Err(SzRegressionCodecError::UnsupportedDtype(AnyArrayDType::F64))
        ));
    }

    #[test]
    fn non_three_dimensional_data() {
        let data = Array1::<f32>::zeros(64);
        let result = codec(0.1).encode(AnyCowArray::F32(data.into_dyn().into()));

        assert!(matches!(
            result,
            Err(SzRegressionCodecError::NonThreeDimensionalData { shape }) if shape == [64]
        ));
    }

    #[test]
    fn empty_volume_is_only_the_header() -> Result<(), SzRegressionCodecError> {
        let data = Array3::<f32>::zeros((0, 5, 7));
        let encoded = compress(data.view(), &codec(0.1))?;

        let mut expected = postcard::to_extend(
            &CompressionHeader {
                shape: Cow::Borrowed(&[0, 5, 7]),
            },
            Vec::new(),
        )
        .map_err(|err| SzRegressionCodecError::HeaderEncodeFailed {
            source: SzRegressionHeaderError(err),
        })?;
        assert_eq!(encoded, expected);

        let AnyArray::F32(decoded) = decompress(&encoded)? else {
            panic!("decoded array should be f32");
        };
        assert_eq!(decoded.shape(), [0, 5, 7]);

        expected.push(0);
        assert!(matches!(
            decompress(&expected),
            Err(SzRegressionCodecError::InvalidContainer { .. })
        ));

        Ok(())
    }

    #[test]
    fn size_type_limits_the_element_count() {
        let data = Array3::<f32>::zeros((1, 1, 1));
        let config = SzRegressionCodec {
            size_type: SizeType::U32,
            ..codec(0.1)
        };

        assert!(SizeType::U32.width().fits(data.len()));
        assert!(!SizeType::U32.width().fits(1 << 32));
        assert!(compress(data.view(), &config).is_ok());
    }

    #[test]
    fn config_accessors() {
        assert_eq!(BlockSize::default().get(), 6);
        assert_eq!(BlockSize::new(1), None);
        assert_eq!(BlockSize::new(65), None);
        assert_eq!(QuantizationIntervals::new(7), None);
        assert_eq!(
            QuantizationIntervals::new(1 << 16).map(QuantizationIntervals::get),
            Some(65536)
        );
        assert_eq!(Positive::new(0.0), None);
        assert_eq!(Positive::new(0.5).map(Positive::get), Some(0.5));
    }
}
