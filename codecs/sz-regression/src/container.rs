//! Little-endian byte container primitives and the container header.

use thiserror::Error;

use crate::huffman::{HuffmanError, HuffmanTable};

/// Marker bytes at the start of every container
pub const MAGIC: [u8; 4] = *b"SZRB";

/// Version of the container layout
pub const VERSION: u8 = 1;

#[derive(Debug, Error)]
/// Errors that may occur when reading a compressed container.
pub enum FormatError {
    /// The container ended before the `field` could be read
    #[error("container ended unexpectedly while reading the {field}")]
    UnexpectedEnd {
        /// Name of the field that could not be read
        field: &'static str,
    },
    /// The container does not start with the marker bytes
    #[error("container does not start with the expected marker")]
    InvalidMarker,
    /// The container layout version is not supported
    #[error("container version {0} is not supported")]
    UnsupportedVersion(u8),
    /// The container stores sizes with an unknown width
    #[error("container uses the unknown size type {0}")]
    InvalidSizeType(u8),
    /// A field of the container contradicts the other fields
    #[error("container is inconsistent: {0}")]
    Inconsistent(&'static str),
    /// The container has trailing bytes after its last field
    #[error("container has {0} trailing bytes")]
    TrailingBytes(usize),
    /// A Huffman-coded section of the container is malformed
    #[error(transparent)]
    Entropy(#[from] HuffmanError),
}

/// Width of the element count field in the container.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SizeWidth {
    /// Four byte element count
    U32,
    /// Eight byte element count
    U64,
}

impl SizeWidth {
    /// Whether an element count of `len` can be stored with this width.
    #[must_use]
    pub fn fits(self, len: usize) -> bool {
        match self {
            Self::U32 => u32::try_from(len).is_ok(),
            Self::U64 => u64::try_from(len).is_ok(),
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    const fn from_tag(tag: u8) -> Result<Self, FormatError> {
        match tag {
            4 => Ok(Self::U32),
            8 => Ok(Self::U64),
            tag => Err(FormatError::InvalidSizeType(tag)),
        }
    }
}

/// Appends little-endian fields to a byte buffer.
#[derive(Default)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn put_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_usize(&mut self, value: usize) {
        self.put_u64(value as u64);
    }

    #[expect(clippy::cast_possible_truncation)]
    pub fn put_len_u32(&mut self, value: usize) {
        debug_assert!(u32::try_from(value).is_ok());
        self.put_u32(value as u32);
    }

    pub fn put_f32(&mut self, value: f32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f64(&mut self, value: f64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Writes the element count with the given `width`.
    #[expect(clippy::cast_possible_truncation)]
    pub fn put_size(&mut self, width: SizeWidth, value: usize) {
        match width {
            SizeWidth::U32 => self.put_u32(value as u32),
            SizeWidth::U64 => self.put_usize(value),
        }
    }

    /// Writes the marker, version, and size width of the container.
    pub fn put_header(&mut self, width: SizeWidth) {
        self.put_bytes(&MAGIC);
        self.put_u8(VERSION);
        self.put_u8(width.tag());
        self.put_bytes(&[0, 0]);
    }

    /// Writes a Huffman table as its byte length, node count, and bytes.
    pub fn put_huffman_table(&mut self, table: &HuffmanTable) {
        let bytes = table.to_bytes();
        self.put_len_u32(bytes.len());
        self.put_len_u32(table.node_count());
        self.put_bytes(&bytes);
    }

    /// Writes a length-prefixed byte section.
    pub fn put_section(&mut self, bytes: &[u8]) {
        self.put_usize(bytes.len());
        self.put_bytes(bytes);
    }

    /// Writes the per-block predictor flags as a bitmap, where bit `b % 8` of
    /// byte `b / 8` is set iff block `b` is flagged.
    pub fn put_bitmap(&mut self, flags: &[bool]) {
        for chunk in flags.chunks(8) {
            let byte = chunk
                .iter()
                .enumerate()
                .fold(0_u8, |byte, (bit, flag)| byte | (u8::from(*flag) << bit));
            self.put_u8(byte);
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reads little-endian fields from a byte slice.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], FormatError> {
        let (head, tail) = self
            .bytes
            .split_at_checked(len)
            .ok_or(FormatError::UnexpectedEnd { field })?;
        self.bytes = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], FormatError> {
        let (head, tail) = self
            .bytes
            .split_first_chunk::<N>()
            .ok_or(FormatError::UnexpectedEnd { field })?;
        self.bytes = tail;
        Ok(*head)
    }

    pub fn u8(&mut self, field: &'static str) -> Result<u8, FormatError> {
        let [byte] = self.take_array::<1>(field)?;
        Ok(byte)
    }

    pub fn u32(&mut self, field: &'static str) -> Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.take_array(field)?))
    }

    pub fn u64(&mut self, field: &'static str) -> Result<u64, FormatError> {
        Ok(u64::from_le_bytes(self.take_array(field)?))
    }

    pub fn usize(&mut self, field: &'static str) -> Result<usize, FormatError> {
        usize::try_from(self.u64(field)?)
            .map_err(|_| FormatError::Inconsistent("size exceeds the address space"))
    }

    pub fn len_u32(&mut self, field: &'static str) -> Result<usize, FormatError> {
        usize::try_from(self.u32(field)?)
            .map_err(|_| FormatError::Inconsistent("size exceeds the address space"))
    }

    pub fn f32(&mut self, field: &'static str) -> Result<f32, FormatError> {
        Ok(f32::from_le_bytes(self.take_array(field)?))
    }

    pub fn f64(&mut self, field: &'static str) -> Result<f64, FormatError> {
        Ok(f64::from_le_bytes(self.take_array(field)?))
    }

    /// Reads the element count with the given `width`.
    pub fn size(&mut self, width: SizeWidth, field: &'static str) -> Result<usize, FormatError> {
        match width {
            SizeWidth::U32 => self.len_u32(field),
            SizeWidth::U64 => self.usize(field),
        }
    }

    /// Reads and validates the marker and version, returning the size width.
    pub fn header(&mut self) -> Result<SizeWidth, FormatError> {
        if self.take(MAGIC.len(), "marker")? != MAGIC {
            return Err(FormatError::InvalidMarker);
        }

        let version = self.u8("version")?;
        if version != VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }

        let width = SizeWidth::from_tag(self.u8("size type")?)?;
        self.take(2, "reserved header bytes")?;

        Ok(width)
    }

    /// Reads a Huffman table written by [`ByteWriter::put_huffman_table`].
    pub fn huffman_table(&mut self) -> Result<HuffmanTable, FormatError> {
        let len = self.len_u32("Huffman table size")?;
        let node_count = self.len_u32("Huffman node count")?;
        let table = HuffmanTable::from_bytes(self.take(len, "Huffman table")?)?;

        if table.node_count() != node_count {
            return Err(FormatError::Inconsistent(
                "Huffman node count does not match its table",
            ));
        }

        Ok(table)
    }

    /// Reads a section written by [`ByteWriter::put_section`].
    pub fn section(&mut self, field: &'static str) -> Result<&'a [u8], FormatError> {
        let len = self.usize(field)?;
        self.take(len, field)
    }

    /// Reads a bitmap of `count` flags written by [`ByteWriter::put_bitmap`].
    pub fn bitmap(&mut self, count: usize, field: &'static str) -> Result<Vec<bool>, FormatError> {
        let bytes = self.take(count.div_ceil(8), field)?;

        Ok((0..count)
            .map(|index| {
                bytes
                    .get(index / 8)
                    .is_some_and(|byte| (byte >> (index % 8)) & 1 == 1)
            })
            .collect())
    }

    pub const fn remaining(&self) -> usize {
        self.bytes.len()
    }

    /// Checks that all bytes have been consumed.
    pub const fn finish(self) -> Result<(), FormatError> {
        match self.bytes.len() {
            0 => Ok(()),
            trailing => Err(FormatError::TrailingBytes(trailing)),
        }
    }
}
