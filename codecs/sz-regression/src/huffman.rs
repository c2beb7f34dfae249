//! Canonical Huffman coding of integer type-code streams.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BinaryHeap},
};

use thiserror::Error;

/// Codes longer than this are avoided by flattening the symbol frequencies.
const MAX_CODE_LENGTH: u8 = 32;

#[derive(Debug, Error)]
/// Errors that may occur when Huffman encoding or decoding.
pub enum HuffmanError {
    /// The symbol has no code in the table
    #[error("symbol {0} has no Huffman code")]
    UnknownSymbol(u32),
    /// The encoded bits do not match any code in the table
    #[error("encoded data contains an invalid Huffman code")]
    InvalidCode,
    /// The encoded data ended before all symbols were decoded
    #[error("encoded data ended after {decoded} of {expected} symbols")]
    UnexpectedEnd {
        /// Number of symbols that were decoded
        decoded: usize,
        /// Number of symbols that were expected
        expected: usize,
    },
    /// The serialized code table is malformed
    #[error("serialized Huffman table is malformed")]
    InvalidTable,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Code {
    bits: u32,
    length: u8,
}

/// Canonical Huffman code table over `u32` symbols.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HuffmanTable {
    codes: BTreeMap<u32, Code>,
    /// Symbols ordered by (code length, symbol)
    canonical: Vec<u32>,
    /// Number of codes per code length
    length_counts: [u32; MAX_CODE_LENGTH as usize + 1],
}

impl HuffmanTable {
    /// Builds the optimal code table for the frequencies of the `symbols`.
    #[must_use]
    pub fn from_symbols(symbols: &[u32]) -> Self {
        let mut frequencies = BTreeMap::<u32, u64>::new();
        for symbol in symbols {
            *frequencies.entry(*symbol).or_insert(0) += 1;
        }

        loop {
            let lengths = code_lengths(&frequencies);

            if lengths.values().all(|length| *length <= MAX_CODE_LENGTH) {
                return Self::from_lengths(lengths);
            }

            for frequency in frequencies.values_mut() {
                *frequency = frequency.div_ceil(2);
            }
        }
    }

    fn from_lengths(lengths: BTreeMap<u32, u8>) -> Self {
        let mut canonical = lengths.keys().copied().collect::<Vec<_>>();
        canonical.sort_by_key(|symbol| (lengths.get(symbol).copied(), *symbol));

        let mut length_counts = [0_u32; MAX_CODE_LENGTH as usize + 1];
        let mut codes = BTreeMap::new();

        let mut bits = 0_u32;
        let mut previous_length = 0_u8;

        for symbol in &canonical {
            let length = lengths.get(symbol).copied().unwrap_or(0);

            if previous_length > 0 {
                bits = (bits + 1) << (length - previous_length);
            }
            previous_length = length;

            codes.insert(*symbol, Code { bits, length });
            if let Some(count) = length_counts.get_mut(usize::from(length)) {
                *count += 1;
            }
        }

        Self {
            codes,
            canonical,
            length_counts,
        }
    }

    /// Number of symbols that have a code.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Number of nodes in the Huffman tree, `2 * symbols - 1`.
    #[must_use]
    pub fn node_count(&self) -> usize {
        (2 * self.len()).saturating_sub(1)
    }

    /// Serializes the code lengths of the table.
    ///
    /// The layout is the little-endian `u32` number of symbols, followed by a
    /// `u32` symbol and `u8` code length for each symbol in ascending order.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.len() * 5);

        #[expect(clippy::cast_possible_truncation)]
        bytes.extend_from_slice(&(self.len() as u32).to_le_bytes());

        for (symbol, code) in &self.codes {
            bytes.extend_from_slice(&symbol.to_le_bytes());
            bytes.push(code.length);
        }

        bytes
    }

    /// Deserializes a table written by [`HuffmanTable::to_bytes`].
    ///
    /// # Errors
    ///
    /// Errors with [`HuffmanError::InvalidTable`] if the `bytes` do not
    /// describe a complete prefix code.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HuffmanError> {
        let (count, mut entries) = bytes
            .split_first_chunk::<4>()
            .ok_or(HuffmanError::InvalidTable)?;
        let count = u32::from_le_bytes(*count) as usize;

        if entries.len() != count * 5 {
            return Err(HuffmanError::InvalidTable);
        }

        let mut lengths = BTreeMap::new();
        let mut previous = None;

        while let Some((symbol, rest)) = entries.split_first_chunk::<4>() {
            let (length, rest) = rest.split_first().ok_or(HuffmanError::InvalidTable)?;
            let symbol = u32::from_le_bytes(*symbol);

            if previous.is_some_and(|previous| previous >= symbol)
                || *length == 0
                || *length > MAX_CODE_LENGTH
            {
                return Err(HuffmanError::InvalidTable);
            }
            previous = Some(symbol);

            lengths.insert(symbol, *length);
            entries = rest;
        }

        // the code lengths must satisfy the Kraft equality, except for the
        //  single-symbol table whose only code is one bit long
        let kraft = lengths
            .values()
            .map(|length| 1_u64 << (MAX_CODE_LENGTH - length))
            .sum::<u64>();
        if lengths.len() > 1 && kraft != 1_u64 << MAX_CODE_LENGTH {
            return Err(HuffmanError::InvalidTable);
        }

        Ok(Self::from_lengths(lengths))
    }

    /// Encodes the `symbols` into a byte-aligned bit stream.
    ///
    /// # Errors
    ///
    /// Errors with [`HuffmanError::UnknownSymbol`] if a symbol does not have a
    /// code in this table.
    pub fn encode(&self, symbols: &[u32]) -> Result<Vec<u8>, HuffmanError> {
        let mut writer = BitWriter::default();

        for symbol in symbols {
            let code = self
                .codes
                .get(symbol)
                .ok_or(HuffmanError::UnknownSymbol(*symbol))?;
            writer.write(code.bits, code.length);
        }

        Ok(writer.finish())
    }

    /// Decodes exactly `count` symbols from the `encoded` bit stream.
    ///
    /// # Errors
    ///
    /// Errors with
    /// - [`HuffmanError::InvalidCode`] if the bits do not form a code
    /// - [`HuffmanError::UnexpectedEnd`] if the stream ends too early
    pub fn decode(&self, encoded: &[u8], count: usize) -> Result<Vec<u32>, HuffmanError> {
        // every code has at least one bit
        let available = encoded.len().saturating_mul(8);
        if count > available {
            return Err(HuffmanError::UnexpectedEnd {
                decoded: 0,
                expected: count,
            });
        }

        let mut reader = BitReader::new(encoded);
        let mut symbols = Vec::with_capacity(count);

        while symbols.len() < count {
            let end = HuffmanError::UnexpectedEnd {
                decoded: symbols.len(),
                expected: count,
            };

            let mut code = 0_u64;
            let mut first = 0_u64;
            let mut index = 0_u64;

            let symbol = 'length: {
                for length_count in self.length_counts.iter().skip(1) {
                    let Some(bit) = reader.read() else {
                        return Err(end);
                    };
                    code |= u64::from(bit);

                    let length_count = u64::from(*length_count);
                    if code < first + length_count {
                        let position = usize::try_from(index + code - first)
                            .map_err(|_| HuffmanError::InvalidCode)?;
                        break 'length self.canonical.get(position).copied();
                    }

                    index += length_count;
                    first = (first + length_count) << 1;
                    code <<= 1;
                }

                None
            };

            symbols.push(symbol.ok_or(HuffmanError::InvalidCode)?);
        }

        Ok(symbols)
    }
}

/// Computes the Huffman code length of every symbol from its frequency.
fn code_lengths(frequencies: &BTreeMap<u32, u64>) -> BTreeMap<u32, u8> {
    if frequencies.len() == 1 {
        return frequencies.keys().map(|symbol| (*symbol, 1)).collect();
    }

    // leaves are nodes 0..n, inner nodes are appended as they are merged
    let mut parents = vec![None; frequencies.len()];
    let mut heap = frequencies
        .values()
        .enumerate()
        .map(|(node, frequency)| Reverse((*frequency, node)))
        .collect::<BinaryHeap<_>>();

    while let (Some(Reverse((low, left))), Some(Reverse((high, right)))) = (heap.pop(), heap.pop())
    {
        let node = parents.len();
        parents.push(None);

        if let Some(parent) = parents.get_mut(left) {
            *parent = Some(node);
        }
        if let Some(parent) = parents.get_mut(right) {
            *parent = Some(node);
        }

        heap.push(Reverse((low + high, node)));
    }

    // parents are always created after their children, so a reverse sweep
    //  sees every parent's depth before its children's
    let mut depths = vec![0_usize; parents.len()];
    for node in (0..parents.len()).rev() {
        if let Some(Some(parent)) = parents.get(node) {
            let depth = depths.get(*parent).copied().unwrap_or(0) + 1;
            if let Some(slot) = depths.get_mut(node) {
                *slot = depth;
            }
        }
    }

    frequencies
        .keys()
        .zip(depths)
        .map(|(symbol, depth)| (*symbol, u8::try_from(depth).unwrap_or(u8::MAX)))
        .collect()
}

#[derive(Default)]
struct BitWriter {
    bytes: Vec<u8>,
    buffer: u64,
    filled: u8,
}

impl BitWriter {
    fn write(&mut self, bits: u32, length: u8) {
        self.buffer = (self.buffer << length) | u64::from(bits);
        self.filled += length;

        while self.filled >= 8 {
            self.filled -= 8;
            #[expect(clippy::cast_possible_truncation)]
            self.bytes.push((self.buffer >> self.filled) as u8);
        }

        self.buffer &= (1_u64 << self.filled) - 1;
    }

    fn finish(mut self) -> Vec<u8> {
        if self.filled > 0 {
            #[expect(clippy::cast_possible_truncation)]
            self.bytes.push((self.buffer << (8 - self.filled)) as u8);
        }

        self.bytes
    }
}

struct BitReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn read(&mut self) -> Option<u8> {
        let byte = self.bytes.get(self.position / 8)?;
        #[expect(clippy::cast_possible_truncation)]
        let bit = (byte >> (7 - (self.position % 8) as u8)) & 1;
        self.position += 1;
        Some(bit)
    }
}
