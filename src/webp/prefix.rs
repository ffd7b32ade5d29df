// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! Canonical prefix (Huffman) codes: construction from a length vector,
//! and the two serialization forms VP8L uses to transmit that vector.

use log::trace;

use crate::error::{Error, Location, Result};
use crate::webp::bitstream::LsbBitReader;

/// The order in which code-length-code lengths are transmitted; a
/// historical quirk of the format that front-loads the two run-length
/// escapes (16, 17 omitted; 18 first... in practice 17 and 18 come first)
/// so that sparse code-length alphabets cost as little as possible.
const CODE_LENGTH_CODE_ORDER: [usize; 19] =
    [17, 18, 0, 1, 2, 3, 4, 5, 16, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

/// A decoded canonical prefix code, ready to decode symbols from a bitstream.
pub enum PrefixCode {
    /// The alphabet contains exactly one symbol; it decodes without
    /// consuming any bits at all.
    Single(u16),
    /// A full table, indexed by the next `max_length` bits (LSB-first).
    Table {
        table: Vec<(u16, u8)>,
        max_length: u8,
    },
}

impl PrefixCode {
    /// Decodes the next symbol, consuming exactly its codeword's length.
    pub fn decode(&self, input: &mut LsbBitReader) -> Result<u16> {
        match *self {
            PrefixCode::Single(symbol) => Ok(symbol),
            PrefixCode::Table { ref table, max_length } => {
                let index = input.peek_bits(max_length as u32) as usize;
                let (symbol, length) = table[index];
                if length == 0 {
                    return Err(Error::InvalidCode("no codeword for this bit pattern")
                        .at(Location::ByteOffset(input.bit_offset() / 8)));
                }
                input.consume_bits(length as u32);
                Ok(symbol)
            }
        }
    }
}

/// Builds a canonical prefix code from a per-symbol length vector.
///
/// Symbols with length 0 do not appear in the alphabet. A single
/// nonzero-length symbol needs no codeword at all. Lengths must not reach
/// 16 or more; the canonical assignment is the standard one symbols sorted
/// by `(length, symbol)`, codes assigned in increasing order, left-shifted
/// on every length increase.
pub fn build_code(lengths: &[u8]) -> Result<PrefixCode> {
    let max_length = lengths.iter().cloned().max().unwrap_or(0);
    if max_length >= 16 {
        return Err(Error::InvalidCode("prefix code length reaches 16 bits")
            .at(Location::Unknown));
    }

    let mut symbols: Vec<(u8, u16)> = lengths
        .iter()
        .enumerate()
        .filter(|&(_, &len)| len > 0)
        .map(|(sym, &len)| (len, sym as u16))
        .collect();

    if symbols.is_empty() {
        // An all-zero length vector: nothing can ever be decoded from this
        // code. Treat symbol 0 as the (never-reached-in-practice) default.
        return Ok(PrefixCode::Single(0));
    }

    if symbols.len() == 1 {
        return Ok(PrefixCode::Single(symbols[0].1));
    }

    symbols.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let max_length = symbols.last().unwrap().0;
    let mut table = vec![(0u16, 0u8); 1usize << max_length];

    let mut code = 0u32;
    let mut prev_length = symbols[0].0;
    for &(length, symbol) in &symbols {
        code <<= length - prev_length;
        prev_length = length;

        // The codeword is `length` bits, MSB-first as assigned, but VP8L
        // reads bits LSB-first, so the table is indexed by the bit-reversal
        // of `code` in `length` bits, replicated across the unused
        // `max_length - length` high bits of the index.
        let reversed = reverse_bits(code, length);
        let step = 1usize << length;
        let mut index = reversed as usize;
        while index < table.len() {
            table[index] = (symbol, length);
            index += step;
        }

        code += 1;
    }

    trace!("built prefix code over {} symbols, max length {}", symbols.len(), max_length);

    Ok(PrefixCode::Table { table, max_length })
}

fn reverse_bits(code: u32, length: u8) -> u32 {
    let mut result = 0u32;
    let mut c = code;
    for _ in 0..length {
        result = (result << 1) | (c & 1);
        c >>= 1;
    }
    result
}

/// Reads a "simple" prefix code: one or two symbols, each with an implicit
/// codeword length of 0 (single symbol, no bits consumed) or 1.
fn read_simple(input: &mut LsbBitReader, alphabet_size: usize) -> Result<Vec<u8>> {
    let mut lengths = vec![0u8; alphabet_size];

    let num_symbols = input.read_bits(1) + 1;
    let is_first_8bits = input.read_bit();
    let symbol0 = input.read_bits(if is_first_8bits { 8 } else { 1 }) as usize;
    if symbol0 >= alphabet_size {
        return Err(Error::InvalidCode("simple prefix code symbol out of range")
            .at(Location::ByteOffset(input.bit_offset() / 8)));
    }

    lengths[symbol0] = 1;

    if num_symbols == 2 {
        let symbol1 = input.read_bits(8) as usize;
        if symbol1 >= alphabet_size {
            return Err(Error::InvalidCode("simple prefix code symbol out of range")
                .at(Location::ByteOffset(input.bit_offset() / 8)));
        }
        lengths[symbol1] = 1;
    }

    // `build_code` turns a length vector with exactly one nonzero entry
    // into `PrefixCode::Single`, which consumes no bits when decoding --
    // exactly what a one-symbol simple code requires.
    Ok(lengths)
}

/// Reads a "complex" prefix code: a code-length-code (itself canonical,
/// over the 19-symbol alphabet of code lengths and run-length escapes)
/// that is used to transmit the actual alphabet's length vector.
fn read_complex(input: &mut LsbBitReader, alphabet_size: usize) -> Result<Vec<u8>> {
    let num_code_lengths = 4 + input.read_bits(4) as usize;
    let mut cl_lengths = [0u8; 19];
    for &symbol in CODE_LENGTH_CODE_ORDER.iter().take(num_code_lengths) {
        cl_lengths[symbol] = input.read_bits(3) as u8;
    }

    let cl_code = build_code(&cl_lengths)?;

    let max_symbol = if input.read_bit() {
        let extra_bits = 2 + 2 * input.read_bits(3);
        2 + input.read_bits(extra_bits) as usize
    } else {
        alphabet_size
    };

    let mut lengths = vec![0u8; alphabet_size];
    let mut next = 0usize;
    let mut prev_nonzero = 8u8;
    let mut iterations = 0usize;

    while next < alphabet_size && iterations < max_symbol {
        iterations += 1;
        let symbol = cl_code.decode(input)?;

        match symbol {
            0..=15 => {
                lengths[next] = symbol as u8;
                if symbol != 0 {
                    prev_nonzero = symbol as u8;
                }
                next += 1;
            }
            16 => {
                let repeat = input.read_bits(2) as usize + 3;
                for _ in 0..repeat {
                    if next >= alphabet_size {
                        break;
                    }
                    lengths[next] = prev_nonzero;
                    next += 1;
                }
            }
            17 => {
                let repeat = input.read_bits(3) as usize + 3;
                next = (next + repeat).min(alphabet_size);
            }
            18 => {
                let repeat = input.read_bits(7) as usize + 11;
                next = (next + repeat).min(alphabet_size);
            }
            _ => {
                return Err(Error::InvalidCode("invalid code-length symbol")
                    .at(Location::ByteOffset(input.bit_offset() / 8)))
            }
        }
    }

    Ok(lengths)
}

/// Reads one prefix code (its serialization form chooser bit, then either
/// the simple or complex form) and builds the canonical table for it.
pub fn read_prefix_code(input: &mut LsbBitReader, alphabet_size: usize) -> Result<PrefixCode> {
    let is_simple = input.read_bit();
    let lengths = if is_simple {
        read_simple(input, alphabet_size)?
    } else {
        read_complex(input, alphabet_size)?
    };

    build_code(&lengths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_code_round_trip_matches_worked_example() {
        // Lengths [2,1,3,3] for symbols [A=0,B=1,C=2,D=3].
        // Table decodes bit strings 10->A, 0->B, 110->C, 111->D.
        let lengths = [2u8, 1, 3, 3];
        let code = build_code(&lengths).unwrap();

        // Each character is the next bit VP8L would emit into the stream,
        // in order; `decode` reads them LSB-first as they arrive.
        let decode_stream = |bits: &str| {
            let mut byte = 0u8;
            for (i, c) in bits.chars().enumerate() {
                if c == '1' {
                    byte |= 1 << i;
                }
            }
            let data = [byte];
            let mut r = LsbBitReader::new(&data);
            code.decode(&mut r).unwrap()
        };

        assert_eq!(decode_stream("10"), 0); // codeword "10" -> A
        assert_eq!(decode_stream("0"), 1); // codeword "0" -> B
        assert_eq!(decode_stream("110"), 2); // codeword "110" -> C
        assert_eq!(decode_stream("111"), 3); // codeword "111" -> D
    }

    #[test]
    fn single_symbol_alphabet_consumes_no_bits() {
        let code = PrefixCode::Single(5);
        let data: [u8; 0] = [];
        let mut r = LsbBitReader::new(&data);
        assert_eq!(code.decode(&mut r).unwrap(), 5);
        assert_eq!(r.bit_offset(), 0);
    }
}
