// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! Subframes: the per-channel payload of a FLAC frame.

use log::trace;

use crate::error::{Error, Location, Result};
use crate::flac::bitstream::Bitstream;

/// The fixed predictor coefficients for orders 0 through 4.
const FIXED_COEFFICIENTS: [&[i64]; 5] = [
    &[],
    &[1],
    &[2, -1],
    &[3, -3, 1],
    &[4, -6, 4, -1],
];

#[derive(Clone, Copy, Debug)]
enum SubframeType {
    Constant,
    Verbatim,
    Fixed(u8),
    Lpc(u8),
}

#[derive(Clone, Copy)]
struct SubframeHeader {
    sf_type: SubframeType,
}

fn invalid(msg: &'static str, offset: u64) -> Result<()> {
    Err(Error::InvalidBitstream(msg).at(Location::ByteOffset(offset)))
}

fn read_subframe_header(input: &mut Bitstream) -> Result<SubframeHeader> {
    if 0 != input.read_leq_u8(1)? {
        invalid("subframe header padding bit must be 0", input.byte_offset())?;
    }

    let sf_type = match input.read_leq_u8(6)? {
        0 => SubframeType::Constant,
        1 => SubframeType::Verbatim,

        n if (n & 0b111_110 == 0b000_010)
            || (n & 0b111_100 == 0b000_100)
            || (n & 0b110_000 == 0b010_000) =>
        {
            invalid("reserved subframe type", input.byte_offset())?;
            unreachable!()
        }

        n if n & 0b111_000 == 0b001_000 => {
            let order = n & 0b000_111;
            if order > 4 {
                invalid("reserved fixed-predictor order", input.byte_offset())?;
            }
            SubframeType::Fixed(order)
        }

        n => {
            let order_mo = n & 0b011_111;
            SubframeType::Lpc(order_mo + 1)
        }
    };

    let wastes_bits = 1 == input.read_leq_u8(1)?;
    if wastes_bits {
        return Err(Error::Unsupported("wasted bits per sample")
            .at(Location::ByteOffset(input.byte_offset())));
    }

    trace!("subframe type {:?}, no wasted bits", sf_type);

    Ok(SubframeHeader { sf_type })
}

/// Maps a Rice-folded unsigned value onto a signed residual:
/// 0 -> 0, 1 -> -1, 2 -> 1, 3 -> -2, 4 -> 2, ...
fn rice_to_signed(val: u64) -> i64 {
    if val & 1 == 1 {
        -((val >> 1) as i64) - 1
    } else {
        (val >> 1) as i64
    }
}

/// Decodes a subframe of `block_size` samples at `bps` bits per sample into `buffer`.
pub fn decode(
    input: &mut Bitstream,
    bps: u8,
    buffer: &mut [i64],
) -> Result<()> {
    let header = read_subframe_header(input)?;

    match header.sf_type {
        SubframeType::Constant => decode_constant(input, bps, buffer)?,
        SubframeType::Verbatim => decode_verbatim(input, bps, buffer)?,
        SubframeType::Fixed(ord) => {
            check_order_fits(ord, buffer.len(), input)?;
            decode_fixed(input, bps, ord, buffer)?
        }
        SubframeType::Lpc(ord) => {
            check_order_fits(ord, buffer.len(), input)?;
            decode_lpc(input, bps, ord, buffer)?
        }
    }

    Ok(())
}

/// A predictor order greater than or equal to the block size would make
/// the warm-up region swallow the whole subframe (or overrun it); reject
/// that as malformed input rather than panicking on an out-of-range slice.
fn check_order_fits(order: u8, block_size: usize, input: &Bitstream) -> Result<()> {
    if order as usize >= block_size {
        return Err(Error::InvalidBitstream("predictor order exceeds block size")
            .at(Location::ByteOffset(input.byte_offset())));
    }
    Ok(())
}

fn decode_residual(
    input: &mut Bitstream,
    block_size: u16,
    buffer: &mut [i64],
) -> Result<()> {
    let method = input.read_leq_u8(2)?;
    // Method 0 codes Rice parameters in 4 bits per partition (escape
    // 0b1111); method 1 widens that to 5 bits (escape 0b11111), trading a
    // larger parameter range for one more header bit per partition.
    let param_bits = match method {
        0b00 => 4,
        0b01 => 5,
        _ => {
            return Err(Error::InvalidBitstream("reserved residual coding method")
                .at(Location::ByteOffset(input.byte_offset())))
        }
    };

    decode_partitioned_rice(input, block_size, param_bits, buffer)
}

fn decode_partitioned_rice(
    input: &mut Bitstream,
    block_size: u16,
    param_bits: u8,
    buffer: &mut [i64],
) -> Result<()> {
    let order = input.read_leq_u8(4)?;
    let n_partitions = 1u32 << order;

    if block_size % n_partitions as u16 != 0 {
        return Err(Error::InvalidBitstream("block size does not divide evenly into partitions")
            .at(Location::ByteOffset(input.byte_offset())));
    }

    let n_samples = block_size >> order;
    let n_warm_up = block_size - buffer.len() as u16;

    if n_warm_up > n_samples {
        return Err(Error::InvalidBitstream("partition order too large for warm-up")
            .at(Location::ByteOffset(input.byte_offset())));
    }

    let mut start = 0usize;
    for i in 0..n_partitions {
        let partition_size = (n_samples - if i == 0 { n_warm_up } else { 0 }) as usize;
        decode_rice_partition(input, param_bits, &mut buffer[start..start + partition_size])?;
        start += partition_size;
    }

    Ok(())
}

fn decode_rice_partition(input: &mut Bitstream, param_bits: u8, buffer: &mut [i64]) -> Result<()> {
    let rice_param = input.read_leq_u8(param_bits)?;
    let escape = (1u8 << param_bits) - 1;

    if rice_param == escape {
        let raw_bits = input.read_leq_u8(5)?;
        for sample in buffer.iter_mut() {
            *sample = input.read_signed(raw_bits)? as i64;
        }
    } else {
        for sample in buffer.iter_mut() {
            let q = input.read_unary()? as u64;
            let r = input.read_leq_u32(rice_param)? as u64;
            *sample = rice_to_signed((q << rice_param) | r);
        }
    }

    Ok(())
}

fn decode_constant(input: &mut Bitstream, bps: u8, buffer: &mut [i64]) -> Result<()> {
    let sample = input.read_signed(bps)? as i64;
    for s in buffer.iter_mut() {
        *s = sample;
    }
    Ok(())
}

fn decode_verbatim(input: &mut Bitstream, bps: u8, buffer: &mut [i64]) -> Result<()> {
    for s in buffer.iter_mut() {
        *s = input.read_signed(bps)? as i64;
    }
    Ok(())
}

fn decode_fixed(input: &mut Bitstream, bps: u8, order: u8, buffer: &mut [i64]) -> Result<()> {
    decode_verbatim(input, bps, &mut buffer[..order as usize])?;
    decode_residual(input, buffer.len() as u16, &mut buffer[order as usize..])?;

    // `predict` zips coefficients against the window oldest-sample-first,
    // so the fixed-order coefficient rows (given c_0 first, multiplying
    // the most recent sample) need reversing, same as the LPC coefficients
    // read from the bitstream below.
    let mut coefficients = FIXED_COEFFICIENTS[order as usize].to_vec();
    coefficients.reverse();
    predict(&coefficients, 0, buffer);
    Ok(())
}

fn decode_lpc(input: &mut Bitstream, bps: u8, order: u8, buffer: &mut [i64]) -> Result<()> {
    decode_verbatim(input, bps, &mut buffer[..order as usize])?;

    let qlp_precision = input.read_leq_u8(4)? + 1;
    if qlp_precision - 1 == 0b1111 {
        return Err(Error::InvalidBitstream("reserved qlp precision")
            .at(Location::ByteOffset(input.byte_offset())));
    }

    let qlp_shift = input.read_signed(5)?;

    let mut coefficients = Vec::with_capacity(order as usize);
    for _ in 0..order {
        coefficients.push(input.read_signed(qlp_precision)? as i64);
    }
    coefficients.reverse();

    decode_residual(input, buffer.len() as u16, &mut buffer[order as usize..])?;
    predict(&coefficients, qlp_shift, buffer);

    Ok(())
}

/// Applies a linear predictor in place: every sample at index `i >= window`
/// already holds its residual; after this call it holds the reconstructed
/// value `residual + (prediction >> shift)`.
fn predict(coefficients: &[i64], shift: i32, buffer: &mut [i64]) {
    let window = coefficients.len();
    for i in window..buffer.len() {
        let prediction: i64 = coefficients
            .iter()
            .zip(buffer[i - window..i].iter())
            .map(|(&c, &s)| c * s)
            .sum::<i64>()
            >> shift;
        buffer[i] = buffer[i].wrapping_add(prediction);
    }
}

#[cfg(test)]
mod tests {
    use super::{predict, rice_to_signed};

    #[test]
    fn rice_to_signed_matches_flac_mapping() {
        assert_eq!(rice_to_signed(0), 0);
        assert_eq!(rice_to_signed(1), -1);
        assert_eq!(rice_to_signed(2), 1);
        assert_eq!(rice_to_signed(3), -2);
        assert_eq!(rice_to_signed(4), 2);
    }

    #[test]
    fn fixed_order_two_reconstructs_arithmetic_progression() {
        // Warmup 100, 200; all-zero residuals; order-2 predictor doubles the
        // last sample and subtracts the one before it.
        let mut buffer = vec![100i64, 200, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut coefficients = super::FIXED_COEFFICIENTS[2].to_vec();
        coefficients.reverse();
        predict(&coefficients, 0, &mut buffer);
        assert_eq!(buffer, vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000]);
    }
}
