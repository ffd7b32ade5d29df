// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! Frame synchronization, header parsing, and channel decorrelation.

use std::io;

use log::trace;

use crate::crc::Crc8Reader;
use crate::error::{Error, Location, Result};
use crate::flac::bitstream::{Bitstream, ReadBytes};
use crate::flac::metadata::StreamInfo;
use crate::flac::subframe;

#[derive(Clone, Copy, Debug)]
enum BlockTime {
    FrameNumber(u32),
    SampleNumber(u64),
}

#[derive(Clone, Copy, Debug)]
pub enum ChannelAssignment {
    /// `n` channels, coded independently.
    Independent(u8),
    /// Channel 0 is left, channel 1 is the left-minus-right side channel.
    LeftSideStereo,
    /// Channel 0 is the side channel, channel 1 is right.
    RightSideStereo,
    /// Channel 0 is mid, channel 1 is side.
    MidSideStereo,
}

impl ChannelAssignment {
    fn channels(&self) -> u8 {
        match *self {
            ChannelAssignment::Independent(n) => n,
            _ => 2,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct FrameHeader {
    block_time: BlockTime,
    block_size: u16,
    sample_rate: Option<u32>,
    channel_assignment: ChannelAssignment,
    bits_per_sample: Option<u8>,
}

/// A decoded block: one slice of samples per channel.
pub struct Frame {
    pub first_sample: u64,
    pub block_size: u16,
    pub channels: Vec<Vec<i64>>,
}

fn err(msg: &'static str, offset: u64) -> Result<()> {
    Err(Error::InvalidBitstream(msg).at(Location::ByteOffset(offset)))
}

/// Reads a FLAC "UTF-8-style" variable-length integer, able to hold up to 36 bits.
fn read_var_length_int<R: io::Read>(input: &mut R) -> Result<u64> {
    let first = input.read_u8()?;
    let mut read_additional = 0u8;
    let mut mask_data = 0b0111_1111u8;
    let mut mask_mark = 0b1000_0000u8;

    while first & mask_mark != 0 {
        read_additional += 1;
        mask_data >>= 1;
        mask_mark >>= 1;
    }

    if read_additional == 1 {
        return Err(Error::InvalidBitstream("invalid variable-length integer")
            .at(Location::Unknown));
    } else if read_additional > 0 {
        read_additional -= 1;
    }

    let mut result = ((first & mask_data) as u64) << (6 * read_additional as u32);
    for i in (0..read_additional as i32).rev() {
        let byte = input.read_u8()?;
        if byte & 0b1100_0000 != 0b1000_0000 {
            return Err(Error::InvalidBitstream("invalid variable-length integer")
                .at(Location::Unknown));
        }
        result |= ((byte & 0b0011_1111) as u64) << (6 * i as u32);
    }

    Ok(result)
}

fn read_frame_header<R: io::Read>(input: &mut R) -> Result<FrameHeader> {
    let mut crc_input = Crc8Reader::new(input);

    let sync_res_block = crc_input.read_be_u16()?;
    let sync_code = sync_res_block & 0b1111_1111_1111_1100;
    if sync_code != 0b1111_1111_1111_1000 {
        return Err(Error::MalformedHeader("frame sync code missing").at(Location::Unknown));
    }
    if sync_res_block & 0b0000_0000_0000_0010 != 0 {
        return Err(Error::InvalidBitstream("reserved frame header bit set").at(Location::Unknown));
    }
    let variable_blocking = sync_res_block & 1 != 0;

    let bs_sr = crc_input.read_u8()?;
    let mut block_size = 0u16;
    let mut read_8bit_bs = false;
    let mut read_16bit_bs = false;

    match bs_sr >> 4 {
        0b0000 => return Err(Error::InvalidBitstream("reserved block size code").at(Location::Unknown)),
        0b0001 => block_size = 192,
        n if (0b0010..=0b0101).contains(&n) => block_size = 576 * (1 << (n - 2)),
        0b0110 => read_8bit_bs = true,
        0b0111 => read_16bit_bs = true,
        n => block_size = 256 * (1 << (n - 8)),
    }

    let mut sample_rate = None;
    let mut read_8bit_sr = false;
    let mut read_16bit_sr = false;
    let mut read_16bit_sr_ten = false;

    match bs_sr & 0b0000_1111 {
        0b0000 => {}
        0b0001 => sample_rate = Some(88_200),
        0b0010 => sample_rate = Some(176_400),
        0b0011 => sample_rate = Some(192_000),
        0b0100 => sample_rate = Some(8_000),
        0b0101 => sample_rate = Some(16_000),
        0b0110 => sample_rate = Some(22_050),
        0b0111 => sample_rate = Some(24_000),
        0b1000 => sample_rate = Some(32_000),
        0b1001 => sample_rate = Some(44_100),
        0b1010 => sample_rate = Some(48_000),
        0b1011 => sample_rate = Some(96_000),
        0b1100 => read_8bit_sr = true,
        0b1101 => read_16bit_sr = true,
        0b1110 => read_16bit_sr_ten = true,
        _ => return Err(Error::InvalidBitstream("reserved sample rate code").at(Location::Unknown)),
    }

    let chan_bps_res = crc_input.read_u8()?;

    let channel_assignment = match chan_bps_res >> 4 {
        n if n < 8 => ChannelAssignment::Independent(n + 1),
        0b1000 => ChannelAssignment::LeftSideStereo,
        0b1001 => ChannelAssignment::RightSideStereo,
        0b1010 => ChannelAssignment::MidSideStereo,
        _ => return Err(Error::InvalidBitstream("reserved channel assignment").at(Location::Unknown)),
    };

    let bits_per_sample = match (chan_bps_res & 0b0000_1110) >> 1 {
        0b000 => None,
        0b001 => Some(8),
        0b010 => Some(12),
        0b100 => Some(16),
        0b101 => Some(20),
        0b110 => Some(24),
        _ => return Err(Error::InvalidBitstream("reserved bits-per-sample code").at(Location::Unknown)),
    };

    if chan_bps_res & 1 != 0 {
        return Err(Error::InvalidBitstream("reserved frame header bit set").at(Location::Unknown));
    }

    let block_time = if variable_blocking {
        BlockTime::SampleNumber(read_var_length_int(&mut crc_input)?)
    } else {
        let frame = read_var_length_int(&mut crc_input)?;
        if frame > 0x7fff_ffff {
            return Err(Error::InvalidBitstream("frame number too large").at(Location::Unknown));
        }
        BlockTime::FrameNumber(frame as u32)
    };

    if read_8bit_bs {
        block_size = crc_input.read_u8()? as u16 + 1;
    }
    if read_16bit_bs {
        let bs = crc_input.read_be_u16()?;
        if bs == 0xffff {
            return Err(Error::InvalidBitstream("block size exceeds 65535").at(Location::Unknown));
        }
        block_size = bs + 1;
    }
    if block_size < 16 {
        return Err(Error::InvalidBitstream("block size must be at least 16").at(Location::Unknown));
    }

    if read_8bit_sr {
        sample_rate = Some(crc_input.read_u8()? as u32);
    }
    if read_16bit_sr {
        sample_rate = Some(crc_input.read_be_u16()? as u32);
    }
    if read_16bit_sr_ten {
        sample_rate = Some(crc_input.read_be_u16()? as u32 * 10);
    }

    let computed_crc = crc_input.crc();
    let presumed_crc = crc_input.read_u8()?;
    if computed_crc != presumed_crc {
        return Err(Error::CrcFailure.at(Location::Unknown));
    }

    Ok(FrameHeader { block_time, block_size, sample_rate, channel_assignment, bits_per_sample })
}

/// `side = left - right`, so `right = left - side`.
fn decode_left_side(left: &[i64], side: &[i64]) -> Vec<i64> {
    left.iter().zip(side.iter()).map(|(&l, &s)| l - s).collect()
}

/// `side = left - right`, so `left = side + right`.
fn decode_right_side(side: &[i64], right: &[i64]) -> Vec<i64> {
    side.iter().zip(right.iter()).map(|(&s, &r)| s + r).collect()
}

/// `mid = (left + right) >> 1` (with the dropped bit folded into `side`'s
/// parity), `side = left - right`.
fn decode_mid_side(mid: &[i64], side: &[i64]) -> (Vec<i64>, Vec<i64>) {
    let mut left = Vec::with_capacity(mid.len());
    let mut right = Vec::with_capacity(mid.len());
    for (&m, &s) in mid.iter().zip(side.iter()) {
        let doubled_mid = (m << 1) | (s & 1);
        left.push((doubled_mid + s) >> 1);
        right.push((doubled_mid - s) >> 1);
    }
    (left, right)
}

/// Reads and decodes the next frame. `stream_info` is used to validate
/// per-frame parameters and to fill in values the frame header omits.
pub fn read_frame<'b>(data: &'b [u8], stream_info: &StreamInfo) -> Result<(Frame, usize)> {
    let mut cursor = data;
    let before = cursor.len();
    let header = read_frame_header(&mut cursor)?;
    let header_len = before - cursor.len();

    let bps = header.bits_per_sample.unwrap_or(stream_info.bits_per_sample);
    if bps != stream_info.bits_per_sample {
        return Err(Error::Mismatch("frame bits-per-sample disagrees with stream info")
            .at(Location::ByteOffset(header_len as u64)));
    }
    if let Some(rate) = header.sample_rate {
        if rate != stream_info.sample_rate {
            return Err(Error::Mismatch("frame sample rate disagrees with stream info")
                .at(Location::ByteOffset(header_len as u64)));
        }
    }
    let n_channels = header.channel_assignment.channels();
    if n_channels != stream_info.channels {
        return Err(Error::Mismatch("frame channel count disagrees with stream info")
            .at(Location::ByteOffset(header_len as u64)));
    }

    let time = match header.block_time {
        BlockTime::FrameNumber(fnr) => header.block_size as u64 * fnr as u64,
        BlockTime::SampleNumber(snr) => snr,
    };

    if header.block_size > stream_info.max_block_size {
        return Err(Error::Mismatch("frame block size exceeds stream info maximum")
            .at(Location::ByteOffset(header_len as u64)));
    }
    // The final frame of a stream is allowed to be shorter than
    // min_block_size, since the sample count rarely divides evenly; only
    // enforce the lower bound when we know this isn't that last frame.
    let is_final_frame = stream_info
        .samples
        .map_or(false, |total| time + header.block_size as u64 >= total);
    if header.block_size < stream_info.min_block_size && !is_final_frame {
        return Err(Error::Mismatch("frame block size below stream info minimum")
            .at(Location::ByteOffset(header_len as u64)));
    }

    let bs = header.block_size as usize;
    let mut channels: Vec<Vec<i64>> = Vec::with_capacity(n_channels as usize);

    let body = &data[header_len..];
    let mut bitstream = Bitstream::new(body);

    match header.channel_assignment {
        ChannelAssignment::Independent(n) => {
            for _ in 0..n {
                let mut buf = vec![0i64; bs];
                subframe::decode(&mut bitstream, bps, &mut buf)?;
                channels.push(buf);
            }
        }
        ChannelAssignment::LeftSideStereo => {
            let mut left = vec![0i64; bs];
            let mut side = vec![0i64; bs];
            subframe::decode(&mut bitstream, bps, &mut left)?;
            subframe::decode(&mut bitstream, bps + 1, &mut side)?;
            let right = decode_left_side(&left, &side);
            channels.push(left);
            channels.push(right);
        }
        ChannelAssignment::RightSideStereo => {
            let mut side = vec![0i64; bs];
            let mut right = vec![0i64; bs];
            subframe::decode(&mut bitstream, bps + 1, &mut side)?;
            subframe::decode(&mut bitstream, bps, &mut right)?;
            let left = decode_right_side(&side, &right);
            channels.push(left);
            channels.push(right);
        }
        ChannelAssignment::MidSideStereo => {
            let mut mid = vec![0i64; bs];
            let mut side = vec![0i64; bs];
            subframe::decode(&mut bitstream, bps, &mut mid)?;
            subframe::decode(&mut bitstream, bps + 1, &mut side)?;
            let (left, right) = decode_mid_side(&mid, &side);
            channels.push(left);
            channels.push(right);
        }
    }

    let consumed_in_body = bitstream.byte_offset() as usize;
    // The 16-bit frame footer CRC follows; it is read and intentionally
    // not checked, since the header CRC-8 already guards against
    // desynchronisation and the footer's byte offset is data we must skip
    // over regardless of whether we validate it.
    let footer_start = header_len + consumed_in_body;
    if data.len() < footer_start + 2 {
        return Err(Error::InvalidBitstream("frame footer truncated")
            .at(Location::ByteOffset(footer_start as u64)));
    }
    let total_consumed = footer_start + 2;

    trace!("decoded frame at sample {}, block size {}", time, header.block_size);

    Ok((Frame { first_sample: time, block_size: header.block_size, channels }, total_consumed))
}

#[cfg(test)]
mod tests {
    use super::{decode_left_side, decode_mid_side, decode_right_side, read_var_length_int};

    #[test]
    fn var_length_int_decodes_single_byte() {
        let mut reader: &[u8] = &[0x24];
        assert_eq!(read_var_length_int(&mut reader).unwrap(), 0x24);
    }

    #[test]
    fn var_length_int_decodes_multi_byte() {
        let mut reader: &[u8] = &[0xc2, 0xa2];
        assert_eq!(read_var_length_int(&mut reader).unwrap(), 0xa2);

        let mut reader: &[u8] = &[0xe2, 0x82, 0xac];
        assert_eq!(read_var_length_int(&mut reader).unwrap(), 0x20ac);
    }

    #[test]
    fn var_length_int_rejects_lone_continuation_byte() {
        let mut reader: &[u8] = &[0xc2, 0x00];
        assert!(read_var_length_int(&mut reader).is_err());
    }

    #[test]
    fn left_side_reconstructs_right_channel() {
        let left = vec![11i64, 22, 33];
        let side = vec![2i64, 4, 6];
        assert_eq!(decode_left_side(&left, &side), vec![9, 18, 27]);
    }

    #[test]
    fn right_side_reconstructs_left_channel() {
        let side = vec![2i64, 4, 6];
        let right = vec![9i64, 18, 27];
        assert_eq!(decode_right_side(&side, &right), vec![11, 22, 33]);
    }

    #[test]
    fn mid_side_reconstructs_both_channels() {
        let mid = vec![10i64, 20, 30];
        let side = vec![2i64, 4, 6];
        let (left, right) = decode_mid_side(&mid, &side);
        assert_eq!(left, vec![11, 22, 33]);
        assert_eq!(right, vec![9, 18, 27]);
    }
}
