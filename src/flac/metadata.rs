// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2021 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! Metadata blocks: STREAMINFO, VORBIS_COMMENT, PICTURE, and the rest of
//! the block chain that precedes the first frame.

use std::io;

use log::debug;

use crate::error::{Error, Location, Result};
use crate::flac::bitstream::ReadBytes;

/// The mandatory first metadata block: stream-wide parameters and bounds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    pub min_frame_size: Option<u32>,
    pub max_frame_size: Option<u32>,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub samples: Option<u64>,
    pub md5sum: [u8; 16],
}

/// A parsed `KEY=value` Vorbis comment entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VorbisComment {
    raw: String,
    key_end: Option<usize>,
}

impl VorbisComment {
    fn new(raw: String) -> VorbisComment {
        let key_end = raw.find('=');
        VorbisComment { raw, key_end }
    }

    /// The comment's field name, upper-cased (`TITLE`, `ARTIST`, ...).
    pub fn key(&self) -> String {
        self.key_raw().to_ascii_uppercase()
    }

    /// The comment's field name, exactly as it appeared in the stream.
    pub fn key_raw(&self) -> &str {
        match self.key_end {
            Some(i) => &self.raw[..i],
            None => &self.raw,
        }
    }

    /// The comment's value, i.e. everything after the first `=`.
    pub fn value(&self) -> &str {
        match self.key_end {
            Some(i) => &self.raw[i + 1..],
            None => "",
        }
    }
}

/// The VORBIS_COMMENT block: a vendor string plus a list of tags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VorbisCommentBlock {
    pub vendor_string: String,
    pub comments: Vec<VorbisComment>,
}

/// The picture types defined by the FLAC PICTURE block, a subset of the
/// ID3v2 APIC frame's type enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PictureType {
    Other,
    FileIcon,
    OtherFileIcon,
    CoverFront,
    CoverBack,
    LeafletPage,
    Media,
    LeadArtist,
    Artist,
    Conductor,
    Band,
    Composer,
    Lyricist,
    RecordingLocation,
    DuringRecording,
    DuringPerformance,
    VideoScreenCapture,
    Fish,
    Illustration,
    BandLogo,
    PublisherLogo,
    Unknown(u32),
}

impl PictureType {
    fn from_u32(n: u32) -> PictureType {
        use PictureType::*;
        match n {
            0 => Other,
            1 => FileIcon,
            2 => OtherFileIcon,
            3 => CoverFront,
            4 => CoverBack,
            5 => LeafletPage,
            6 => Media,
            7 => LeadArtist,
            8 => Artist,
            9 => Conductor,
            10 => Band,
            11 => Composer,
            12 => Lyricist,
            13 => RecordingLocation,
            14 => DuringRecording,
            15 => DuringPerformance,
            16 => VideoScreenCapture,
            17 => Fish,
            18 => Illustration,
            19 => BandLogo,
            20 => PublisherLogo,
            other => Unknown(other),
        }
    }
}

/// The PICTURE block: an embedded cover image or similar artwork.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Picture {
    pub picture_type: PictureType,
    pub mime_type: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub colors: u32,
    pub data: Vec<u8>,
}

/// A metadata block, decoded to the extent this crate cares about.
///
/// SEEKTABLE and CUESHEET are walked past but not retained: nothing in
/// this crate seeks, so there is nowhere for the seek points to go.
pub enum MetadataBlock {
    StreamInfo(StreamInfo),
    Padding(u32),
    Application { id: [u8; 4], data: Vec<u8> },
    SeekTable,
    VorbisComment(VorbisCommentBlock),
    CueSheet,
    Picture(Picture),
}

#[derive(Clone, Copy)]
struct BlockHeader {
    is_last: bool,
    block_type: u8,
    length: u32,
}

fn read_block_header<R: io::Read>(input: &mut R) -> Result<BlockHeader> {
    let byte = input.read_u8()?;
    let is_last = byte & 0x80 != 0;
    let block_type = byte & 0x7f;
    let length = input.read_be_u24()?;
    Ok(BlockHeader { is_last, block_type, length })
}

/// Parses the 34-byte STREAMINFO payload.
///
/// The bitfield packing here has tripped up at least one reference
/// implementation: the sample count's lowest byte is byte 17 of the
/// payload, not a second read of byte 16.
fn read_streaminfo(bytes: &[u8]) -> Result<StreamInfo> {
    if bytes.len() != 34 {
        return Err(Error::MalformedHeader("streaminfo block must be 34 bytes")
            .at(Location::Unknown));
    }

    let min_block_size = u16::from_be_bytes([bytes[0], bytes[1]]);
    let max_block_size = u16::from_be_bytes([bytes[2], bytes[3]]);
    let min_frame_size = u32::from_be_bytes([0, bytes[4], bytes[5], bytes[6]]);
    let max_frame_size = u32::from_be_bytes([0, bytes[7], bytes[8], bytes[9]]);

    // Bytes 10..18 hold, MSB-first across the 64 bits: 20-bit sample rate,
    // 3-bit (channels - 1), 5-bit (bits_per_sample - 1), 36-bit sample count.
    let b10 = bytes[10] as u64;
    let b11 = bytes[11] as u64;
    let b12 = bytes[12] as u64;
    let b13 = bytes[13] as u64;
    let b14 = bytes[14] as u64;
    let b15 = bytes[15] as u64;
    let b16 = bytes[16] as u64;
    let b17 = bytes[17] as u64;

    let sample_rate = ((b10 << 12) | (b11 << 4) | (b12 >> 4)) as u32;
    let channels = (((b12 >> 1) & 0x07) + 1) as u8;
    let bits_per_sample = ((((b12 & 0x01) << 4) | (b13 >> 4)) + 1) as u8;
    let samples = ((b13 & 0x0f) << 32) | (b14 << 24) | (b15 << 16) | (b16 << 8) | b17;

    let mut md5sum = [0u8; 16];
    md5sum.copy_from_slice(&bytes[18..34]);

    if sample_rate == 0 {
        return Err(Error::InvalidBitstream("sample rate must be nonzero").at(Location::Unknown));
    }

    Ok(StreamInfo {
        min_block_size,
        max_block_size,
        min_frame_size: if min_frame_size == 0 { None } else { Some(min_frame_size) },
        max_frame_size: if max_frame_size == 0 { None } else { Some(max_frame_size) },
        sample_rate,
        channels,
        bits_per_sample,
        samples: if samples == 0 { None } else { Some(samples) },
        md5sum,
    })
}

fn read_utf8_string(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::MalformedHeader("expected utf-8 text").at(Location::Unknown))
}

fn read_vorbis_comment(payload: &[u8]) -> Result<VorbisCommentBlock> {
    let mut cursor = payload;
    let vendor_length = cursor.read_be_u32_le()?;
    if cursor.len() < vendor_length as usize {
        return Err(Error::MalformedHeader("vorbis comment truncated").at(Location::Unknown));
    }
    let (vendor_bytes, rest) = cursor.split_at(vendor_length as usize);
    let vendor_string = read_utf8_string(vendor_bytes)?;
    cursor = rest;

    let comment_count = cursor.read_be_u32_le()?;
    let mut comments = Vec::with_capacity(comment_count as usize);
    for _ in 0..comment_count {
        let len = cursor.read_be_u32_le()?;
        if cursor.len() < len as usize {
            return Err(Error::MalformedHeader("vorbis comment truncated").at(Location::Unknown));
        }
        let (text, rest) = cursor.split_at(len as usize);
        comments.push(VorbisComment::new(read_utf8_string(text)?));
        cursor = rest;
    }

    Ok(VorbisCommentBlock { vendor_string, comments })
}

/// Splits off `len` bytes from the front of `cursor`, failing instead of
/// panicking when the declared length runs past what's actually there.
fn take<'a>(cursor: &mut &'a [u8], len: u32) -> Result<&'a [u8]> {
    if cursor.len() < len as usize {
        return Err(Error::MalformedHeader("picture field length exceeds block size")
            .at(Location::Unknown));
    }
    let (bytes, rest) = cursor.split_at(len as usize);
    *cursor = rest;
    Ok(bytes)
}

fn read_picture(payload: &[u8]) -> Result<Picture> {
    let mut cursor = payload;
    let picture_type = PictureType::from_u32(cursor.read_be_u32()?);

    let mime_len = cursor.read_be_u32()?;
    let mime_type = read_utf8_string(take(&mut cursor, mime_len)?)?;

    let desc_len = cursor.read_be_u32()?;
    let description = read_utf8_string(take(&mut cursor, desc_len)?)?;

    let width = cursor.read_be_u32()?;
    let height = cursor.read_be_u32()?;
    let depth = cursor.read_be_u32()?;
    let colors = cursor.read_be_u32()?;
    let data_len = cursor.read_be_u32()?;
    let data = take(&mut cursor, data_len)?.to_vec();

    Ok(Picture { picture_type, mime_type, description, width, height, depth, colors, data })
}

/// Vorbis comment fields are little-endian, unlike the rest of FLAC; this
/// local helper avoids pulling in `byteorder` for just this one block type.
trait ReadLittleEndian {
    fn read_be_u32_le(&mut self) -> Result<u32>;
}

impl ReadLittleEndian for &[u8] {
    fn read_be_u32_le(&mut self) -> Result<u32> {
        if self.len() < 4 {
            return Err(Error::MalformedHeader("truncated length prefix").at(Location::Unknown));
        }
        let (bytes, rest) = self.split_at(4);
        let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        *self = rest;
        Ok(value)
    }
}

/// Reads the magic number, STREAMINFO, and every subsequent metadata block
/// up to (but not including) the first frame. Returns the stream info and
/// the byte offset at which frame data begins.
pub fn read_metadata_chain(data: &[u8]) -> Result<(StreamInfo, Vec<MetadataBlock>, usize)> {
    if data.len() < 4 || &data[0..4] != b"fLaC" {
        return Err(Error::MalformedHeader("missing fLaC stream marker").at(Location::ByteOffset(0)));
    }

    let mut pos = 4usize;
    let mut stream_info = None;
    let mut blocks = Vec::new();

    loop {
        let mut cursor = &data[pos..];
        let header = read_block_header(&mut cursor)?;
        let header_len = 4usize;
        let payload_start = pos + header_len;
        let payload_end = payload_start + header.length as usize;
        if data.len() < payload_end {
            return Err(Error::MalformedHeader("metadata block truncated")
                .at(Location::ByteOffset(payload_start as u64)));
        }
        let payload = &data[payload_start..payload_end];

        match header.block_type {
            0 => {
                let info = read_streaminfo(payload)?;
                debug!("streaminfo: {} Hz, {} ch, {} bps", info.sample_rate, info.channels, info.bits_per_sample);
                stream_info = Some(info);
            }
            1 => blocks.push(MetadataBlock::Padding(header.length)),
            2 => {
                if payload.len() < 4 {
                    return Err(Error::MalformedHeader("application block too short")
                        .at(Location::ByteOffset(payload_start as u64)));
                }
                let mut id = [0u8; 4];
                id.copy_from_slice(&payload[..4]);
                blocks.push(MetadataBlock::Application { id, data: payload[4..].to_vec() });
            }
            3 => blocks.push(MetadataBlock::SeekTable),
            4 => blocks.push(MetadataBlock::VorbisComment(read_vorbis_comment(payload)?)),
            5 => blocks.push(MetadataBlock::CueSheet),
            6 => blocks.push(MetadataBlock::Picture(read_picture(payload)?)),
            _ => blocks.push(MetadataBlock::Padding(header.length)),
        }

        pos = payload_end;
        if header.is_last {
            break;
        }
    }

    let stream_info = stream_info
        .ok_or_else(|| Error::MalformedHeader("missing streaminfo block").at(Location::Unknown))?;

    Ok((stream_info, blocks, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_streaminfo_bytes() -> Vec<u8> {
        // 48 kHz, 1 channel, 16 bps, 1024 samples, all-zero MD5.
        let mut bytes = vec![0u8; 34];
        bytes[0..2].copy_from_slice(&4096u16.to_be_bytes()); // min block size
        bytes[2..4].copy_from_slice(&4096u16.to_be_bytes()); // max block size
        // sample_rate = 48000 = 0x0BB80, channels - 1 = 0, bits - 1 = 15 (0x0f), samples = 1024
        let sample_rate: u64 = 48_000;
        let channels_minus_one: u64 = 0;
        let bps_minus_one: u64 = 15;
        let samples: u64 = 1024;
        let packed: u64 = (sample_rate << 44)
            | (channels_minus_one << 41)
            | (bps_minus_one << 36)
            | samples;
        let packed_bytes = packed.to_be_bytes();
        bytes[10..18].copy_from_slice(&packed_bytes);
        bytes
    }

    #[test]
    fn streaminfo_unpacks_bitfields_correctly() {
        let bytes = sample_streaminfo_bytes();
        let info = read_streaminfo(&bytes).unwrap();
        assert_eq!(info.sample_rate, 48_000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.samples, Some(1024));
    }

    #[test]
    fn vorbis_comment_splits_key_and_value() {
        let comment = VorbisComment::new("ARTIST=Test Artist".to_string());
        assert_eq!(comment.key(), "ARTIST");
        assert_eq!(comment.value(), "Test Artist");
    }

    #[test]
    fn vorbis_comment_with_no_equals_has_empty_value() {
        let comment = VorbisComment::new("MALFORMED".to_string());
        assert_eq!(comment.key_raw(), "MALFORMED");
        assert_eq!(comment.value(), "");
    }
}
