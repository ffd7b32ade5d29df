// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! RIFF/WEBP container framing and the VP8L bitstream header that sits
//! inside the `VP8L` chunk.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::error::{Error, Location, Result};
use crate::webp::bitstream::LsbBitReader;

/// The `VP8L` chunk payload, past the signature byte: image dimensions and
/// whether the image carries meaningful alpha.
pub struct Vp8lHeader {
    pub width: usize,
    pub height: usize,
    pub has_alpha: bool,
}

fn require(condition: bool, message: &'static str, offset: u64) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::MalformedHeader(message).at(Location::ByteOffset(offset)))
    }
}

/// Strips the RIFF/WEBP container framing and returns the `VP8L` chunk's
/// payload bytes.
///
/// Per the format's documented quirk, the RIFF size field counts bytes
/// following it, so the chunk's length is `riff_size - 4` (the `WEBP`
/// fourcc) rather than the whole file; chunk lengths are padded to an even
/// count with a single ignored byte when the payload is odd-sized.
pub fn unwrap_riff(data: &[u8]) -> Result<&[u8]> {
    require(data.len() >= 12, "file too short for a RIFF header", 0)?;
    require(&data[0..4] == b"RIFF", "missing RIFF magic", 0)?;
    require(&data[8..12] == b"WEBP", "missing WEBP fourcc", 8)?;

    let riff_size = LittleEndian::read_u32(&data[4..8]) as usize;
    let available = data.len() - 8;
    require(riff_size <= available, "RIFF size exceeds file length", 4)?;

    let mut offset = 12;
    while offset + 8 <= data.len() {
        let fourcc = &data[offset..offset + 4];
        let chunk_size = LittleEndian::read_u32(&data[offset + 4..offset + 8]) as usize;
        let payload_start = offset + 8;
        require(payload_start + chunk_size <= data.len(), "chunk runs past end of file", offset as u64)?;

        if fourcc == b"VP8L" {
            return Ok(&data[payload_start..payload_start + chunk_size]);
        }

        debug!("skipping unrecognized chunk {:?}", String::from_utf8_lossy(fourcc));
        let padded_size = chunk_size + (chunk_size & 1);
        offset = payload_start + padded_size;
    }

    Err(Error::MalformedHeader("no VP8L chunk found").at(Location::ByteOffset(offset as u64)))
}

/// Parses the fixed-format header at the start of a `VP8L` chunk: the
/// signature byte, 14-bit width-1 and height-1 fields, the alpha-is-used
/// flag, and a 3-bit version number that must currently read zero.
pub fn read_header(input: &mut LsbBitReader) -> Result<Vp8lHeader> {
    let signature = input.read_bits(8);
    if signature != 0x2f {
        return Err(Error::MalformedHeader("VP8L signature byte is not 0x2f")
            .at(Location::ByteOffset(0)));
    }

    let width = input.read_bits(14) as usize + 1;
    let height = input.read_bits(14) as usize + 1;
    let has_alpha = input.read_bit();
    let version = input.read_bits(3);

    if version != 0 {
        return Err(Error::MalformedHeader("VP8L version number other than zero")
            .at(Location::ByteOffset(input.bit_offset() / 8)));
    }

    debug!("VP8L image {}x{}, alpha = {}", width, height, has_alpha);

    Ok(Vp8lHeader { width, height, has_alpha })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(fourcc);
        let mut len = [0u8; 4];
        LittleEndian::write_u32(&mut len, payload.len() as u32);
        out.extend_from_slice(&len);
        out.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    #[test]
    fn unwrap_riff_finds_vp8l_chunk_after_a_skipped_chunk() {
        let vp8l_payload = [0x2fu8, 0x00, 0x00, 0x00, 0x00];
        let mut body = Vec::new();
        body.extend_from_slice(b"WEBP");
        body.extend_from_slice(&chunk(b"ICCP", &[1, 2, 3]));
        body.extend_from_slice(&chunk(b"VP8L", &vp8l_payload));

        let mut file = Vec::new();
        file.extend_from_slice(b"RIFF");
        let mut len = [0u8; 4];
        LittleEndian::write_u32(&mut len, body.len() as u32);
        file.extend_from_slice(&len);
        file.extend_from_slice(&body);

        let payload = unwrap_riff(&file).unwrap();
        assert_eq!(payload, &vp8l_payload[..]);
    }

    #[test]
    fn unwrap_riff_rejects_missing_magic() {
        let data = [0u8; 16];
        assert!(unwrap_riff(&data).is_err());
    }

    #[test]
    fn read_header_decodes_dimensions_and_alpha_flag() {
        // signature 0x2f, width-1 = 3 (4 px), height-1 = 1 (2 px), alpha = 1, version = 0.
        // Build the bit pattern by hand: LSB-first packing of
        // [8 bits signature][14 width-1][14 height-1][1 alpha][3 version].
        let mut raw = vec![0u8; 5];
        let mut pos = 0u32;
        let mut push = |value: u32, bits: u32| {
            for i in 0..bits {
                if (value >> i) & 1 == 1 {
                    raw[(pos / 8) as usize] |= 1 << (pos % 8);
                }
                pos += 1;
            }
        };
        push(0x2f, 8);
        push(3, 14);
        push(1, 14);
        push(1, 1);
        push(0, 3);

        let mut reader = LsbBitReader::new(&raw);
        let header = read_header(&mut reader).unwrap();
        assert_eq!(header.width, 4);
        assert_eq!(header.height, 2);
        assert!(header.has_alpha);
    }
}
