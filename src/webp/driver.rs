// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! Top-level orchestration: unwrap the container, decode the entropy
//! image, invert the transform stack, and write out a PPM raster.

use log::info;

use crate::error::Result;
use crate::webp::bitstream::LsbBitReader;
use crate::webp::container::{read_header, unwrap_riff};
use crate::webp::entropy_image::decode_image_stream;
use crate::webp::transform::{apply_inverse, read_transforms};

/// A fully decoded image: dimensions plus packed `A<<24 | R<<16 | G<<8 | B`
/// pixels in row-major order.
pub struct Image {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u32>,
}

/// Decodes a `.webp` file's bytes (RIFF container, `VP8L` chunk) into a
/// fully reconstructed ARGB raster.
pub fn decode(data: &[u8]) -> Result<Image> {
    let payload = unwrap_riff(data)?;
    let mut input = LsbBitReader::new(payload);

    let header = read_header(&mut input)?;
    let transforms = read_transforms(&mut input, header.width, header.height)?;

    let mut pixels = decode_image_stream(&mut input, header.width, header.height, true)?;
    apply_inverse(&transforms, header.width, header.height, &mut pixels);

    info!("decoded {}x{} WebP image, {} transform(s)", header.width, header.height, transforms.len());

    Ok(Image { width: header.width, height: header.height, pixels })
}

/// Renders a decoded image as a binary PPM (`P6`): an ASCII header
/// (`P6\n{width} {height}\n255\n`) followed by row-major RGB triples. Alpha
/// is discarded; PPM has no channel for it.
pub fn encode_ppm(image: &Image) -> Vec<u8> {
    let mut out = Vec::with_capacity(image.pixels.len() * 3 + 32);
    out.extend_from_slice(format!("P6\n{} {}\n255\n", image.width, image.height).as_bytes());

    for &pixel in &image.pixels {
        let r = (pixel >> 16) as u8;
        let g = (pixel >> 8) as u8;
        let b = pixel as u8;
        out.push(r);
        out.push(g);
        out.push(b);
    }

    out
}

/// Decodes a `.webp` file's bytes directly into PPM bytes.
pub fn decode_to_ppm(data: &[u8]) -> Result<Vec<u8>> {
    let image = decode(data)?;
    Ok(encode_ppm(&image))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_ppm_writes_header_and_drops_alpha() {
        let image = Image {
            width: 2,
            height: 1,
            pixels: vec![0xff12_3456, 0x0078_90ab],
        };
        let ppm = encode_ppm(&image);
        let header = b"P6\n2 1\n255\n";
        assert_eq!(&ppm[..header.len()], header);
        assert_eq!(&ppm[header.len()..header.len() + 3], &[0x12, 0x34, 0x56]);
        assert_eq!(&ppm[header.len() + 3..header.len() + 6], &[0x78, 0x90, 0xab]);
    }
}
