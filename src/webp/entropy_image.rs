// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! Decoding of one VP8L entropy-coded image plane: meta-prefix grouping,
//! color cache, canonical prefix codes, and the LZ77 pixel loop that ties
//! them together. The main raster and every transform's subimage (the
//! predictor image, the color-transform image, and the meta-prefix image
//! itself) are all instances of this same procedure.

use log::{debug, trace};

use crate::error::{Error, Location, Result};
use crate::webp::bitstream::LsbBitReader;
use crate::webp::lz77::{distance_code_to_planar, extra_bits_value};
use crate::webp::prefix::{read_prefix_code, PrefixCode};

const GREEN_ALPHABET_BASE: usize = 256 + 24;
const LENGTH_SYMBOLS: usize = 24;
const DISTANCE_ALPHABET: usize = 40;

/// A direct-mapped table of recently emitted colors, addressed by a
/// Kronecker-multiplier hash.
struct ColorCache {
    bits: u8,
    table: Vec<u32>,
}

impl ColorCache {
    fn new(bits: u8) -> ColorCache {
        ColorCache { bits, table: vec![0u32; 1usize << bits] }
    }

    fn hash(&self, pixel: u32) -> usize {
        let product = 0x1e35a7bdu32.wrapping_mul(pixel);
        (product >> (32 - self.bits as u32)) as usize
    }

    fn insert(&mut self, pixel: u32) {
        let index = self.hash(pixel);
        self.table[index] = pixel;
    }

    fn get(&self, index: usize) -> Option<u32> {
        self.table.get(index).copied()
    }
}

/// The five canonical codes a pixel is decoded through: green (which also
/// carries the LZ77 length/cache-index alphabet), red, blue, alpha, and
/// LZ77 distance.
struct PrefixGroup {
    green: PrefixCode,
    red: PrefixCode,
    blue: PrefixCode,
    alpha: PrefixCode,
    distance: PrefixCode,
}

fn read_prefix_group(
    input: &mut LsbBitReader,
    color_cache_size: usize,
) -> Result<PrefixGroup> {
    let green = read_prefix_code(input, GREEN_ALPHABET_BASE + color_cache_size)?;
    let red = read_prefix_code(input, 256)?;
    let blue = read_prefix_code(input, 256)?;
    let alpha = read_prefix_code(input, 256)?;
    let distance = read_prefix_code(input, DISTANCE_ALPHABET)?;
    Ok(PrefixGroup { green, red, blue, alpha, distance })
}

/// Decodes one entropy-coded image plane of `width x height` ARGB pixels
/// (packed `A<<24 | R<<16 | G<<8 | B`).
///
/// `is_main` gates the optional meta-prefix sub-image: only the top-level
/// raster may be spatially split into multiple prefix groups. Every
/// transform's own subimage is decoded with `is_main = false`.
pub fn decode_image_stream(
    input: &mut LsbBitReader,
    width: usize,
    height: usize,
    is_main: bool,
) -> Result<Vec<u32>> {
    // The color cache bit precedes the meta-prefix bit in the bitstream,
    // for both the main image and every recursive sub-image call -- read
    // them out of order here and any image carrying both desyncs.
    let (color_cache_size, mut cache) = if input.read_bit() {
        let bits = input.read_bits(4) as u8;
        if bits < 1 || bits > 11 {
            return Err(Error::InvalidBitstream("color cache bits out of range")
                .at(Location::ByteOffset(input.bit_offset() / 8)));
        }
        (1usize << bits, Some(ColorCache::new(bits)))
    } else {
        (0, None)
    };

    let (meta_bits, meta_image, meta_width) = if is_main && input.read_bit() {
        let meta_bits = input.read_bits(3) as u32;
        let meta_width = ceil_div(width, 1usize << meta_bits);
        let meta_height = ceil_div(height, 1usize << meta_bits);
        let meta = decode_image_stream(input, meta_width, meta_height, false)?;
        (meta_bits, Some(meta), meta_width)
    } else {
        (0, None, 0)
    };

    let prefix_group_count = match &meta_image {
        Some(meta) => 1 + meta.iter().map(|&p| (p >> 8) & 0xffff).max().unwrap_or(0) as usize,
        None => 1,
    };

    debug!(
        "entropy image {}x{}, {} prefix group(s), color cache size {}",
        width, height, prefix_group_count, color_cache_size
    );

    let mut groups = Vec::with_capacity(prefix_group_count);
    for _ in 0..prefix_group_count {
        groups.push(read_prefix_group(input, color_cache_size)?);
    }

    let mut pixels = vec![0u32; width * height];
    let mut p = 0usize;

    while p < pixels.len() {
        let x = p % width;
        let y = p / width;

        let group = if prefix_group_count > 1 {
            let meta = meta_image.as_ref().unwrap();
            let mx = x >> meta_bits;
            let my = y >> meta_bits;
            let id = ((meta[my * meta_width + mx] >> 8) & 0xffff) as usize;
            &groups[id]
        } else {
            &groups[0]
        };

        let g = group.green.decode(input)?;

        if g < 256 {
            let r = group.red.decode(input)? as u32;
            let b = group.blue.decode(input)? as u32;
            let a = group.alpha.decode(input)? as u32;
            let pixel = (a << 24) | (r << 16) | ((g as u32) << 8) | b;
            pixels[p] = pixel;
            if let Some(cache) = cache.as_mut() {
                cache.insert(pixel);
            }
            p += 1;
        } else if g < 256 + LENGTH_SYMBOLS as u16 {
            let length = extra_bits_value(input, (g - 256) as u32) as usize + 1;
            let distance_prefix = group.distance.decode(input)? as u32;
            let distance_code = extra_bits_value(input, distance_prefix);
            let distance = distance_code_to_planar(distance_code, width) as usize;

            if distance > p {
                return Err(Error::InvalidBitstream("backward reference distance exceeds position")
                    .at(Location::PixelIndex(p)));
            }

            for i in 0..length {
                if p + i >= pixels.len() {
                    return Err(Error::InvalidBitstream("backward reference runs past end of image")
                        .at(Location::PixelIndex(p + i)));
                }
                let pixel = pixels[p + i - distance];
                pixels[p + i] = pixel;
                if let Some(cache) = cache.as_mut() {
                    cache.insert(pixel);
                }
            }
            p += length;
        } else {
            let index = (g - 256 - LENGTH_SYMBOLS as u16) as usize;
            let pixel = cache
                .as_ref()
                .and_then(|c| c.get(index))
                .ok_or_else(|| {
                    Error::InvalidBitstream("color cache index without an active cache")
                        .at(Location::PixelIndex(p))
                })?;
            pixels[p] = pixel;
            p += 1;
        }
    }

    trace!("decoded {} pixels", pixels.len());
    Ok(pixels)
}

fn ceil_div(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_cache_hash_matches_spec_formula() {
        let cache = ColorCache::new(8);
        let pixel = 0xff00_00ffu32;
        let expected = (0x1e35a7bdu32.wrapping_mul(pixel) >> (32 - 8)) as usize;
        assert_eq!(cache.hash(pixel), expected);
    }

    #[test]
    fn color_cache_insert_then_get_round_trips() {
        let mut cache = ColorCache::new(4);
        let pixel = 0xaabb_ccddu32;
        let index = cache.hash(pixel);
        cache.insert(pixel);
        assert_eq!(cache.get(index), Some(pixel));
    }

    #[test]
    fn ceil_div_rounds_up() {
        assert_eq!(ceil_div(5, 2), 3);
        assert_eq!(ceil_div(4, 2), 2);
        assert_eq!(ceil_div(0, 2), 0);
    }
}
