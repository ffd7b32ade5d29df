// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! The reversible transform stack: up to four filters, serialized forward
//! and applied in reverse once the raw ARGB raster has been entropy-decoded.

use log::debug;

use crate::error::{Error, Location, Result};
use crate::webp::bitstream::LsbBitReader;
use crate::webp::entropy_image::decode_image_stream;

/// One parsed transform, in the order it was read from the stream.
pub enum Transform {
    Predictor { block_bits: u32, sub_width: usize, image: Vec<u32> },
    Color { block_bits: u32, sub_width: usize, image: Vec<u32> },
    SubtractGreen,
}

fn ceil_div(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

/// Parses the transform chain (forward order) immediately following the
/// image header. Color-indexing is a recognized but unimplemented
/// transform type, per spec; encountering it is `Unsupported` rather than
/// silently producing wrong pixels.
pub fn read_transforms(
    input: &mut LsbBitReader,
    width: usize,
    height: usize,
) -> Result<Vec<Transform>> {
    let mut transforms = Vec::with_capacity(4);

    while input.read_bit() {
        if transforms.len() >= 4 {
            return Err(Error::InvalidBitstream("too many image transforms")
                .at(Location::ByteOffset(input.bit_offset() / 8)));
        }

        let transform_type = input.read_bits(2);
        let transform = match transform_type {
            0 => {
                let block_bits = input.read_bits(3) + 2;
                let block = 1usize << block_bits;
                let sub_width = ceil_div(width, block);
                let sub_height = ceil_div(height, block);
                let image = decode_image_stream(input, sub_width, sub_height, false)?;
                Transform::Predictor { block_bits, sub_width, image }
            }
            1 => {
                let block_bits = input.read_bits(3) + 2;
                let block = 1usize << block_bits;
                let sub_width = ceil_div(width, block);
                let sub_height = ceil_div(height, block);
                let image = decode_image_stream(input, sub_width, sub_height, false)?;
                Transform::Color { block_bits, sub_width, image }
            }
            2 => Transform::SubtractGreen,
            3 => {
                return Err(Error::Unsupported("color-indexing transform")
                    .at(Location::ByteOffset(input.bit_offset() / 8)))
            }
            _ => unreachable!("2-bit field"),
        };

        debug!("parsed transform type {}", transform_type);
        transforms.push(transform);
    }

    Ok(transforms)
}

/// Applies every transform's inverse, in reverse of the order they were
/// parsed, turning the raw entropy-decoded raster into final ARGB pixels.
pub fn apply_inverse(transforms: &[Transform], width: usize, height: usize, pixels: &mut [u32]) {
    for transform in transforms.iter().rev() {
        match *transform {
            Transform::SubtractGreen => inverse_subtract_green(pixels),
            Transform::Color { block_bits, sub_width, ref image } => {
                inverse_color(pixels, width, height, block_bits, sub_width, image)
            }
            Transform::Predictor { block_bits, sub_width, ref image } => {
                inverse_predictor(pixels, width, height, block_bits, sub_width, image)
            }
        }
    }
}

fn channels(pixel: u32) -> (u8, u8, u8, u8) {
    (
        (pixel >> 24) as u8,
        (pixel >> 16) as u8,
        (pixel >> 8) as u8,
        pixel as u8,
    )
}

fn pack(a: u8, r: u8, g: u8, b: u8) -> u32 {
    (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

fn inverse_subtract_green(pixels: &mut [u32]) {
    for pixel in pixels.iter_mut() {
        let (a, r, g, b) = channels(*pixel);
        *pixel = pack(a, r.wrapping_add(g), g, b.wrapping_add(g));
    }
}

fn sign_extend8(byte: u8) -> i32 {
    byte as i8 as i32
}

fn color_delta(transform_byte: u8, channel: u8) -> u8 {
    ((sign_extend8(transform_byte) * sign_extend8(channel)) >> 5) as u8
}

fn inverse_color(
    pixels: &mut [u32],
    width: usize,
    height: usize,
    block_bits: u32,
    sub_width: usize,
    image: &[u32],
) {
    for y in 0..height {
        for x in 0..width {
            let index = y * width + x;
            let (a, r, g, b) = channels(pixels[index]);

            let block_pixel = image[(y >> block_bits) * sub_width + (x >> block_bits)];
            let (_, red_to_blue, green_to_blue, green_to_red) = channels(block_pixel);

            let r = r.wrapping_add(color_delta(green_to_red, g));
            let b = b.wrapping_add(color_delta(green_to_blue, g));
            let b = b.wrapping_add(color_delta(red_to_blue, r));

            pixels[index] = pack(a, r, g, b);
        }
    }
}

fn avg2(a: u8, b: u8) -> u8 {
    ((a as u16 + b as u16) >> 1) as u8
}

fn avg2_pixel(a: u32, b: u32) -> u32 {
    let (aa, ar, ag, ab) = channels(a);
    let (ba, br, bg, bb) = channels(b);
    pack(avg2(aa, ba), avg2(ar, br), avg2(ag, bg), avg2(ab, bb))
}

fn clamp_byte(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

fn clamp_add_subtract_full(a: u8, b: u8, c: u8) -> u8 {
    clamp_byte(a as i32 + b as i32 - c as i32)
}

fn clamp_add_subtract_full_pixel(l: u32, t: u32, tl: u32) -> u32 {
    let (la, lr, lg, lb) = channels(l);
    let (ta, tr, tg, tb) = channels(t);
    let (tla, tlr, tlg, tlb) = channels(tl);
    pack(
        clamp_add_subtract_full(la, ta, tla),
        clamp_add_subtract_full(lr, tr, tlr),
        clamp_add_subtract_full(lg, tg, tlg),
        clamp_add_subtract_full(lb, tb, tlb),
    )
}

fn clamp_add_subtract_half(avg: u8, c: u8) -> u8 {
    let avg = avg as i32;
    clamp_byte(avg + (avg - c as i32) / 2)
}

fn clamp_add_subtract_half_pixel(avg: u32, tl: u32) -> u32 {
    let (aa, ar, ag, ab) = channels(avg);
    let (tla, tlr, tlg, tlb) = channels(tl);
    pack(
        clamp_add_subtract_half(aa, tla),
        clamp_add_subtract_half(ar, tlr),
        clamp_add_subtract_half(ag, tlg),
        clamp_add_subtract_half(ab, tlb),
    )
}

fn paeth_select(l: u32, t: u32, tl: u32) -> u32 {
    let (la, lr, lg, lb) = channels(l);
    let (ta, tr, tg, tb) = channels(t);
    let (tla, tlr, tlg, tlb) = channels(tl);

    let predict = |l: u8, t: u8, tl: u8| l as i32 + t as i32 - tl as i32;
    let pa = predict(la, ta, tla);
    let pr = predict(lr, tr, tlr);
    let pg = predict(lg, tg, tlg);
    let pb = predict(lb, tb, tlb);

    let cost_l = (pa - la as i32).abs()
        + (pr - lr as i32).abs()
        + (pg - lg as i32).abs()
        + (pb - lb as i32).abs();
    let cost_t = (pa - ta as i32).abs()
        + (pr - tr as i32).abs()
        + (pg - tg as i32).abs()
        + (pb - tb as i32).abs();

    if cost_l < cost_t { l } else { t }
}

/// Predicts the pixel at `(x, y)` given its already-reconstructed
/// neighbours, per predictor mode 0-13. The caller handles the `(0,0)`,
/// `x == 0`, and `y == 0` edge overrides.
fn predict(mode: u8, l: u32, t: u32, tl: u32, tr: u32) -> u32 {
    match mode {
        0 => 0xff00_0000,
        1 => l,
        2 => t,
        3 => tr,
        4 => tl,
        5 => avg2_pixel(avg2_pixel(l, tr), t),
        6 => avg2_pixel(l, tl),
        7 => avg2_pixel(l, t),
        8 => avg2_pixel(tl, t),
        9 => avg2_pixel(t, tr),
        10 => avg2_pixel(avg2_pixel(l, tl), avg2_pixel(t, tr)),
        11 => paeth_select(l, t, tl),
        12 => clamp_add_subtract_full_pixel(l, t, tl),
        13 => clamp_add_subtract_half_pixel(avg2_pixel(l, t), tl),
        _ => 0xff00_0000,
    }
}

fn add_residual(predicted: u32, residual: u32) -> u32 {
    let (pa, pr, pg, pb) = channels(predicted);
    let (ra, rr, rg, rb) = channels(residual);
    pack(
        pa.wrapping_add(ra),
        pr.wrapping_add(rr),
        pg.wrapping_add(rg),
        pb.wrapping_add(rb),
    )
}

fn inverse_predictor(
    pixels: &mut [u32],
    width: usize,
    height: usize,
    block_bits: u32,
    sub_width: usize,
    image: &[u32],
) {
    for y in 0..height {
        for x in 0..width {
            let index = y * width + x;
            let residual = pixels[index];

            let predicted = if x == 0 && y == 0 {
                0xff00_0000
            } else if y == 0 {
                pixels[index - 1]
            } else if x == 0 {
                pixels[index - width]
            } else {
                let mode_pixel = image[(y >> block_bits) * sub_width + (x >> block_bits)];
                let mode = (mode_pixel >> 8) as u8;
                let l = pixels[index - 1];
                let t = pixels[index - width];
                let tl = pixels[index - width - 1];
                let tr = if x + 1 < width { pixels[index - width + 1] } else { t };
                predict(mode, l, t, tl, tr)
            };

            pixels[index] = add_residual(predicted, residual);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtract_green_inverse_folds_green_into_red_and_blue() {
        let mut pixels = [pack(0xff, 10, 5, 20)];
        inverse_subtract_green(&mut pixels);
        let (a, r, g, b) = channels(pixels[0]);
        assert_eq!((a, r, g, b), (0xff, 15, 5, 25));
    }

    #[test]
    fn predictor_zero_zero_is_always_opaque_black() {
        let mut pixels = [pack(0, 0, 0, 0), pack(1, 2, 3, 4)];
        inverse_predictor(&mut pixels, 2, 1, 2, 1, &[0]);
        assert_eq!(pixels[0], 0xff00_0000);
    }

    #[test]
    fn avg2_rounds_down() {
        assert_eq!(avg2(3, 4), 3);
        assert_eq!(avg2(4, 4), 4);
    }

    #[test]
    fn clamp_add_subtract_full_saturates() {
        assert_eq!(clamp_add_subtract_full(250, 250, 0), 255);
        assert_eq!(clamp_add_subtract_full(0, 0, 250), 0);
    }

    #[test]
    fn paeth_select_prefers_closer_neighbour() {
        let l = pack(0, 10, 10, 10);
        let t = pack(0, 100, 100, 100);
        let tl = pack(0, 9, 9, 9);
        // predicted ~= l + t - tl; l is almost equal to predicted here.
        assert_eq!(paeth_select(l, t, tl), l);
    }
}
