// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! Top-level orchestration: walk the metadata chain, decode every frame in
//! turn, and pack the result into a WAV file.

use log::info;

use crate::error::{Error, Location, Result};
use crate::flac::frame::read_frame;
use crate::flac::metadata::{read_metadata_chain, MetadataBlock, StreamInfo};

/// The interleaved result of decoding an entire FLAC stream.
pub struct Audio {
    pub stream_info: StreamInfo,
    pub metadata: Vec<MetadataBlock>,
    /// Decoded samples, one `Vec` per channel, each the same length.
    pub channels: Vec<Vec<i64>>,
}

/// Decodes every frame in `data` (a full `.flac` file's bytes), starting
/// from the `fLaC` magic, returning the decoded samples channel by channel.
pub fn decode(data: &[u8]) -> Result<Audio> {
    let (stream_info, metadata, mut offset) = read_metadata_chain(data)?;

    let channel_count = stream_info.channels as usize;
    // STREAMINFO's sample count is a 36-bit field straight from untrusted
    // input; trust it for reserving a sane head start, but cap the
    // up-front allocation so a bogus huge count can't force an immediate
    // multi-gigabyte allocation before a single frame has been validated.
    // A genuinely longer stream just grows the vectors as usual.
    const MAX_CAPACITY_HINT: u64 = 1 << 20;
    let capacity_hint = stream_info.samples.unwrap_or(0).min(MAX_CAPACITY_HINT) as usize;
    let mut channels: Vec<Vec<i64>> = (0..channel_count)
        .map(|_| Vec::with_capacity(capacity_hint))
        .collect();

    let total_samples = stream_info.samples;
    let mut decoded_samples = 0u64;

    loop {
        if let Some(total) = total_samples {
            if decoded_samples >= total {
                break;
            }
        } else if offset >= data.len() {
            break;
        }

        if offset >= data.len() {
            break;
        }

        let (frame, consumed) = read_frame(&data[offset..], &stream_info)?;

        if frame.channels.len() != channel_count {
            return Err(Error::Mismatch("frame channel count does not match STREAMINFO")
                .at(Location::ByteOffset(offset as u64)));
        }

        for (channel, samples) in channels.iter_mut().zip(frame.channels.into_iter()) {
            channel.extend(samples);
        }

        decoded_samples += frame.block_size as u64;
        offset += consumed;
    }

    info!(
        "decoded {} frames worth of samples across {} channel(s)",
        decoded_samples, channel_count
    );

    Ok(Audio { stream_info, metadata, channels })
}

fn bytes_per_sample(bits_per_sample: u8) -> usize {
    ((bits_per_sample as usize) + 7) / 8
}

/// Renders decoded audio as a canonical PCM WAV file: `RIFF`/`WAVE` master
/// chunk, a 16-byte `fmt ` subchunk, and a `data` subchunk holding the
/// interleaved, little-endian samples. 8-bit audio is unsigned per the WAV
/// convention; every other bit depth is signed two's complement.
pub fn encode_wav(audio: &Audio) -> Vec<u8> {
    let channel_count = audio.channels.len();
    let frame_count = audio.channels.first().map_or(0, |c| c.len());
    let bytes_per_sample = bytes_per_sample(audio.stream_info.bits_per_sample);
    let block_align = channel_count * bytes_per_sample;
    let data_size = frame_count * block_align;

    let mut out = Vec::with_capacity(44 + data_size);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((36 + data_size) as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&(channel_count as u16).to_le_bytes());
    out.extend_from_slice(&audio.stream_info.sample_rate.to_le_bytes());
    let byte_rate = audio.stream_info.sample_rate as usize * block_align;
    out.extend_from_slice(&(byte_rate as u32).to_le_bytes());
    out.extend_from_slice(&(block_align as u16).to_le_bytes());
    out.extend_from_slice(&(audio.stream_info.bits_per_sample as u16).to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data_size as u32).to_le_bytes());

    // When the bit depth doesn't fill a whole number of bytes, samples are
    // left-justified within their container, e.g. 20-bit samples occupy
    // the high 20 bits of a 3-byte, 24-bit-wide slot.
    let fill_shift = bytes_per_sample * 8 - audio.stream_info.bits_per_sample as usize;

    for frame in 0..frame_count {
        for channel in &audio.channels {
            let sample = channel[frame] << fill_shift;
            write_sample(&mut out, sample, bytes_per_sample);
        }
    }

    out
}

fn write_sample(out: &mut Vec<u8>, sample: i64, bytes_per_sample: usize) {
    if bytes_per_sample == 1 {
        out.push((sample + 128) as u8);
        return;
    }

    let bits = sample as u64;
    for i in 0..bytes_per_sample {
        out.push((bits >> (8 * i)) as u8);
    }
}

/// Decodes a `.flac` file's bytes directly into WAV bytes.
pub fn decode_to_wav(data: &[u8]) -> Result<Vec<u8>> {
    let audio = decode(data)?;
    Ok(encode_wav(&audio))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_info(bits_per_sample: u8, channels: u8) -> StreamInfo {
        StreamInfo {
            min_block_size: 0,
            max_block_size: 0,
            min_frame_size: None,
            max_frame_size: None,
            sample_rate: 44100,
            channels,
            bits_per_sample,
            samples: None,
            md5sum: [0; 16],
        }
    }

    #[test]
    fn encode_wav_writes_riff_and_data_chunk_sizes() {
        let audio = Audio {
            stream_info: stream_info(16, 2),
            metadata: Vec::new(),
            channels: vec![vec![1, -1], vec![2, -2]],
        };
        let wav = encode_wav(&audio);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[36..40], b"data");
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size, 2 * 2 * 2); // 2 frames * 2 channels * 2 bytes
    }

    #[test]
    fn write_sample_offsets_8_bit_to_unsigned() {
        let mut out = Vec::new();
        write_sample(&mut out, -128, 1);
        assert_eq!(out, vec![0]);
        let mut out = Vec::new();
        write_sample(&mut out, 127, 1);
        assert_eq!(out, vec![255]);
    }

    #[test]
    fn write_sample_packs_16_bit_little_endian_two_complement() {
        let mut out = Vec::new();
        write_sample(&mut out, -1, 2);
        assert_eq!(out, vec![0xff, 0xff]);
    }
}
