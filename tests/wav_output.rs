// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! Checks the WAV bytes this crate emits against an independent reader,
//! rather than trusting our own byte-packing code to mark its own homework.

use losslessly::flac::{encode_wav, Audio, StreamInfo};

fn stream_info(bits_per_sample: u8, channels: u8, sample_rate: u32) -> StreamInfo {
    StreamInfo {
        min_block_size: 0,
        max_block_size: 0,
        min_frame_size: None,
        max_frame_size: None,
        sample_rate,
        channels,
        bits_per_sample,
        samples: None,
        md5sum: [0; 16],
    }
}

#[test]
fn hound_reads_back_16_bit_stereo_samples() {
    let audio = Audio {
        stream_info: stream_info(16, 2, 44_100),
        metadata: Vec::new(),
        channels: vec![vec![0, 1000, -1000, 32767], vec![0, -1000, 1000, -32768]],
    };
    let wav = encode_wav(&audio);

    let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 44_100);
    assert_eq!(spec.bits_per_sample, 16);

    let samples: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
    // hound yields samples interleaved, one per channel per frame.
    assert_eq!(samples, vec![0, 0, 1000, -1000, -1000, 1000, 32767, -32768]);
}

#[test]
fn wav_header_reports_mono_8_bit_format() {
    let audio = Audio {
        stream_info: stream_info(8, 1, 8_000),
        metadata: Vec::new(),
        channels: vec![vec![-128, 0, 127]],
    };
    let wav = encode_wav(&audio);

    let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 8_000);
    assert_eq!(spec.bits_per_sample, 8);
}
