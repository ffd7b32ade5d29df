// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! Decodes a `.flac` file to a `.wav` file alongside it.

use std::env;
use std::fs;
use std::path::Path;

fn main() {
    env_logger::init();

    let arg = env::args().nth(1).expect("usage: flac2wav <file.flac>");
    let path = Path::new(&arg);
    let data = fs::read(path).expect("failed to read input file");

    let wav = losslessly::flac::decode_to_wav(&data).expect("failed to decode FLAC stream");

    let out_path = path.with_extension("wav");
    fs::write(&out_path, wav).expect("failed to write wav file");
}
