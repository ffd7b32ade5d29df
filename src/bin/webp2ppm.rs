// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! Decodes a lossless `.webp` file to a `.ppm` file alongside it.

use std::env;
use std::fs;
use std::path::Path;

fn main() {
    env_logger::init();

    let arg = env::args().nth(1).expect("usage: webp2ppm <file.webp>");
    let path = Path::new(&arg);
    let data = fs::read(path).expect("failed to read input file");

    let ppm = losslessly::webp::decode_to_ppm(&data).expect("failed to decode WebP image");

    let out_path = path.with_extension("ppm");
    fs::write(&out_path, ppm).expect("failed to write ppm file");
}
