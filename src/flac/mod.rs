// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! A pure decoder for FLAC audio.

pub mod bitstream;
pub mod driver;
pub mod frame;
pub mod metadata;
pub mod subframe;

pub use self::driver::{decode, decode_to_wav, encode_wav, Audio};
pub use self::metadata::{MetadataBlock, StreamInfo};
