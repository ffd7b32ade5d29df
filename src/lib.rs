// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! Pure, dependency-light decoders for two lossless media formats: FLAC
//! audio and the lossless (VP8L) flavor of WebP images. Both decoders work
//! directly on an in-memory byte slice; neither writes to disk or performs
//! any I/O of its own beyond that.

mod crc;
pub mod error;
pub mod flac;
pub mod webp;

pub use crate::error::{Error, LocatedError, Location, Result};
