// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! Error types shared by the FLAC and WebP decoders.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// A location hint attached to an error: either a byte offset into the
/// compressed stream, or a pixel index into the raster being reconstructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    /// No location information is available.
    Unknown,
    /// A byte offset into the input stream.
    ByteOffset(u64),
    /// A linear pixel index into the image being decoded.
    PixelIndex(usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Location::Unknown => write!(f, "unknown location"),
            Location::ByteOffset(n) => write!(f, "byte offset {}", n),
            Location::PixelIndex(n) => write!(f, "pixel {}", n),
        }
    }
}

/// The kinds of things that can go wrong while decoding FLAC or WebP.
#[derive(Debug)]
pub enum Error {
    /// A magic number, signature, or other fixed header field had an
    /// unexpected value.
    MalformedHeader(&'static str),
    /// The bitstream violated an invariant the format requires (a reserved
    /// bit was set, a partition layout was impossible, and so on).
    InvalidBitstream(&'static str),
    /// A canonical prefix (Huffman) code could not be built from the
    /// lengths given, or overran its alphabet.
    InvalidCode(&'static str),
    /// A per-frame or per-chunk parameter disagreed with the value fixed
    /// earlier in the stream (e.g. STREAMINFO).
    Mismatch(&'static str),
    /// The FLAC frame header CRC-8 did not match.
    CrcFailure,
    /// A feature the format allows for, but that this decoder does not
    /// implement.
    Unsupported(&'static str),
    /// The underlying reader failed.
    IoError(io::Error),
}

impl Error {
    /// Attaches a location hint to this error, turning it into a `LocatedError`.
    pub fn at(self, location: Location) -> LocatedError {
        LocatedError { error: self, location }
    }
}

/// An `Error` together with where in the stream it was detected.
#[derive(Debug)]
pub struct LocatedError {
    pub error: Error,
    pub location: Location,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::MalformedHeader(msg) => write!(f, "malformed header: {}", msg),
            Error::InvalidBitstream(msg) => write!(f, "invalid bitstream: {}", msg),
            Error::InvalidCode(msg) => write!(f, "invalid prefix code: {}", msg),
            Error::Mismatch(msg) => write!(f, "mismatch: {}", msg),
            Error::CrcFailure => write!(f, "frame header checksum mismatch"),
            Error::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            Error::IoError(ref err) => write!(f, "io error: {}", err),
        }
    }
}

impl fmt::Display for LocatedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.location)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl error::Error for LocatedError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        error::Error::source(&self.error)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<io::Error> for LocatedError {
    fn from(err: io::Error) -> LocatedError {
        Error::IoError(err).at(Location::Unknown)
    }
}

/// Shorthand for results produced by this crate's decoders.
pub type Result<T> = result::Result<T, LocatedError>;
