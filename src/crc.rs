// Losslessly -- pure decoders for FLAC audio and lossless WebP images
// Copyright (C) 2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the Apache License, Version 2.0, as published by
// the Apache Software Foundation, either version 2.0 of the License, or
// (at your option) any later version.

//! CRC-8 as used to validate FLAC frame headers.
//!
//! The polynomial is 0x07 (x^8 + x^2 + x + 1), the same one used by the
//! reference FLAC tools, computed MSB-first with no reflection and no
//! final XOR.

use std::io;

/// A reader wrapper that accumulates a running CRC-8 over every byte read
/// through it, so that the checksum can be compared against the trailing
/// byte of a frame header without buffering the header separately.
pub struct Crc8Reader<R> {
    inner: R,
    crc: u8,
}

impl<R: io::Read> Crc8Reader<R> {
    /// Wraps `inner`, starting the running checksum at zero.
    pub fn new(inner: R) -> Crc8Reader<R> {
        Crc8Reader { inner, crc: 0 }
    }

    /// Returns the checksum accumulated so far.
    pub fn crc(&self) -> u8 {
        self.crc
    }
}

impl<R: io::Read> io::Read for Crc8Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for &byte in &buf[..n] {
            self.crc = update(self.crc, byte);
        }
        Ok(n)
    }
}

/// Folds one more byte into a running CRC-8 (polynomial 0x07).
pub fn update(crc: u8, byte: u8) -> u8 {
    let mut crc = crc ^ byte;
    for _ in 0..8 {
        crc = if crc & 0x80 != 0 {
            (crc << 1) ^ 0x07
        } else {
            crc << 1
        };
    }
    crc
}

/// Computes the CRC-8 of a full byte slice in one go.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |crc, &b| update(crc, b))
}

#[cfg(test)]
mod tests {
    use super::checksum;

    #[test]
    fn checksum_of_empty_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn checksum_matches_incremental_update() {
        let bytes = [0xffu8, 0xf8, 0x69, 0x18, 0x00];
        let whole = checksum(&bytes);
        let mut crc = 0u8;
        for &b in &bytes {
            crc = super::update(crc, b);
        }
        assert_eq!(whole, crc);
    }
}
