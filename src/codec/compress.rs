//! gzip compression for wire bodies.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use super::CodecError;

/// Content coding advertised for compressed bodies.
pub const GZIP: &str = "gzip";

/// Compresses `data` with gzip at the fastest level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), Compression::fast());
    encoder.write_all(data).map_err(CodecError::Compression)?;
    encoder.finish().map_err(CodecError::Compression)
}

/// Upper bound on an inflated body.
pub const MAX_DECOMPRESSED_BYTES: usize = 16 * 1024 * 1024;

/// Inflates a gzip stream produced by [`compress`] or any other gzip writer.
///
/// Fails with [`CodecError::TooLarge`] once the output would exceed
/// [`MAX_DECOMPRESSED_BYTES`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    decompress_limited(data, MAX_DECOMPRESSED_BYTES)
}

pub fn decompress_limited(data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(data).take(limit as u64 + 1);
    let mut out = Vec::with_capacity(data.len().saturating_mul(2).min(limit));
    decoder
        .read_to_end(&mut out)
        .map_err(CodecError::Compression)?;
    if out.len() > limit {
        return Err(CodecError::TooLarge(limit));
    }
    Ok(out)
}

/// Returns true when a `Content-Encoding`/`Accept-Encoding` value names gzip.
pub fn accepts_gzip(header: &str) -> bool {
    header
        .split(',')
        .map(|part| part.split(';').next().unwrap_or("").trim())
        .any(|coding| coding.eq_ignore_ascii_case(GZIP))
}
