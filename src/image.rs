//! Evidence image ingestion
//!
//! Images are validated exactly once when they enter the system; every job
//! that references one afterwards holds a read-only `Arc` and can trust the
//! declared MIME type and dimensions.

use crate::error::{Error, Result};

/// A validated user-supplied image, shared read-only across jobs
#[derive(Debug, Clone)]
pub struct EvidenceImage {
    bytes: Vec<u8>,
    mime: &'static str,
    width: u32,
    height: u32,
}

impl EvidenceImage {
    /// Validate raw bytes into an evidence image.
    ///
    /// Fails when the payload is not a recognizable PNG/JPEG/GIF/WebP or
    /// its dimensions cannot be read.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mime = sniff_mime(&bytes)
            .ok_or_else(|| Error::Image("unrecognized image format".to_string()))?;
        let size = imagesize::blob_size(&bytes)
            .map_err(|e| Error::Image(format!("could not read dimensions: {}", e)))?;
        Ok(Self {
            bytes,
            mime,
            width: size.width as u32,
            height: size.height as u32,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Declared MIME type, derived from the magic bytes
    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Identify the image format from its magic bytes
fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(b"\xff\xd8\xff") {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Smallest well-formed PNG: 1x1, 8-bit grayscale. Shared test fixture.
#[cfg(test)]
pub(crate) fn tiny_png_fixture() -> Vec<u8> {
    let mut png = Vec::new();
    png.extend_from_slice(b"\x89PNG\r\n\x1a\n");
    // IHDR: width=1, height=1, bit depth 8, color type 0
    png.extend_from_slice(&[0, 0, 0, 13]);
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0]);
    png.extend_from_slice(&[0x3a, 0x7e, 0x9b, 0x55]);
    // IDAT: single zlib-deflated filter byte + pixel
    png.extend_from_slice(&[0, 0, 0, 12]);
    png.extend_from_slice(b"IDAT");
    png.extend_from_slice(&[
        0x08, 0xd7, 0x63, 0x60, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00,
    ]);
    png.extend_from_slice(&[0, 0, 0, 0]);
    png.extend_from_slice(b"IEND");
    png.extend_from_slice(&[0xae, 0x42, 0x60, 0x82]);
    png
}
