// SPDX-License-Identifier: GPL-3.0-only

//! QR decoding of raw frames
//!
//! The scan loop only depends on the [`Decoder`] trait, so the algorithm can
//! be swapped (or scripted in tests) without touching the loop.

use crate::errors::{ScanError, ScanResult};
use tracing::{debug, trace};

/// Pure function from an RGBA pixel buffer to an optional decoded string
pub trait Decoder: Send + Sync {
    /// Decode at most one code from a tightly packed RGBA buffer
    ///
    /// `Ok(None)` means nothing decodable was found. `Err` means the frame
    /// itself could not be processed.
    fn decode(&self, pixels: &[u8], width: u32, height: u32) -> ScanResult<Option<String>>;
}

/// Decoder backed by `rqrr`
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl RqrrDecoder {
    pub fn new() -> Self {
        Self
    }
}

/// ITU-R BT.601 luma from an RGBA pixel
fn luma(px: &[u8]) -> u8 {
    let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
    ((r * 299 + g * 587 + b * 114) / 1000) as u8
}

impl Decoder for RqrrDecoder {
    fn decode(&self, pixels: &[u8], width: u32, height: u32) -> ScanResult<Option<String>> {
        let (w, h) = (width as usize, height as usize);
        let expected = w * h * 4;
        if pixels.len() < expected {
            return Err(ScanError::Decode(format!(
                "buffer holds {} bytes, {}x{} RGBA needs {}",
                pixels.len(),
                width,
                height,
                expected
            )));
        }

        let start = std::time::Instant::now();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| {
                let offset = (y * w + x) * 4;
                luma(&pixels[offset..offset + 4])
            });
        let grids = prepared.detect_grids();
        trace!(
            count = grids.len(),
            detect_ms = start.elapsed().as_millis(),
            "Grid detection complete"
        );

        // First decodable grid wins; multi-code frames are not reported
        for grid in grids {
            match grid.decode() {
                Ok((_meta, content)) => return Ok(Some(content)),
                Err(e) => debug!(error = ?e, "Failed to decode QR grid"),
            }
        }

        Ok(None)
    }
}
