// SPDX-License-Identifier: GPL-3.0-only

//! Decoding real codes through the frame and image paths

use qrlink::backends::camera::image_file::load_image_as_frame;
use qrlink::backends::camera::{CameraFrame, PixelFormat};
use qrlink::scanner::{Decoder, RqrrDecoder};
use std::sync::Arc;
use std::time::Instant;

const PAYLOAD: &str = "https://example.com/menu?table=12";
const SCALE: u32 = 6;
const QUIET_ZONE: u32 = 4;

fn qr_image(payload: &str) -> image::RgbaImage {
    let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let side = (modules + 2 * QUIET_ZONE) * SCALE;

    image::RgbaImage::from_fn(side, side, |x, y| {
        let (mx, my) = (x / SCALE, y / SCALE);
        let inside = (QUIET_ZONE..QUIET_ZONE + modules).contains(&mx)
            && (QUIET_ZONE..QUIET_ZONE + modules).contains(&my);
        let dark = inside
            && colors[((my - QUIET_ZONE) * modules + (mx - QUIET_ZONE)) as usize]
                == qrcode::Color::Dark;
        if dark {
            image::Rgba([0, 0, 0, 255])
        } else {
            image::Rgba([255, 255, 255, 255])
        }
    })
}

fn decode_frame(frame: &CameraFrame) -> Option<String> {
    let pixels = frame.packed_rgba();
    RqrrDecoder::new()
        .decode(&pixels, frame.width, frame.height)
        .unwrap()
}

#[test]
fn test_decode_png_through_image_loader() {
    let path = std::env::temp_dir().join(format!("qrlink-decode-{}.png", std::process::id()));
    qr_image(PAYLOAD).save(&path).unwrap();

    let frame = load_image_as_frame(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(decode_frame(&frame).as_deref(), Some(PAYLOAD));
}

#[test]
fn test_decode_frame_with_row_padding() {
    let img = qr_image(PAYLOAD);
    let (width, height) = img.dimensions();
    let row_bytes = width as usize * 4;
    let stride = row_bytes + 12;

    // Padding filled with black so any stride mistake corrupts the image
    let mut data = vec![0u8; stride * height as usize];
    for (y, row) in img.as_raw().chunks_exact(row_bytes).enumerate() {
        data[y * stride..y * stride + row_bytes].copy_from_slice(row);
    }

    let frame = CameraFrame {
        width,
        height,
        data: Arc::from(data),
        format: PixelFormat::RGBA,
        stride: stride as u32,
        captured_at: Instant::now(),
    };

    assert_eq!(frame.packed_rgba().len(), row_bytes * height as usize);
    assert_eq!(decode_frame(&frame).as_deref(), Some(PAYLOAD));
}

#[test]
fn test_decode_gray_frame() {
    let img = qr_image(PAYLOAD);
    let (width, height) = img.dimensions();
    let gray: Vec<u8> = img.pixels().map(|p| p[0]).collect();

    let frame = CameraFrame {
        width,
        height,
        data: Arc::from(gray),
        format: PixelFormat::Gray8,
        stride: width,
        captured_at: Instant::now(),
    };

    assert_eq!(decode_frame(&frame).as_deref(), Some(PAYLOAD));
}
