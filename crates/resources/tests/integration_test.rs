//! Integration tests for texture decoding.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use texquad_resources::TextureData;

fn temp_png(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("texquad-{}-{}", std::process::id(), name))
}

#[test]
fn test_decode_generated_png() {
    let path = temp_png("checker.png");

    let mut img = RgbaImage::new(4, 2);
    for (x, y, px) in img.enumerate_pixels_mut() {
        *px = if (x + y) % 2 == 0 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 128])
        };
    }
    img.save(&path).expect("Failed to write test PNG");

    let texture = TextureData::load_rgba8(&path).expect("Failed to decode test PNG");
    let _ = std::fs::remove_file(&path);

    assert_eq!((texture.width, texture.height), (4, 2));
    assert_eq!(texture.pixels.len(), 4 * 2 * 4);
    // Row-major: (0,0) red, (1,0) translucent blue
    assert_eq!(&texture.pixels[0..4], &[255, 0, 0, 255]);
    assert_eq!(&texture.pixels[4..8], &[0, 0, 255, 128]);
    // First texel of the second row is (0,1)
    assert_eq!(&texture.pixels[16..20], &[0, 0, 255, 128]);
}

#[test]
fn test_rgb_png_gets_opaque_alpha() {
    let path = temp_png("rgb.png");

    RgbImage::from_pixel(3, 3, Rgb([10, 20, 30]))
        .save(&path)
        .expect("Failed to write test PNG");

    let texture = TextureData::load_rgba8(&path).expect("Failed to decode test PNG");
    let _ = std::fs::remove_file(&path);

    assert_eq!(texture.pixels.len(), 3 * 3 * 4);
    assert!(texture.pixels.chunks_exact(4).all(|px| px == [10, 20, 30, 255]));
}

#[test]
fn test_garbage_file_is_image_error() {
    let path = temp_png("garbage.png");
    std::fs::write(&path, b"definitely not a png").expect("Failed to write test file");

    let result = TextureData::load_rgba8(&path);
    let _ = std::fs::remove_file(&path);

    assert!(matches!(
        result,
        Err(texquad_resources::ResourceError::Image(_))
    ));
}

#[test]
fn test_shipped_texture_decodes() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../textures/pengu.png");
    let texture = TextureData::load_rgba8(&path).expect("Failed to decode shipped texture");

    assert_eq!((texture.width, texture.height), (256, 256));
    assert_eq!(texture.byte_len(), 256 * 256 * 4);
    assert!(texture.pixels.chunks_exact(4).all(|px| px[3] == 255));
}
