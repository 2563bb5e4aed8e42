use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array, Ix4};
use std::path::Path;
use thiserror::Error;

pub const INPUT_WIDTH: u32 = 224;
pub const INPUT_HEIGHT: u32 = 224;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("failed to open image: {0}")]
    Open(#[from] std::io::Error),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Turns a stored upload into the model input tensor: decode, force RGB,
/// resize to exactly 224x224 and scale to `[0.0, 1.0]` in NHWC layout with
/// a leading batch dimension.
///
/// Resampling is fixed to Catmull-Rom so identical input bytes always yield
/// the identical tensor.
pub fn preprocess_image(path: &Path) -> Result<Array<f32, Ix4>, PreprocessError> {
    let image = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;

    Ok(tensor_from_image(image))
}

fn tensor_from_image(image: DynamicImage) -> Array<f32, Ix4> {
    // to_rgb8 expands grayscale and drops any alpha channel.
    let rgb = image.to_rgb8();
    let resized = image::imageops::resize(&rgb, INPUT_WIDTH, INPUT_HEIGHT, FilterType::CatmullRom);

    let mut input = Array::zeros((1, INPUT_HEIGHT as usize, INPUT_WIDTH as usize, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        input[[0, y as usize, x as usize, 0]] = (r as f32) / 255.;
        input[[0, y as usize, x as usize, 1]] = (g as f32) / 255.;
        input[[0, y as usize, x as usize, 2]] = (b as f32) / 255.;
    }

    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::path::PathBuf;

    fn temp_image_path(tag: &str, data: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("otoscan-preprocess-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{tag}.png"));
        std::fs::write(&path, data).unwrap();
        path
    }

    fn png_bytes(width: u32, height: u32, pixel: Rgb<u8>) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(width, height, pixel);
        let mut data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
            .unwrap();
        data
    }

    #[test]
    fn rgb_image_of_any_size_yields_fixed_shape() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(500, 313, Rgb([255, 0, 0])));
        let tensor = tensor_from_image(image);

        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((tensor[[0, 100, 100, 0]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 100, 100, 1]].abs() < 1e-6);
    }

    #[test]
    fn grayscale_is_expanded_to_three_channels() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(60, 60, image::Luma([128])));
        let tensor = tensor_from_image(image);

        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        let r = tensor[[0, 10, 10, 0]];
        let g = tensor[[0, 10, 10, 1]];
        let b = tensor[[0, 10, 10, 2]];
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn alpha_channel_is_dropped() {
        let image =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 32, Rgba([0, 200, 0, 10])));
        let tensor = tensor_from_image(image);

        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert!((tensor[[0, 5, 5, 1]] - 200.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn preprocessing_is_deterministic() {
        let path = temp_image_path("deterministic", &png_bytes(100, 100, Rgb([13, 37, 200])));

        let first = preprocess_image(&path).unwrap();
        let second = preprocess_image(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_bytes_surface_a_decode_error() {
        let path = temp_image_path("corrupt", b"definitely not an image");

        let result = preprocess_image(&path);
        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }

    #[test]
    fn missing_file_surfaces_an_open_error() {
        let path = PathBuf::from("/nonexistent/otoscan/missing.png");

        let result = preprocess_image(&path);
        assert!(matches!(result, Err(PreprocessError::Open(_))));
    }
}
