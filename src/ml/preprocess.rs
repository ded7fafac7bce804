//! 入力画像の前処理

use image::imageops::{self, FilterType};
use std::path::Path;

use crate::error::ClassifyError;
use crate::model::Normalization;

/// ImageNetの平均
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNetの標準偏差
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 画像を読み込んで `edge x edge` にリサイズし正規化
///
/// リサイズはLanczos3（アンチエイリアスあり）。
/// 戻り値はRGB画像データを (C, H, W) の順で平坦化したもの。
pub fn load_and_normalize_image(
    path: &Path,
    edge: u32,
    normalization: Normalization,
) -> Result<Vec<f32>, ClassifyError> {
    let decode_error = |message: String| ClassifyError::ImageDecode {
        path: path.to_path_buf(),
        message,
    };

    let img = image::ImageReader::open(path)
        .map_err(|e| decode_error(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| decode_error(e.to_string()))?
        .decode()
        .map_err(|e| decode_error(e.to_string()))?
        .to_rgb8();

    if img.width() == 0 || img.height() == 0 {
        return Err(decode_error("image has no pixels".to_string()));
    }

    let resized = if img.dimensions() == (edge, edge) {
        img
    } else {
        imageops::resize(&img, edge, edge, FilterType::Lanczos3)
    };

    Ok(normalize_rgb(&resized, normalization))
}

/// RGB画像を (C, H, W) の浮動小数に変換
pub fn normalize_rgb(img: &image::RgbImage, normalization: Normalization) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let mut data = Vec::with_capacity(3 * (width * height) as usize);

    for channel in 0..3 {
        for y in 0..height {
            for x in 0..width {
                let value = img.get_pixel(x, y)[channel] as f32 / 255.0;
                let value = match normalization {
                    Normalization::UnitRange => value,
                    Normalization::ImageNet => (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel],
                };
                data.push(value);
            }
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_resize_and_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cell.png");
        let mut img = RgbImage::new(40, 20);
        for pixel in img.pixels_mut() {
            *pixel = Rgb([255, 0, 51]);
        }
        img.save(&path).unwrap();

        let data = load_and_normalize_image(&path, 16, Normalization::UnitRange).unwrap();
        assert_eq!(data.len(), 3 * 16 * 16);
        // チャネル優先の並び
        assert!((data[0] - 1.0).abs() < 1e-3);
        assert!(data[16 * 16].abs() < 1e-3);
        assert!((data[2 * 16 * 16] - 0.2).abs() < 1e-3);
        assert!(data.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_imagenet_normalization() {
        let img = RgbImage::from_pixel(1, 1, Rgb([0, 0, 0]));
        let data = normalize_rgb(&img, Normalization::ImageNet);
        assert!((data[0] + 0.485 / 0.229).abs() < 1e-5);
    }

    #[test]
    fn test_missing_and_corrupt_images() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        assert!(matches!(
            load_and_normalize_image(&missing, 8, Normalization::UnitRange),
            Err(ClassifyError::ImageDecode { .. })
        ));

        let corrupt = dir.path().join("corrupt.png");
        std::fs::write(&corrupt, b"definitely not a png").unwrap();
        assert!(matches!(
            load_and_normalize_image(&corrupt, 8, Normalization::UnitRange),
            Err(ClassifyError::ImageDecode { .. })
        ));
    }
}
