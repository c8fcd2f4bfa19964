//! Contour detection transform.
//!
//! Decodes an image, runs Canny edge detection, extracts external-boundary
//! contours and draws them onto a copy of the original, written as JPEG
//! into the result directory under a random filename.

use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::edges::canny;
use imageproc::point::Point;
use tracing::debug;
use uuid::Uuid;

use crate::types::{AppError, AppResult};

/// Fixed Canny hysteresis thresholds.
pub const CANNY_LOW: f32 = 50.0;
pub const CANNY_HIGH: f32 = 150.0;

const CONTOUR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Stroke width in pixels.
const LINE_THICKNESS: u32 = 2;

/// Detects external contours in the image at `input` and writes an
/// annotated copy into `result_dir`, returning the output path.
///
/// Creates `result_dir` if absent. Deterministic for identical input
/// bytes except for the random output filename.
pub fn detect_and_draw_contours(input: &Path, result_dir: &Path) -> AppResult<PathBuf> {
    let image = image::open(input)
        .map_err(|e| AppError::Decode(format!("cannot load {}: {e}", input.display())))?;

    let gray = image.to_luma8();
    let edges = canny(&gray, CANNY_LOW, CANNY_HIGH);
    let contours: Vec<Contour<i32>> = find_contours(&edges);

    let mut canvas = image.to_rgb8();
    let mut drawn = 0usize;
    for contour in &contours {
        // External boundaries only, no nested or hole contours.
        if contour.border_type != BorderType::Outer || contour.parent.is_some() {
            continue;
        }
        draw_closed_polyline(&mut canvas, &contour.points);
        drawn += 1;
    }
    debug!(
        input = %input.display(),
        contours = contours.len(),
        drawn,
        "contour detection finished"
    );

    std::fs::create_dir_all(result_dir)?;
    let output_path = result_dir.join(format!("contour_{}.jpg", Uuid::new_v4().simple()));
    canvas
        .save_with_format(&output_path, ImageFormat::Jpeg)
        .map_err(|e| match e {
            image::ImageError::IoError(io) => AppError::Io(io),
            other => AppError::Internal(format!("failed to encode result: {other}")),
        })?;

    Ok(output_path)
}

/// Draws the contour as a closed polyline. The stroke width is
/// approximated by repeating each segment at one-pixel offsets.
fn draw_closed_polyline(canvas: &mut RgbImage, points: &[Point<i32>]) {
    if points.is_empty() {
        return;
    }
    let segments = points.len();
    for i in 0..segments {
        let a = points[i];
        let b = points[(i + 1) % segments];
        for dx in 0..LINE_THICKNESS {
            for dy in 0..LINE_THICKNESS {
                draw_line_segment_mut(
                    canvas,
                    ((a.x + dx as i32) as f32, (a.y + dy as i32) as f32),
                    ((b.x + dx as i32) as f32, (b.y + dy as i32) as f32),
                    CONTOUR_COLOR,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use tempfile::TempDir;

    /// A black frame with a white square in the middle, enough edge
    /// gradient for Canny to find a boundary.
    fn sample_image(dir: &Path) -> PathBuf {
        let mut img = RgbImage::new(64, 64);
        draw_filled_rect_mut(&mut img, Rect::at(16, 16).of_size(32, 32), Rgb([255, 255, 255]));
        let path = dir.join("square.png");
        img.save_with_format(&path, ImageFormat::Png).unwrap();
        path
    }

    #[test]
    fn test_transform_writes_jpeg_into_result_dir() {
        let tmp = TempDir::new().unwrap();
        let input = sample_image(tmp.path());
        let result_dir = tmp.path().join("results");

        let output = detect_and_draw_contours(&input, &result_dir).unwrap();

        assert!(output.starts_with(&result_dir));
        assert_eq!(output.extension().unwrap(), "jpg");
        // The annotated copy must itself be a loadable image.
        image::open(&output).unwrap();
    }

    #[test]
    fn test_output_filenames_are_unique() {
        let tmp = TempDir::new().unwrap();
        let input = sample_image(tmp.path());
        let result_dir = tmp.path().join("results");

        let a = detect_and_draw_contours(&input, &result_dir).unwrap();
        let b = detect_and_draw_contours(&input, &result_dir).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unreadable_image_is_a_decode_error() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("broken.jpg");
        std::fs::write(&input, b"definitely not a jpeg").unwrap();

        let err = detect_and_draw_contours(&input, tmp.path()).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[test]
    fn test_missing_file_is_a_decode_error() {
        let tmp = TempDir::new().unwrap();
        let err =
            detect_and_draw_contours(&tmp.path().join("nope.png"), tmp.path()).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }
}
