use image::imageops::FilterType;
use image::{imageops, DynamicImage, GrayImage, Luma};
use imageproc::contours::find_contours;
use imageproc::contrast::{adaptive_threshold, equalize_histogram, otsu_level, threshold};
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::geometry::min_area_rect;
use log::{debug, warn};

use crate::models::ImageInput;
use crate::utils::PipelineError;

/// Which normalization steps to apply before OCR or feature extraction.
#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    pub denoise: bool,
    pub enhance_contrast: bool,
    pub deskew: bool,
    /// Optional uniform scale applied before the other steps.
    pub resize_factor: Option<f32>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        PreprocessOptions {
            denoise: true,
            enhance_contrast: true,
            deskew: true,
            resize_factor: None,
        }
    }
}

/// Shared image normalization used by every OCR backend and by the
/// classifier's feature extraction. Order matters: denoising before
/// equalization keeps noise from being amplified, and deskew runs on the
/// enhanced grayscale before the final binarization.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    options: PreprocessOptions,
}

// Only correct skew beyond half a degree; smaller angles cost more in
// interpolation blur than they recover
const SKEW_CORRECTION_THRESHOLD_DEGREES: f32 = 0.5;

impl Preprocessor {
    pub fn new(options: PreprocessOptions) -> Self {
        Preprocessor { options }
    }

    /// Decode an image from its source. This is the only place raw inputs are
    /// read; an undecodable image is a terminal error for its document.
    pub fn load(input: &ImageInput) -> Result<DynamicImage, PipelineError> {
        match input {
            ImageInput::Path(path) => image::open(path).map_err(|e| {
                PipelineError::ImageProcessing(format!(
                    "failed to load image {}: {}",
                    path.display(),
                    e
                ))
            }),
            ImageInput::Memory(bytes) => image::load_from_memory(bytes).map_err(|e| {
                PipelineError::ImageProcessing(format!("failed to decode image buffer: {}", e))
            }),
        }
    }

    /// Run the full normalization pipeline and return a binarized grayscale
    /// image ready for text recognition.
    pub fn prepare(&self, image: &DynamicImage) -> GrayImage {
        let mut gray = image.to_luma8();

        if let Some(factor) = self.options.resize_factor {
            if factor > 0.0 && (factor - 1.0).abs() > f32::EPSILON {
                let width = ((gray.width() as f32) * factor).round().max(1.0) as u32;
                let height = ((gray.height() as f32) * factor).round().max(1.0) as u32;
                gray = imageops::resize(&gray, width, height, FilterType::CatmullRom);
            }
        }

        if self.options.denoise {
            gray = median_filter(&gray, 1, 1);
        }

        if self.options.enhance_contrast {
            gray = equalize_histogram(&gray);
        }

        if self.options.deskew {
            gray = Self::deskew(&gray);
        }

        // Adaptive threshold handles uneven scan illumination better than a
        // single global cut
        adaptive_threshold(&gray, 5)
    }

    /// Estimate the dominant skew angle from text-sized contours and rotate
    /// the page upright when the angle is significant.
    fn deskew(gray: &GrayImage) -> GrayImage {
        let angle = Self::estimate_skew_angle(gray);

        if angle.abs() > SKEW_CORRECTION_THRESHOLD_DEGREES {
            debug!("correcting skew of {:.2} degrees", angle);
            rotate_about_center(
                gray,
                -angle.to_radians(),
                Interpolation::Bilinear,
                Luma([255u8]),
            )
        } else {
            gray.clone()
        }
    }

    /// Median angle of minimum-area rectangles fitted around text-sized ink
    /// contours, normalized into [-45, 45] degrees.
    pub fn estimate_skew_angle(gray: &GrayImage) -> f32 {
        let level = otsu_level(gray);
        let mut binary = threshold(gray, level);
        // Contour tracing works on foreground pixels; ink is dark, so invert
        imageops::invert(&mut binary);

        let contours = find_contours::<i32>(&binary);
        let mut angles: Vec<f32> = Vec::new();

        for contour in &contours {
            if contour.points.len() < 4 {
                continue;
            }
            let (min_x, max_x, min_y, max_y) = bounding_extents(&contour.points);
            let area = ((max_x - min_x) as i64) * ((max_y - min_y) as i64);
            // Text-sized blobs only; specks and page borders both mislead
            if !(100..10_000).contains(&area) {
                continue;
            }

            let rect = min_area_rect(&contour.points);
            if let Some(angle) = rect_edge_angle(&rect) {
                angles.push(angle);
            }
        }

        if angles.is_empty() {
            return 0.0;
        }

        angles.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = angles[angles.len() / 2];
        if median.is_finite() {
            median
        } else {
            warn!("skew estimation produced a non-finite angle, skipping deskew");
            0.0
        }
    }
}

fn bounding_extents(points: &[imageproc::point::Point<i32>]) -> (i32, i32, i32, i32) {
    let mut min_x = i32::MAX;
    let mut max_x = i32::MIN;
    let mut min_y = i32::MAX;
    let mut max_y = i32::MIN;
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    (min_x, max_x, min_y, max_y)
}

/// Angle of the longer edge of a fitted rectangle, in degrees, folded into
/// [-45, 45] so portrait and landscape text report the same skew.
fn rect_edge_angle(rect: &[imageproc::point::Point<i32>; 4]) -> Option<f32> {
    let edge_a = (
        (rect[1].x - rect[0].x) as f32,
        (rect[1].y - rect[0].y) as f32,
    );
    let edge_b = (
        (rect[2].x - rect[1].x) as f32,
        (rect[2].y - rect[1].y) as f32,
    );

    let len_a = edge_a.0 * edge_a.0 + edge_a.1 * edge_a.1;
    let len_b = edge_b.0 * edge_b.0 + edge_b.1 * edge_b.1;
    let (dx, dy) = if len_a >= len_b { edge_a } else { edge_b };

    if dx == 0.0 && dy == 0.0 {
        return None;
    }

    let mut angle = dy.atan2(dx).to_degrees();
    while angle > 45.0 {
        angle -= 90.0;
    }
    while angle < -45.0 {
        angle += 90.0;
    }
    Some(angle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_page(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([255u8])))
    }

    #[test]
    fn test_prepare_preserves_dimensions() {
        let preprocessor = Preprocessor::default();
        let page = blank_page(200, 300);
        let prepared = preprocessor.prepare(&page);
        assert_eq!(prepared.dimensions(), (200, 300));
    }

    #[test]
    fn test_prepare_output_is_binary() {
        let preprocessor = Preprocessor::default();
        let mut gray = GrayImage::from_pixel(120, 120, Luma([230u8]));
        for x in 20..100 {
            for y in 50..54 {
                gray.put_pixel(x, y, Luma([20u8]));
            }
        }
        let prepared = preprocessor.prepare(&DynamicImage::ImageLuma8(gray));
        assert!(prepared.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_resize_factor_scales_output() {
        let preprocessor = Preprocessor::new(PreprocessOptions {
            denoise: false,
            enhance_contrast: false,
            deskew: false,
            resize_factor: Some(2.0),
        });
        let prepared = preprocessor.prepare(&blank_page(100, 50));
        assert_eq!(prepared.dimensions(), (200, 100));
    }

    #[test]
    fn test_skew_angle_of_level_page_is_small() {
        // Horizontal bars of "text" should produce a near-zero skew estimate
        let mut gray = GrayImage::from_pixel(300, 200, Luma([255u8]));
        for row in [40u32, 80, 120, 160] {
            for x in 30..270 {
                for dy in 0..6 {
                    gray.put_pixel(x, row + dy, Luma([10u8]));
                }
            }
        }
        let angle = Preprocessor::estimate_skew_angle(&gray);
        assert!(angle.abs() < 2.0, "estimated angle was {}", angle);
    }

    #[test]
    fn test_load_rejects_garbage_bytes() {
        let result = Preprocessor::load(&ImageInput::Memory(vec![0u8; 16]));
        assert!(result.is_err());
    }
}
