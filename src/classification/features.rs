use std::collections::BTreeMap;

use image::{imageops, DynamicImage, GrayImage};
use imageproc::contours::find_contours;
use imageproc::contrast::{otsu_level, threshold};
use imageproc::edges::canny;

/// Computes structural image features used as classification evidence.
/// Feature extraction is independent of the classification rules; each
/// feature is a score in [0, 1] (densities may be much smaller than 1 on
/// real scans).
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor;

/// An edge run has to span at least this many pixels to count as a form
/// line rather than a stroke of text.
const MIN_LINE_RUN: u32 = 40;

impl FeatureExtractor {
    pub fn extract(&self, image: &DynamicImage) -> BTreeMap<String, f64> {
        let gray = image.to_luma8();

        let mut features = BTreeMap::new();
        features.insert("text_density".to_string(), Self::text_density(&gray));
        let form = Self::form_structure(&gray);
        features.insert("form_structure".to_string(), form);
        features.insert("table_score".to_string(), (form * 1.2).min(1.0));
        features.insert("logo_presence".to_string(), Self::logo_presence(&gray));
        features.insert(
            "signature_presence".to_string(),
            Self::signature_presence(&gray),
        );
        features.insert(
            "photo_likelihood".to_string(),
            Self::photo_likelihood(&gray),
        );
        features
    }

    /// Fraction of foreground (ink) pixels after Otsu binarization.
    fn text_density(gray: &GrayImage) -> f64 {
        let level = otsu_level(gray);
        let binary = threshold(gray, level);
        let total = (binary.width() * binary.height()) as f64;
        if total == 0.0 {
            return 0.0;
        }
        let dark = binary.pixels().filter(|p| p.0[0] == 0).count() as f64;
        dark / total
    }

    /// Density of long horizontal and vertical edge runs. Ruled forms and
    /// mark tables produce long straight edges; free text does not.
    fn form_structure(gray: &GrayImage) -> f64 {
        let (width, height) = gray.dimensions();
        if width < MIN_LINE_RUN || height < MIN_LINE_RUN {
            return 0.0;
        }
        let edges = canny(gray, 50.0, 150.0);
        let total = (width as f64) * (height as f64);

        let mut horizontal_pixels = 0u64;
        for y in 0..height {
            let mut run = 0u32;
            for x in 0..width {
                if edges.get_pixel(x, y).0[0] > 0 {
                    run += 1;
                } else {
                    if run >= MIN_LINE_RUN {
                        horizontal_pixels += run as u64;
                    }
                    run = 0;
                }
            }
            if run >= MIN_LINE_RUN {
                horizontal_pixels += run as u64;
            }
        }

        let mut vertical_pixels = 0u64;
        for x in 0..width {
            let mut run = 0u32;
            for y in 0..height {
                if edges.get_pixel(x, y).0[0] > 0 {
                    run += 1;
                } else {
                    if run >= MIN_LINE_RUN {
                        vertical_pixels += run as u64;
                    }
                    run = 0;
                }
            }
            if run >= MIN_LINE_RUN {
                vertical_pixels += run as u64;
            }
        }

        let h_score = horizontal_pixels as f64 / total;
        let v_score = vertical_pixels as f64 / total;
        (h_score + v_score) / 2.0
    }

    /// Count of logo-sized ink blobs in the top third of the page, where
    /// institutional emblems sit. Normalized against three candidates.
    fn logo_presence(gray: &GrayImage) -> f64 {
        let (width, height) = gray.dimensions();
        if height < 3 || width == 0 {
            return 0.0;
        }
        let top = imageops::crop_imm(gray, 0, 0, width, height / 3).to_image();

        let level = otsu_level(&top);
        let mut binary = threshold(&top, level);
        imageops::invert(&mut binary);

        let mut candidates = 0usize;
        for contour in find_contours::<i32>(&binary) {
            let area = contour_box_area(&contour.points);
            if (1_000..10_000).contains(&area) {
                candidates += 1;
            }
        }
        (candidates as f64 / 3.0).min(1.0)
    }

    /// Density of irregular, signature-sized edge blobs in the bottom third.
    fn signature_presence(gray: &GrayImage) -> f64 {
        let (width, height) = gray.dimensions();
        if height < 3 || width < MIN_LINE_RUN {
            return 0.0;
        }
        let offset = 2 * height / 3;
        let bottom = imageops::crop_imm(gray, 0, offset, width, height - offset).to_image();
        let edges = canny(&bottom, 30.0, 100.0);

        let mut score = 0usize;
        for contour in find_contours::<i32>(&edges) {
            let area = contour_box_area(&contour.points);
            if (500..5_000).contains(&area) {
                score += 1;
            }
        }
        (score as f64 / 5.0).min(1.0)
    }

    /// Checks the canonical photo positions (top-left, top-right, center)
    /// for the moderate pixel variance a portrait produces; flat paper and
    /// dense text both fall outside the 20..80 standard-deviation band.
    fn photo_likelihood(gray: &GrayImage) -> f64 {
        let (width, height) = gray.dimensions();
        if width < 3 || height < 4 {
            return 0.0;
        }

        let regions = [
            (0, 0, width / 3, height / 3),
            (2 * width / 3, 0, width - 2 * width / 3, height / 3),
            (width / 3, height / 4, width / 3, height / 2),
        ];

        let mut hits = 0usize;
        for (x, y, w, h) in regions {
            if w == 0 || h == 0 {
                continue;
            }
            let region = imageops::crop_imm(gray, x, y, w, h).to_image();
            let std_dev = pixel_std_dev(&region);
            if std_dev > 20.0 && std_dev < 80.0 {
                hits += 1;
            }
        }
        (hits as f64 / 3.0).min(1.0)
    }
}

fn contour_box_area(points: &[imageproc::point::Point<i32>]) -> i64 {
    if points.is_empty() {
        return 0;
    }
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
    ((max_x - min_x) as i64) * ((max_y - min_y) as i64)
}

fn pixel_std_dev(region: &GrayImage) -> f64 {
    let count = (region.width() * region.height()) as f64;
    if count == 0.0 {
        return 0.0;
    }
    let mut sum = 0.0;
    for p in region.pixels() {
        sum += p.0[0] as f64;
    }
    let mean = sum / count;

    let mut variance = 0.0;
    for p in region.pixels() {
        let diff = p.0[0] as f64 - mean;
        variance += diff * diff;
    }
    (variance / count).sqrt()
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{DynamicImage, GrayImage, Luma};

    /// A white page with a single speck, so thresholding has two classes but
    /// effectively no ink.
    pub fn near_blank_page() -> DynamicImage {
        let mut gray = GrayImage::from_pixel(300, 300, Luma([255u8]));
        gray.put_pixel(150, 150, Luma([0u8]));
        gray.put_pixel(151, 150, Luma([0u8]));
        DynamicImage::ImageLuma8(gray)
    }

    /// Dense text rows plus a ruled grid, the structure of a mark table.
    pub fn table_document() -> DynamicImage {
        let mut gray = GrayImage::from_pixel(300, 300, Luma([255u8]));
        // Text rows
        for y in 5..295u32 {
            if y % 5 < 3 {
                for x in 5..295u32 {
                    gray.put_pixel(x, y, Luma([10u8]));
                }
            }
        }
        // Grid lines
        for y in (20..280u32).step_by(60) {
            for x in 0..300u32 {
                for dy in 0..3 {
                    gray.put_pixel(x, y + dy, Luma([0u8]));
                }
            }
        }
        for x in (30..270u32).step_by(80) {
            for y in 0..300u32 {
                for dx in 0..3 {
                    gray.put_pixel(x + dx, y, Luma([0u8]));
                }
            }
        }
        DynamicImage::ImageLuma8(gray)
    }

    /// An emblem block up top and signature-sized scribbles at the bottom.
    pub fn certificate_document() -> DynamicImage {
        let mut gray = GrayImage::from_pixel(300, 300, Luma([255u8]));
        // Emblem in the top third
        for x in 120..180u32 {
            for y in 20..60u32 {
                gray.put_pixel(x, y, Luma([0u8]));
            }
        }
        // Signature blobs in the bottom third
        for (bx, by) in [(40u32, 240u32), (140, 250), (230, 240)] {
            for x in bx..bx + 30 {
                for y in by..by + 30 {
                    gray.put_pixel(x, y, Luma([30u8]));
                }
            }
        }
        DynamicImage::ImageLuma8(gray)
    }

    /// Portrait-like variance in all three canonical photo regions.
    pub fn photo_card() -> DynamicImage {
        let mut gray = GrayImage::from_pixel(300, 300, Luma([255u8]));
        for x in 0..300u32 {
            for y in 0..300u32 {
                let value = 90 + ((x * 7 + y * 13) % 97) as u8;
                gray.put_pixel(x, y, Luma([value]));
            }
        }
        DynamicImage::ImageLuma8(gray)
    }
}

#[cfg(test)]
mod tests {
    use super::test_images::*;
    use super::*;

    #[test]
    fn test_near_blank_page_scores_low_everywhere() {
        let features = FeatureExtractor.extract(&near_blank_page());
        assert!(features["text_density"] < 0.01);
        assert!(features["form_structure"] < 0.01);
        assert!(features["logo_presence"] < 0.01);
        assert!(features["signature_presence"] < 0.01);
    }

    #[test]
    fn test_table_document_has_text_and_lines() {
        let features = FeatureExtractor.extract(&table_document());
        assert!(
            features["text_density"] > 0.3,
            "text_density was {}",
            features["text_density"]
        );
        assert!(features["form_structure"] > 0.0);
        assert!(features["table_score"] >= features["form_structure"]);
    }

    #[test]
    fn test_certificate_document_has_logo_and_signature() {
        let features = FeatureExtractor.extract(&certificate_document());
        assert!(
            features["logo_presence"] > 0.0,
            "logo_presence was {}",
            features["logo_presence"]
        );
        assert!(
            features["signature_presence"] > 0.0,
            "signature_presence was {}",
            features["signature_presence"]
        );
    }

    #[test]
    fn test_photo_card_hits_all_photo_regions() {
        let features = FeatureExtractor.extract(&photo_card());
        assert!(
            features["photo_likelihood"] > 0.9,
            "photo_likelihood was {}",
            features["photo_likelihood"]
        );
    }
}
