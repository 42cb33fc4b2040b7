use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{DynamicImage, ImageFormat};
use log::{debug, info};
use ocrs::{ImageSource, OcrEngine as OcrsEngine, OcrEngineParams, TextItem};
use rten::Model;
use rten_imageproc::BoundingRect;
use tempfile::NamedTempFile;
use tesseract::Tesseract;

use crate::models::{BoundingBox, Metadata, OcrEngineKind, OcrOutput};
use crate::processing::image::{PreprocessOptions, Preprocessor};
use crate::utils::PipelineError;

/// A text-recognition engine. Each implementation is a black box that turns
/// a raster image into text plus a confidence value; engine-specific details
/// stay behind this seam so the arbitrator can treat all engines alike.
pub trait OcrBackend: Send + Sync {
    fn kind(&self) -> OcrEngineKind;

    /// Extract text from the image. When `preprocess` is true the backend
    /// runs the shared preprocessor on its own copy of the image first.
    fn extract_text(
        &self,
        image: &DynamicImage,
        preprocess: bool,
    ) -> Result<OcrOutput, PipelineError>;
}

/// Build a backend for the given engine kind, sharing one set of
/// preprocessing options across all engines.
pub fn build_backend(
    kind: OcrEngineKind,
    options: &PreprocessOptions,
) -> Result<Box<dyn OcrBackend>, PipelineError> {
    let preprocessor = Preprocessor::new(options.clone());
    match kind {
        OcrEngineKind::Tesseract => Ok(Box::new(TesseractBackend::new("eng", preprocessor)?)),
        OcrEngineKind::Leptess => Ok(Box::new(LeptessBackend::new("eng", preprocessor)?)),
        OcrEngineKind::Ocrs => Ok(Box::new(OcrsBackend::with_defaults(preprocessor)?)),
    }
}

fn prepared_image(
    preprocessor: &Preprocessor,
    image: &DynamicImage,
    preprocess: bool,
) -> DynamicImage {
    if preprocess {
        DynamicImage::ImageLuma8(preprocessor.prepare(image))
    } else {
        image.clone()
    }
}

/// Encode an image as PNG into a temporary file and return the handle. The
/// Tesseract bindings read from the filesystem, so in-memory images go
/// through a short-lived temp file.
fn write_temp_png(image: &DynamicImage) -> Result<NamedTempFile, PipelineError> {
    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| PipelineError::Ocr(format!("failed to encode image for OCR: {}", e)))?;

    let mut temp_file = NamedTempFile::new()
        .map_err(|e| PipelineError::Ocr(format!("failed to create temporary file: {}", e)))?;
    temp_file
        .write_all(&buffer)
        .map_err(|e| PipelineError::Ocr(format!("failed to write temporary file: {}", e)))?;
    Ok(temp_file)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, PipelineError> {
    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| PipelineError::Ocr(format!("failed to encode image for OCR: {}", e)))?;
    Ok(buffer)
}

/// Backend wrapping the `tesseract` bindings.
pub struct TesseractBackend {
    language: String,
    preprocessor: Preprocessor,
}

impl TesseractBackend {
    pub fn new(language: &str, preprocessor: Preprocessor) -> Result<Self, PipelineError> {
        // Probe once so a missing installation surfaces at construction time
        Tesseract::new(None, Some(language))
            .map_err(|e| PipelineError::Ocr(format!("Tesseract unavailable: {}", e)))?;
        Ok(TesseractBackend {
            language: language.to_string(),
            preprocessor,
        })
    }
}

impl OcrBackend for TesseractBackend {
    fn kind(&self) -> OcrEngineKind {
        OcrEngineKind::Tesseract
    }

    fn extract_text(
        &self,
        image: &DynamicImage,
        preprocess: bool,
    ) -> Result<OcrOutput, PipelineError> {
        let started = Instant::now();
        let prepared = prepared_image(&self.preprocessor, image, preprocess);
        let temp_file = write_temp_png(&prepared)?;
        let path_str = temp_file
            .path()
            .to_str()
            .ok_or_else(|| PipelineError::Ocr("could not convert temp path to string".to_string()))?;

        let mut tess = Tesseract::new(None, Some(self.language.as_str()))
            .map_err(|e| PipelineError::Ocr(format!("failed to initialize Tesseract: {}", e)))?;
        tess.set_page_seg_mode(tesseract::PageSegMode::PsmAuto);
        let mut tess = tess
            .set_image(path_str)
            .map_err(|e| PipelineError::Ocr(format!("failed to set image: {}", e)))?;

        let text = tess
            .get_text()
            .map_err(|e| PipelineError::Ocr(format!("failed to extract text: {}", e)))?;
        let confidence = (tess.mean_text_conf().max(0) as f64 / 100.0).min(1.0);

        // Word geometry and per-word confidence come from the TSV output;
        // level 5 rows are individual words
        let mut bounding_boxes = Vec::new();
        let mut word_confidences = Vec::new();
        if let Ok(tsv) = tess.get_tsv_text(0) {
            for line in tsv.lines() {
                let columns: Vec<&str> = line.split('\t').collect();
                if columns.len() < 12 || columns[0] != "5" {
                    continue;
                }
                let parsed = (
                    columns[6].parse::<i32>(),
                    columns[7].parse::<i32>(),
                    columns[8].parse::<i32>(),
                    columns[9].parse::<i32>(),
                    columns[10].parse::<f64>(),
                );
                if let (Ok(left), Ok(top), Ok(width), Ok(height), Ok(conf)) = parsed {
                    if conf > 0.0 && !columns[11].trim().is_empty() {
                        bounding_boxes.push(BoundingBox {
                            x1: left,
                            y1: top,
                            x2: left + width,
                            y2: top + height,
                        });
                        word_confidences.push(conf / 100.0);
                    }
                }
            }
        }

        let mut metadata = Metadata::new();
        metadata.insert("language".into(), serde_json::json!(self.language));
        metadata.insert("total_words".into(), serde_json::json!(word_confidences.len()));
        metadata.insert("preprocessed".into(), serde_json::json!(preprocess));

        debug!(
            "tesseract extracted {} chars (confidence {:.3})",
            text.len(),
            confidence
        );

        Ok(OcrOutput {
            text: text.trim().to_string(),
            confidence,
            bounding_boxes,
            word_confidences,
            engine: OcrEngineKind::Tesseract,
            processing_time: started.elapsed().as_secs_f64(),
            metadata,
        })
    }
}

/// Backend wrapping `leptess`, the Leptonica-backed Tesseract bindings.
/// Leptonica's own image handling gives it a different layout analysis path
/// from the plain `tesseract` bindings on degraded scans.
pub struct LeptessBackend {
    language: String,
    preprocessor: Preprocessor,
}

impl LeptessBackend {
    pub fn new(language: &str, preprocessor: Preprocessor) -> Result<Self, PipelineError> {
        leptess::LepTess::new(None, language)
            .map_err(|e| PipelineError::Ocr(format!("Leptess unavailable: {}", e)))?;
        Ok(LeptessBackend {
            language: language.to_string(),
            preprocessor,
        })
    }
}

impl OcrBackend for LeptessBackend {
    fn kind(&self) -> OcrEngineKind {
        OcrEngineKind::Leptess
    }

    fn extract_text(
        &self,
        image: &DynamicImage,
        preprocess: bool,
    ) -> Result<OcrOutput, PipelineError> {
        let started = Instant::now();
        let prepared = prepared_image(&self.preprocessor, image, preprocess);
        let encoded = encode_png(&prepared)?;

        let mut engine = leptess::LepTess::new(None, &self.language)
            .map_err(|e| PipelineError::Ocr(format!("failed to initialize Leptess: {}", e)))?;
        engine
            .set_image_from_mem(&encoded)
            .map_err(|e| PipelineError::Ocr(format!("failed to set image: {}", e)))?;

        let text = engine
            .get_utf8_text()
            .map_err(|e| PipelineError::Ocr(format!("failed to extract text: {}", e)))?;
        let confidence = (engine.mean_text_conf().max(0) as f64 / 100.0).min(1.0);

        let mut metadata = Metadata::new();
        metadata.insert("language".into(), serde_json::json!(self.language));
        metadata.insert("preprocessed".into(), serde_json::json!(preprocess));

        debug!(
            "leptess extracted {} chars (confidence {:.3})",
            text.len(),
            confidence
        );

        Ok(OcrOutput {
            text: text.trim().to_string(),
            confidence,
            bounding_boxes: Vec::new(),
            word_confidences: Vec::new(),
            engine: OcrEngineKind::Leptess,
            processing_time: started.elapsed().as_secs_f64(),
            metadata,
        })
    }
}

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// Default cache directory for the ocrs model files, following the XDG base
/// directory convention (`~/.cache/ocrs`).
fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Backend wrapping the pure-Rust `ocrs` neural OCR engine. Model loading is
/// the expensive step; the engine is built once and reused per image.
pub struct OcrsBackend {
    engine: OcrsEngine,
    preprocessor: Preprocessor,
}

impl OcrsBackend {
    pub fn new(
        detection_model: &Path,
        recognition_model: &Path,
        preprocessor: Preprocessor,
    ) -> Result<Self, PipelineError> {
        let detection = Model::load_file(detection_model).map_err(|e| {
            PipelineError::Ocr(format!(
                "failed to load detection model from {}: {}",
                detection_model.display(),
                e
            ))
        })?;
        let recognition = Model::load_file(recognition_model).map_err(|e| {
            PipelineError::Ocr(format!(
                "failed to load recognition model from {}: {}",
                recognition_model.display(),
                e
            ))
        })?;

        let engine = OcrsEngine::new(OcrEngineParams {
            detection_model: Some(detection),
            recognition_model: Some(recognition),
            ..Default::default()
        })
        .map_err(|e| PipelineError::Ocr(format!("failed to initialize ocrs engine: {}", e)))?;

        info!("ocrs engine initialized");
        Ok(OcrsBackend {
            engine,
            preprocessor,
        })
    }

    /// Load models from the default cache directory. Run `ocrs-cli` once to
    /// populate it, or point `new` at explicit model paths.
    pub fn with_defaults(preprocessor: Preprocessor) -> Result<Self, PipelineError> {
        let dir = default_model_dir();
        Self::new(
            &dir.join(DETECTION_MODEL_FILENAME),
            &dir.join(RECOGNITION_MODEL_FILENAME),
            preprocessor,
        )
    }
}

impl OcrBackend for OcrsBackend {
    fn kind(&self) -> OcrEngineKind {
        OcrEngineKind::Ocrs
    }

    fn extract_text(
        &self,
        image: &DynamicImage,
        preprocess: bool,
    ) -> Result<OcrOutput, PipelineError> {
        let started = Instant::now();
        let prepared = prepared_image(&self.preprocessor, image, preprocess);
        let rgb = prepared.to_rgb8();
        let dimensions = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), dimensions)
            .map_err(|e| PipelineError::Ocr(format!("failed to build image source: {}", e)))?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|e| PipelineError::Ocr(format!("ocrs preprocessing failed: {}", e)))?;

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|e| PipelineError::Ocr(format!("word detection failed: {}", e)))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let line_texts = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|e| PipelineError::Ocr(format!("line recognition failed: {}", e)))?;

        let detected_lines = line_rects.len();
        let mut lines = Vec::new();
        let mut bounding_boxes = Vec::new();
        for line in line_texts.iter().flatten() {
            let text = line.to_string();
            if text.trim().is_empty() {
                continue;
            }
            let rect = line.rotated_rect().bounding_rect();
            bounding_boxes.push(BoundingBox {
                x1: rect.left() as i32,
                y1: rect.top() as i32,
                x2: rect.right() as i32,
                y2: rect.bottom() as i32,
            });
            lines.push(text);
        }

        // The engine reports no model confidence, so use the fraction of
        // detected lines that decoded into text as a proxy
        let confidence = if detected_lines == 0 {
            0.0
        } else {
            lines.len() as f64 / detected_lines as f64
        };

        let mut metadata = Metadata::new();
        metadata.insert("detected_lines".into(), serde_json::json!(detected_lines));
        metadata.insert("recognized_lines".into(), serde_json::json!(lines.len()));
        metadata.insert(
            "confidence_proxy".into(),
            serde_json::json!("recognized_to_detected_line_ratio"),
        );
        metadata.insert("preprocessed".into(), serde_json::json!(preprocess));

        Ok(OcrOutput {
            text: lines.join("\n"),
            confidence,
            bounding_boxes,
            word_confidences: Vec::new(),
            engine: OcrEngineKind::Ocrs,
            processing_time: started.elapsed().as_secs_f64(),
            metadata,
        })
    }
}
