use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use log::{error, info};
use uuid::Uuid;

use crate::classification::DocumentClassifier;
use crate::extraction::{EntityExtractor, TemplateSet};
use crate::models::{
    BatchResult, ClassificationResult, ClassificationRules, DocumentType, ImageInput, Metadata,
    OcrEngineKind, PipelineStats, ProcessingResult, ProcessingStatus, StructuredRecord,
};
use crate::processing::{MultiEngineOcr, PreprocessOptions, Preprocessor};
use crate::utils::PipelineError;
use crate::validation::{CrossValidator, SchemaValidator};

/// Configuration surface recognized by the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Enabled OCR engines, in arbitration-priority order.
    pub engines: Vec<OcrEngineKind>,
    /// Per-type minimum classification confidence overrides.
    pub min_confidence_overrides: HashMap<DocumentType, f64>,
    /// Threshold consulted by callers that layer an external AI extraction
    /// path on top of this pipeline. Stored, not evaluated here.
    pub ai_confidence_fallback_threshold: f64,
    pub preprocess: PreprocessOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            engines: vec![OcrEngineKind::Tesseract, OcrEngineKind::Ocrs],
            min_confidence_overrides: HashMap::new(),
            ai_confidence_fallback_threshold: 0.5,
            preprocess: PreprocessOptions::default(),
        }
    }
}

/// Cooperative cancellation flag checked at stage boundaries. Cancelling
/// abandons the in-flight document without touching its batch siblings.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single-document processing request.
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    pub file_name: String,
    pub input: ImageInput,
    /// Caller-supplied type, trusted over the classifier when present.
    pub type_hint: Option<DocumentType>,
    /// Free-form contextual fields forwarded into extraction metadata.
    pub context: BTreeMap<String, String>,
    pub cancel: Option<CancelToken>,
}

impl ProcessingRequest {
    pub fn from_path(path: impl Into<std::path::PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        ProcessingRequest {
            file_name,
            input: ImageInput::Path(path),
            type_hint: None,
            context: BTreeMap::new(),
            cancel: None,
        }
    }
}

/// A batch of documents belonging to one subject.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub documents: Vec<ProcessingRequest>,
    pub cross_validate: bool,
}

/// The document-understanding pipeline. Stage order is fixed: optical text
/// first (its output feeds classification), then classification, entity
/// extraction and schema validation; batches add one cross-validation pass
/// at the end. Components share nothing mutable except the cumulative
/// statistics counters, so one pipeline can serve several threads.
pub struct Pipeline {
    ocr: MultiEngineOcr,
    classifier: DocumentClassifier,
    extractor: EntityExtractor,
    validator: SchemaValidator,
    cross_validator: CrossValidator,
    config: PipelineConfig,
    stats: Mutex<PipelineStats>,
}

impl Pipeline {
    /// Build a pipeline with real OCR backends from the configuration.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let ocr = MultiEngineOcr::new(&config.engines, &config.preprocess)?;
        Ok(Self::with_ocr(ocr, config))
    }

    /// Build a pipeline around an existing arbitrator. This is the seam
    /// tests use to substitute stub backends.
    pub fn with_ocr(ocr: MultiEngineOcr, config: PipelineConfig) -> Self {
        let rules =
            ClassificationRules::standard().with_overrides(&config.min_confidence_overrides);
        info!(
            "pipeline initialized with engines {:?}",
            ocr.available()
        );
        Pipeline {
            ocr,
            classifier: DocumentClassifier::new(rules),
            extractor: EntityExtractor::new(TemplateSet::standard()),
            validator: SchemaValidator::new(),
            cross_validator: CrossValidator::new(),
            config,
            stats: Mutex::new(PipelineStats::default()),
        }
    }

    /// The configuration this pipeline was built with, including options
    /// consumed by outer layers rather than by the pipeline itself.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one document through the full stage sequence. Stage failures
    /// are captured into a Failed result with a readable message; this call
    /// itself does not fail.
    pub fn process_document(&self, request: &ProcessingRequest) -> ProcessingResult {
        let started = Instant::now();
        let mut result = ProcessingResult {
            request_id: Uuid::new_v4().to_string(),
            file_name: request.file_name.clone(),
            status: ProcessingStatus::Processing,
            ocr: None,
            classification: None,
            extraction: None,
            validation: None,
            record: None,
            total_processing_time: 0.0,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        info!(
            "processing document {} ({})",
            request.file_name,
            request.input.describe()
        );

        match self.run_stages(request, &mut result) {
            Ok(()) => {
                result.status = ProcessingStatus::Completed;
            }
            Err(e) => {
                error!("processing {} failed: {}", request.file_name, e);
                result.status = ProcessingStatus::Failed;
                result.error_message = Some(e.to_string());
            }
        }

        result.total_processing_time = started.elapsed().as_secs_f64();
        result.completed_at = Some(Utc::now());
        self.record_stats(&result);
        result
    }

    fn run_stages(
        &self,
        request: &ProcessingRequest,
        result: &mut ProcessingResult,
    ) -> Result<(), PipelineError> {
        check_cancelled(request)?;

        // Step 1: load the image; an unreadable input ends this document
        let image = Preprocessor::load(&request.input)?;

        // Step 2: optical text extraction, arbitrated across the configured
        // backends; its output feeds classification
        let ocr = self.ocr.extract_text(&image, true)?;
        info!(
            "OCR complete via {} (confidence {:.3}, {} chars)",
            ocr.engine,
            ocr.confidence,
            ocr.text.len()
        );
        result.ocr = Some(ocr.clone());
        check_cancelled(request)?;

        // Step 3: classification, preferring the caller's hint when present
        let classification = match request.type_hint {
            Some(document_type) => {
                let mut metadata = Metadata::new();
                metadata.insert(
                    "classification_method".into(),
                    serde_json::json!("caller_hint"),
                );
                ClassificationResult {
                    document_type,
                    confidence: 1.0,
                    features: BTreeMap::new(),
                    metadata,
                }
            }
            None => self
                .classifier
                .classify(&image, Some(&ocr.text), &request.file_name),
        };
        info!(
            "classified as {} (confidence {:.3})",
            classification.document_type, classification.confidence
        );
        let document_type = classification.document_type;
        result.classification = Some(classification);
        check_cancelled(request)?;

        // Step 4: entity extraction
        let extraction = self
            .extractor
            .extract(&ocr.text, document_type, Some(&request.context));
        info!(
            "extracted {} entities (confidence {:.3})",
            extraction.entities.len(),
            extraction.confidence
        );
        let record = StructuredRecord {
            document_type,
            fields: extraction.entities.clone(),
        };
        result.extraction = Some(extraction);
        check_cancelled(request)?;

        // Step 5: schema validation; invalid is a normal terminal state
        let validation = self.validator.validate(&record);
        info!(
            "validation {} ({} errors, {} warnings)",
            if validation.is_valid { "passed" } else { "failed" },
            validation.errors.len(),
            validation.warnings.len()
        );
        result.validation = Some(validation);
        result.record = Some(record);
        Ok(())
    }

    /// Process a batch: every document runs the full sequence independently,
    /// then cross-validation runs once over the successfully structured
    /// records when the batch requests it and at least two exist.
    pub fn process_batch(&self, request: &BatchRequest) -> BatchResult {
        let started = Instant::now();
        let batch_id = Uuid::new_v4().to_string();
        info!(
            "processing batch {} with {} documents",
            batch_id,
            request.documents.len()
        );

        let results: Vec<ProcessingResult> = request
            .documents
            .iter()
            .map(|doc| self.process_document(doc))
            .collect();

        let cross_validation = if request.cross_validate {
            let records: Vec<StructuredRecord> = results
                .iter()
                .filter(|r| r.status == ProcessingStatus::Completed)
                .filter_map(|r| r.record.clone())
                .collect();
            if records.len() >= 2 {
                Some(self.cross_validator.cross_validate(&records))
            } else {
                None
            }
        } else {
            None
        };

        BatchResult {
            batch_id,
            results,
            cross_validation,
            status: ProcessingStatus::Completed,
            total_processing_time: started.elapsed().as_secs_f64(),
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    /// Snapshot of the cumulative counters.
    pub fn stats(&self) -> PipelineStats {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn available_engines(&self) -> Vec<OcrEngineKind> {
        self.ocr.available()
    }

    fn record_stats(&self, result: &ProcessingResult) {
        let mut stats = self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        stats.documents_processed += 1;
        let successful = result.status == ProcessingStatus::Completed
            && result.validation.as_ref().map(|v| v.is_valid).unwrap_or(false);
        if successful {
            stats.successful_extractions += 1;
        } else {
            stats.failed_extractions += 1;
        }

        let n = stats.documents_processed as f64;
        stats.average_processing_time =
            (stats.average_processing_time * (n - 1.0) + result.total_processing_time) / n;
    }
}

fn check_cancelled(request: &ProcessingRequest) -> Result<(), PipelineError> {
    if let Some(token) = &request.cancel {
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled(
                "processing cancelled by caller".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, OcrOutput};
    use crate::processing::ocr::OcrBackend;
    use image::codecs::png::PngEncoder;
    use image::{ColorType, DynamicImage, GrayImage, ImageEncoder, Luma};

    /// Backend that always returns the given text.
    struct FixedTextBackend {
        kind: OcrEngineKind,
        text: String,
        confidence: f64,
    }

    impl OcrBackend for FixedTextBackend {
        fn kind(&self) -> OcrEngineKind {
            self.kind
        }

        fn extract_text(
            &self,
            _image: &DynamicImage,
            _preprocess: bool,
        ) -> Result<OcrOutput, PipelineError> {
            Ok(OcrOutput {
                text: self.text.clone(),
                confidence: self.confidence,
                bounding_boxes: vec![BoundingBox {
                    x1: 0,
                    y1: 0,
                    x2: 10,
                    y2: 10,
                }],
                word_confidences: vec![self.confidence],
                engine: self.kind,
                processing_time: 0.0,
                metadata: Metadata::new(),
            })
        }
    }

    struct FailingBackend;

    impl OcrBackend for FailingBackend {
        fn kind(&self) -> OcrEngineKind {
            OcrEngineKind::Leptess
        }

        fn extract_text(
            &self,
            _image: &DynamicImage,
            _preprocess: bool,
        ) -> Result<OcrOutput, PipelineError> {
            Err(PipelineError::Ocr("engine not available".to_string()))
        }
    }

    const MARKSHEET_TEXT: &str = "Department of Pre-University Education\n\
        Candidate's Name: SANJAN B M\n\
        Register No: 456123\n\
        Examination held in March 2022\n\
        Stream: Science\n\
        higher secondary intermediate plus two\n\
        PHYSICS : 87\nCHEMISTRY : 82\nMATHEMATICS : 95";

    fn stub_pipeline(text: &str) -> Pipeline {
        let ocr = MultiEngineOcr::from_backends(vec![Box::new(FixedTextBackend {
            kind: OcrEngineKind::Tesseract,
            text: text.to_string(),
            confidence: 0.9,
        })])
        .expect("arbitrator");
        Pipeline::with_ocr(ocr, PipelineConfig::default())
    }

    fn png_bytes(image: &GrayImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(image.as_raw(), image.width(), image.height(), ColorType::L8)
            .expect("png encode");
        bytes
    }

    /// A table-looking page matching the marksheet structural features.
    fn marksheet_image_bytes() -> Vec<u8> {
        let mut gray = GrayImage::from_pixel(300, 300, Luma([255u8]));
        for y in 5..295u32 {
            if y % 5 < 3 {
                for x in 5..295u32 {
                    gray.put_pixel(x, y, Luma([10u8]));
                }
            }
        }
        png_bytes(&gray)
    }

    fn request(text_hint: Option<DocumentType>) -> ProcessingRequest {
        ProcessingRequest {
            file_name: "marksheet.png".to_string(),
            input: ImageInput::Memory(marksheet_image_bytes()),
            type_hint: text_hint,
            context: BTreeMap::new(),
            cancel: None,
        }
    }

    #[test]
    fn test_document_runs_all_stages_to_completion() {
        let pipeline = stub_pipeline(MARKSHEET_TEXT);
        let result = pipeline.process_document(&request(None));

        assert_eq!(result.status, ProcessingStatus::Completed, "error: {:?}", result.error_message);
        assert!(result.ocr.is_some());
        let classification = result.classification.as_ref().expect("classification");
        assert_eq!(classification.document_type, DocumentType::Marksheet12th);
        assert!(result.extraction.is_some());
        assert!(result.validation.is_some());
        let record = result.record.as_ref().expect("record");
        assert_eq!(record.text_field("name"), Some("Sanjan B M"));
        assert!(result.completed_at.is_some());
    }

    #[test]
    fn test_type_hint_bypasses_classifier() {
        let pipeline = stub_pipeline(MARKSHEET_TEXT);
        let result = pipeline.process_document(&request(Some(DocumentType::Marksheet10th)));
        let classification = result.classification.as_ref().expect("classification");
        assert_eq!(classification.document_type, DocumentType::Marksheet10th);
        assert_eq!(
            classification.metadata.get("classification_method"),
            Some(&serde_json::json!("caller_hint"))
        );
    }

    #[test]
    fn test_unreadable_image_fails_before_ocr() {
        let pipeline = stub_pipeline(MARKSHEET_TEXT);
        let request = ProcessingRequest {
            file_name: "broken.png".to_string(),
            input: ImageInput::Memory(vec![0u8; 8]),
            type_hint: None,
            context: BTreeMap::new(),
            cancel: None,
        };
        let result = pipeline.process_document(&request);

        assert_eq!(result.status, ProcessingStatus::Failed);
        assert!(result.error_message.is_some());
        assert!(result.ocr.is_none());
    }

    #[test]
    fn test_all_backends_failing_fails_the_document() {
        let ocr = MultiEngineOcr::from_backends(vec![Box::new(FailingBackend)]).expect("arbitrator");
        let pipeline = Pipeline::with_ocr(ocr, PipelineConfig::default());
        let result = pipeline.process_document(&request(None));

        assert_eq!(result.status, ProcessingStatus::Failed);
        let message = result.error_message.expect("message");
        assert!(message.contains("backends"), "message: {}", message);
    }

    #[test]
    fn test_cancelled_request_is_failed_with_reason() {
        let pipeline = stub_pipeline(MARKSHEET_TEXT);
        let token = CancelToken::new();
        token.cancel();
        let mut request = request(None);
        request.cancel = Some(token);

        let result = pipeline.process_document(&request);
        assert_eq!(result.status, ProcessingStatus::Failed);
        assert!(result
            .error_message
            .expect("message")
            .to_lowercase()
            .contains("cancel"));
    }

    #[test]
    fn test_batch_is_independent_and_cross_validates() {
        let tenth_text = "Karnataka Secondary Education Examination Board\n\
            Candidate's Name: SANJAN B M\nRoll No: 456123\nmatriculation sslc class x\n\
            Examination held in March 2020\nCBSE\n\
            MATHEMATICS : 92\nSCIENCE : 88\nENGLISH : 85";

        // The stub backend serves the same text for every document, so both
        // batch entries describe the same subject
        let pipeline = stub_pipeline(tenth_text);
        let batch = BatchRequest {
            documents: vec![request(Some(DocumentType::Marksheet10th)), {
                let mut second = request(Some(DocumentType::Marksheet10th));
                second.file_name = "second.png".to_string();
                second
            }],
            cross_validate: true,
        };
        let result = pipeline.process_batch(&batch);

        assert_eq!(result.results.len(), 2);
        assert_eq!(result.status, ProcessingStatus::Completed);
        let cross = result.cross_validation.expect("cross-validation report");
        // Same subject on both documents, so consistency holds
        assert!(cross.is_valid, "errors: {:?}", cross.errors);
    }

    #[test]
    fn test_batch_without_two_structured_documents_skips_cross_validation() {
        let pipeline = stub_pipeline(MARKSHEET_TEXT);
        let batch = BatchRequest {
            documents: vec![request(None)],
            cross_validate: true,
        };
        let result = pipeline.process_batch(&batch);
        assert!(result.cross_validation.is_none());
    }

    #[test]
    fn test_stats_accumulate() {
        let pipeline = stub_pipeline(MARKSHEET_TEXT);
        pipeline.process_document(&request(None));
        pipeline.process_document(&request(None));

        let stats = pipeline.stats();
        assert_eq!(stats.documents_processed, 2);
        assert_eq!(
            stats.successful_extractions + stats.failed_extractions,
            stats.documents_processed
        );
        assert!(stats.average_processing_time >= 0.0);
    }
}
