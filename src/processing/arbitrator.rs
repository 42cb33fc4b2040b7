use image::DynamicImage;
use log::{info, warn};

use crate::models::{OcrEngineKind, OcrOutput};
use crate::processing::image::PreprocessOptions;
use crate::processing::ocr::{build_backend, OcrBackend};
use crate::utils::PipelineError;

/// Runs a configured set of OCR backends and keeps the best result.
///
/// A failing backend is logged and dropped from the candidate set; the run
/// only errors when every backend fails. The winner is the candidate with
/// the highest aggregate confidence, ties going to the backend listed first
/// in the configuration. Summaries of the losing candidates are recorded in
/// the winner's metadata so downstream consumers can inspect the spread
/// without re-running inference.
pub struct MultiEngineOcr {
    backends: Vec<Box<dyn OcrBackend>>,
}

impl MultiEngineOcr {
    /// Build backends for the requested engine kinds, in order. Engines that
    /// fail to initialize (missing installation, missing models) are skipped
    /// with a warning; at least one must come up.
    pub fn new(
        kinds: &[OcrEngineKind],
        preprocess: &PreprocessOptions,
    ) -> Result<Self, PipelineError> {
        let mut backends: Vec<Box<dyn OcrBackend>> = Vec::new();
        for kind in kinds {
            match build_backend(*kind, preprocess) {
                Ok(backend) => backends.push(backend),
                Err(e) => warn!("could not initialize {} backend: {}", kind, e),
            }
        }
        Self::from_backends(backends)
    }

    /// Assemble an arbitrator from already-built backends. Used by tests and
    /// by callers with custom engine settings.
    pub fn from_backends(backends: Vec<Box<dyn OcrBackend>>) -> Result<Self, PipelineError> {
        if backends.is_empty() {
            return Err(PipelineError::Ocr(
                "no OCR backends could be initialized".to_string(),
            ));
        }
        info!(
            "OCR arbitrator ready with engines: {:?}",
            backends.iter().map(|b| b.kind()).collect::<Vec<_>>()
        );
        Ok(MultiEngineOcr { backends })
    }

    pub fn available(&self) -> Vec<OcrEngineKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    /// Run every backend and return the highest-confidence result.
    pub fn extract_text(
        &self,
        image: &DynamicImage,
        preprocess: bool,
    ) -> Result<OcrOutput, PipelineError> {
        let mut candidates: Vec<OcrOutput> = Vec::new();
        let mut failures: Vec<String> = Vec::new();

        for backend in &self.backends {
            match backend.extract_text(image, preprocess) {
                Ok(result) => candidates.push(result),
                Err(e) => {
                    warn!("{} backend failed: {}", backend.kind(), e);
                    failures.push(format!("{}: {}", backend.kind(), e));
                }
            }
        }

        if candidates.is_empty() {
            return Err(PipelineError::AllBackendsFailed(failures.join("; ")));
        }

        // Strict comparison keeps the earliest-configured backend on ties
        let mut best_index = 0;
        for (index, candidate) in candidates.iter().enumerate().skip(1) {
            if candidate.confidence > candidates[best_index].confidence {
                best_index = index;
            }
        }

        let mut winner = candidates.remove(best_index);
        let alternatives: Vec<serde_json::Value> = candidates
            .iter()
            .map(|c| {
                serde_json::json!({
                    "engine": c.engine.as_str(),
                    "confidence": c.confidence,
                    "text_length": c.text.len(),
                })
            })
            .collect();
        winner
            .metadata
            .insert("alternatives".into(), serde_json::Value::Array(alternatives));

        info!(
            "arbitration selected {} (confidence {:.3}, {} alternatives)",
            winner.engine,
            winner.confidence,
            candidates.len()
        );
        Ok(winner)
    }
}
