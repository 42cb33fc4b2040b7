use thiserror::Error;

/// Errors that abort a document's processing. Classification and extraction
/// shortfalls return low-confidence results instead of raising, and
/// validation failures live inside validation reports, so neither appears
/// here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Image processing error: {0}")]
    ImageProcessing(String),
    #[error("OCR error: {0}")]
    Ocr(String),
    #[error("All OCR backends failed: {0}")]
    AllBackendsFailed(String),
    #[error("Processing cancelled: {0}")]
    Cancelled(String),
}
