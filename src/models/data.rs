use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of supported document types. Used as the dispatch key for
/// classification rules, extraction templates and validation schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    #[serde(rename = "marksheet_10th")]
    Marksheet10th,
    #[serde(rename = "marksheet_12th")]
    Marksheet12th,
    PassingCertificate,
    TransferCertificate,
    MigrationCertificate,
    EntranceScorecard,
    EntranceAdmitCard,
    CasteCertificate,
    DomicileCertificate,
    AadhaarCard,
    PassportPhoto,
    Other,
}

impl DocumentType {
    /// Every supported type, in rule-table order.
    pub fn all() -> &'static [DocumentType] {
        &[
            DocumentType::Marksheet10th,
            DocumentType::Marksheet12th,
            DocumentType::PassingCertificate,
            DocumentType::TransferCertificate,
            DocumentType::MigrationCertificate,
            DocumentType::EntranceScorecard,
            DocumentType::EntranceAdmitCard,
            DocumentType::CasteCertificate,
            DocumentType::DomicileCertificate,
            DocumentType::AadhaarCard,
            DocumentType::PassportPhoto,
            DocumentType::Other,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Marksheet10th => "marksheet_10th",
            DocumentType::Marksheet12th => "marksheet_12th",
            DocumentType::PassingCertificate => "passing_certificate",
            DocumentType::TransferCertificate => "transfer_certificate",
            DocumentType::MigrationCertificate => "migration_certificate",
            DocumentType::EntranceScorecard => "entrance_scorecard",
            DocumentType::EntranceAdmitCard => "entrance_admit_card",
            DocumentType::CasteCertificate => "caste_certificate",
            DocumentType::DomicileCertificate => "domicile_certificate",
            DocumentType::AadhaarCard => "aadhaar_card",
            DocumentType::PassportPhoto => "passport_photo",
            DocumentType::Other => "other",
        }
    }

    pub fn is_marksheet(&self) -> bool {
        matches!(self, DocumentType::Marksheet10th | DocumentType::Marksheet12th)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed field value in an extracted record. The field set varies by
/// document type, so records are open maps rather than fixed structs; nested
/// maps hold multi-value fields such as subject/marks pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Number(f64),
    Text(String),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            FieldValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(n) => Some(*n as f64),
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Integer(_) => "integer",
            FieldValue::Number(_) => "number",
            FieldValue::Text(_) => "text",
            FieldValue::Map(_) => "map",
        }
    }
}

/// Ordered field-name to value mapping; iteration order is deterministic so
/// repeated extraction runs produce identical output.
pub type EntityMap = BTreeMap<String, FieldValue>;

/// Free-form metadata attached to stage results.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// The optical-text engines the pipeline can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrEngineKind {
    Tesseract,
    Leptess,
    Ocrs,
}

impl OcrEngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrEngineKind::Tesseract => "tesseract",
            OcrEngineKind::Leptess => "leptess",
            OcrEngineKind::Ocrs => "ocrs",
        }
    }

    pub fn from_name(name: &str) -> Option<OcrEngineKind> {
        match name.trim().to_lowercase().as_str() {
            "tesseract" => Some(OcrEngineKind::Tesseract),
            "leptess" => Some(OcrEngineKind::Leptess),
            "ocrs" => Some(OcrEngineKind::Ocrs),
            _ => None,
        }
    }
}

impl fmt::Display for OcrEngineKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Axis-aligned word bounding box in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// Output of one optical-text extraction. Never mutated after creation,
/// except that arbitration records losing candidates into `metadata` under
/// the "alternatives" key before handing the winner out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    /// Aggregate confidence in [0, 1].
    pub confidence: f64,
    pub bounding_boxes: Vec<BoundingBox>,
    pub word_confidences: Vec<f64>,
    pub engine: OcrEngineKind,
    /// Elapsed wall time in seconds.
    pub processing_time: f64,
    pub metadata: Metadata,
}

/// Output of document-type classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub document_type: DocumentType,
    pub confidence: f64,
    /// Named structural feature scores that fed the decision.
    pub features: BTreeMap<String, f64>,
    pub metadata: Metadata,
}

/// Output of entity extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityResult {
    pub entities: EntityMap,
    pub confidence: f64,
    pub extraction_method: String,
    pub metadata: Metadata,
}

/// Outcome of schema or cross-document validation. Errors are blocking,
/// warnings are advisory; an invalid report is a normal inspectable state,
/// not a failure of the pipeline itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub confidence: f64,
    pub metadata: Metadata,
}

/// Lifecycle of a single document inside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Where the raster image comes from. The pipeline does not fetch or cache
/// images itself; callers hand over a local path or a decoded buffer.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Path(PathBuf),
    Memory(Vec<u8>),
}

impl ImageInput {
    pub fn describe(&self) -> String {
        match self {
            ImageInput::Path(p) => p.display().to_string(),
            ImageInput::Memory(bytes) => format!("<memory, {} bytes>", bytes.len()),
        }
    }
}

/// The final structured record emitted per document. This is what callers
/// persist and what cross-document validation consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredRecord {
    pub document_type: DocumentType,
    pub fields: EntityMap,
}

impl StructuredRecord {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_text())
    }

    pub fn integer_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(|v| v.as_i64())
    }
}

/// Aggregate result for one document. Created when the request is accepted,
/// filled in as stages complete and finalized exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub request_id: String,
    pub file_name: String,
    pub status: ProcessingStatus,
    pub ocr: Option<OcrOutput>,
    pub classification: Option<ClassificationResult>,
    pub extraction: Option<EntityResult>,
    pub validation: Option<ValidationReport>,
    pub record: Option<StructuredRecord>,
    /// Total wall time in seconds.
    pub total_processing_time: f64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result of a batch run. The cross-validation report is present only when
/// at least two documents in the batch produced structured records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: String,
    pub results: Vec<ProcessingResult>,
    pub cross_validation: Option<ValidationReport>,
    pub status: ProcessingStatus,
    pub total_processing_time: f64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Cumulative pipeline counters, updated after every document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub documents_processed: u64,
    pub successful_extractions: u64,
    pub failed_extractions: u64,
    pub average_processing_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_round_trip() {
        for doc_type in DocumentType::all() {
            let json = serde_json::to_string(doc_type).expect("serialize");
            assert_eq!(json, format!("\"{}\"", doc_type.as_str()));
            let back: DocumentType = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, *doc_type);
        }
    }

    #[test]
    fn test_field_value_accessors() {
        assert_eq!(FieldValue::Integer(95).as_i64(), Some(95));
        assert_eq!(FieldValue::Number(88.0).as_i64(), Some(88));
        assert_eq!(FieldValue::Number(88.5).as_i64(), None);
        assert_eq!(FieldValue::Text("abc".into()).as_text(), Some("abc"));

        let mut subjects = EntityMap::new();
        subjects.insert("Mathematics".into(), FieldValue::Integer(95));
        let map = FieldValue::Map(subjects);
        assert_eq!(map.as_map().and_then(|m| m.get("Mathematics")).and_then(|v| v.as_i64()), Some(95));
    }

    #[test]
    fn test_structured_record_helpers() {
        let mut fields = EntityMap::new();
        fields.insert("name".into(), FieldValue::Text("Sanjan B M".into()));
        fields.insert("year".into(), FieldValue::Integer(2022));
        let record = StructuredRecord {
            document_type: DocumentType::Marksheet12th,
            fields,
        };
        assert_eq!(record.text_field("name"), Some("Sanjan B M"));
        assert_eq!(record.integer_field("year"), Some(2022));
        assert!(record.field("missing").is_none());
    }
}
