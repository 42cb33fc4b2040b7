use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Utc};
use log::warn;
use regex::Regex;

use crate::models::{DocumentType, FieldValue, Metadata, StructuredRecord, ValidationReport};

/// Penalty per blocking error in the validation confidence.
const ERROR_PENALTY: f64 = 0.2;
/// Penalty per warning.
const WARNING_PENALTY: f64 = 0.1;
/// Maximum bonus for optional-field coverage.
const OPTIONAL_BONUS: f64 = 0.2;

/// Expected value class for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Number,
    Map,
}

/// Declarative constraint set for one field.
#[derive(Debug)]
pub struct FieldRule {
    pub kind: FieldKind,
    pub pattern: Option<Regex>,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub allowed: Option<&'static [&'static str]>,
}

impl FieldRule {
    fn text(pattern: Option<&str>, min_len: Option<usize>, max_len: Option<usize>) -> Self {
        FieldRule {
            kind: FieldKind::Text,
            pattern: pattern.and_then(compile),
            min_len,
            max_len,
            min_value: None,
            max_value: None,
            allowed: None,
        }
    }

    fn text_enum(allowed: &'static [&'static str]) -> Self {
        FieldRule {
            kind: FieldKind::Text,
            pattern: None,
            min_len: None,
            max_len: None,
            min_value: None,
            max_value: None,
            allowed: Some(allowed),
        }
    }

    fn integer(min_value: Option<f64>, max_value: Option<f64>) -> Self {
        FieldRule {
            kind: FieldKind::Integer,
            pattern: None,
            min_len: None,
            max_len: None,
            min_value,
            max_value,
            allowed: None,
        }
    }

    fn number(min_value: Option<f64>, max_value: Option<f64>) -> Self {
        FieldRule {
            kind: FieldKind::Number,
            pattern: None,
            min_len: None,
            max_len: None,
            min_value,
            max_value,
            allowed: None,
        }
    }

    fn map() -> Self {
        FieldRule {
            kind: FieldKind::Map,
            pattern: None,
            min_len: None,
            max_len: None,
            min_value: None,
            max_value: None,
            allowed: None,
        }
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("skipping invalid schema pattern {:?}: {}", pattern, e);
            None
        }
    }
}

/// Declarative schema for one document type.
#[derive(Debug)]
pub struct DocumentSchema {
    pub name: &'static str,
    pub required: &'static [&'static str],
    pub fields: HashMap<&'static str, FieldRule>,
}

fn name_rule() -> FieldRule {
    FieldRule::text(Some(r"^[A-Za-z .]+$"), Some(3), Some(100))
}

fn marksheet_fields(current_year: f64) -> HashMap<&'static str, FieldRule> {
    let mut fields = HashMap::new();
    fields.insert("name", name_rule());
    fields.insert("roll_number", FieldRule::text(Some(r"^[A-Z0-9]{6,15}$"), None, None));
    fields.insert("board", FieldRule::text(None, Some(3), Some(80)));
    fields.insert("year", FieldRule::integer(Some(1990.0), Some(current_year)));
    fields.insert("subjects", FieldRule::map());
    fields.insert("school_name", FieldRule::text(None, None, Some(200)));
    fields.insert("dob", FieldRule::text(Some(r"^\d{1,2}[-/]\d{1,2}[-/]\d{4}$"), None, None));
    fields.insert("father_name", FieldRule::text(Some(r"^[A-Za-z .]+$"), None, Some(100)));
    fields.insert("mother_name", FieldRule::text(Some(r"^[A-Za-z .]+$"), None, Some(100)));
    fields.insert("percentage", FieldRule::number(Some(0.0), Some(100.0)));
    fields
}

/// Validates structured records against per-type schemas plus semantic
/// rules that plain field constraints cannot express. Validation never
/// fails as an operation; problems surface as errors and warnings in the
/// report.
pub struct SchemaValidator {
    schemas: HashMap<DocumentType, DocumentSchema>,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        let current_year = Utc::now().year() as f64;
        let mut schemas = HashMap::new();

        schemas.insert(
            DocumentType::Marksheet10th,
            DocumentSchema {
                name: "marksheet_10th",
                required: &["name", "roll_number", "board", "year", "subjects"],
                fields: marksheet_fields(current_year),
            },
        );

        let mut fields = marksheet_fields(current_year);
        fields.insert(
            "stream",
            FieldRule::text_enum(&["Science", "Commerce", "Arts", "Humanities"]),
        );
        schemas.insert(
            DocumentType::Marksheet12th,
            DocumentSchema {
                name: "marksheet_12th",
                required: &["name", "roll_number", "board", "year", "subjects", "stream"],
                fields,
            },
        );

        let mut fields = HashMap::new();
        fields.insert("name", name_rule());
        fields.insert("roll_number", FieldRule::text(Some(r"^[A-Z0-9]{6,15}$"), None, None));
        fields.insert(
            "exam_name",
            FieldRule::text_enum(&[
                "JEE MAIN",
                "JEE ADVANCED",
                "NEET",
                "CAT",
                "GATE",
                "JOINT ENTRANCE EXAMINATION",
            ]),
        );
        fields.insert("rank", FieldRule::integer(Some(1.0), Some(10_000_000.0)));
        fields.insert("category_rank", FieldRule::integer(Some(1.0), None));
        fields.insert("score", FieldRule::integer(Some(0.0), None));
        fields.insert("percentile", FieldRule::number(Some(0.0), Some(100.0)));
        fields.insert(
            "category",
            FieldRule::text_enum(&["General", "Sc", "St", "Obc", "Ews"]),
        );
        schemas.insert(
            DocumentType::EntranceScorecard,
            DocumentSchema {
                name: "entrance_scorecard",
                required: &["name", "roll_number", "exam_name", "rank", "score"],
                fields,
            },
        );

        let mut fields = HashMap::new();
        fields.insert("name", name_rule());
        fields.insert("roll_number", FieldRule::text(Some(r"^[A-Z0-9]{6,15}$"), None, None));
        fields.insert("exam_name", FieldRule::text(None, Some(3), Some(60)));
        fields.insert(
            "exam_date",
            FieldRule::text(Some(r"^\d{1,2}[-/]\d{1,2}[-/]\d{4}$"), None, None),
        );
        fields.insert("venue", FieldRule::text(None, None, Some(120)));
        schemas.insert(
            DocumentType::EntranceAdmitCard,
            DocumentSchema {
                name: "entrance_admit_card",
                required: &["name", "roll_number", "exam_name"],
                fields,
            },
        );

        let mut fields = HashMap::new();
        fields.insert("name", name_rule());
        fields.insert(
            "category",
            FieldRule::text_enum(&[
                "Sc",
                "St",
                "Obc",
                "Ews",
                "General",
                "Scheduled Caste",
                "Scheduled Tribe",
                "Other Backward",
            ]),
        );
        fields.insert("caste", FieldRule::text(None, Some(2), Some(100)));
        fields.insert("issuing_authority", FieldRule::text(None, Some(4), Some(200)));
        fields.insert(
            "certificate_number",
            FieldRule::text(Some(r"^[A-Z0-9/\-]+$"), None, None),
        );
        fields.insert("father_name", FieldRule::text(Some(r"^[A-Za-z .]+$"), None, Some(100)));
        schemas.insert(
            DocumentType::CasteCertificate,
            DocumentSchema {
                name: "caste_certificate",
                required: &["name", "category", "caste", "issuing_authority"],
                fields,
            },
        );

        let mut fields = HashMap::new();
        fields.insert("name", name_rule());
        fields.insert("state", FieldRule::text(None, Some(3), Some(60)));
        fields.insert("district", FieldRule::text(None, None, Some(60)));
        fields.insert(
            "certificate_number",
            FieldRule::text(Some(r"^[A-Z0-9/\-]+$"), None, None),
        );
        schemas.insert(
            DocumentType::DomicileCertificate,
            DocumentSchema {
                name: "domicile_certificate",
                required: &["name", "state"],
                fields,
            },
        );

        let mut fields = HashMap::new();
        fields.insert("name", name_rule());
        fields.insert("institution", FieldRule::text(None, Some(4), Some(120)));
        fields.insert("conduct", FieldRule::text(None, None, Some(40)));
        schemas.insert(
            DocumentType::TransferCertificate,
            DocumentSchema {
                name: "transfer_certificate",
                required: &["name", "institution"],
                fields,
            },
        );

        let mut fields = HashMap::new();
        fields.insert("name", name_rule());
        fields.insert("university", FieldRule::text(None, Some(4), Some(120)));
        fields.insert("college", FieldRule::text(None, None, Some(120)));
        fields.insert("year", FieldRule::integer(Some(1990.0), Some(current_year)));
        schemas.insert(
            DocumentType::MigrationCertificate,
            DocumentSchema {
                name: "migration_certificate",
                required: &["name", "university"],
                fields,
            },
        );

        let mut fields = HashMap::new();
        fields.insert("name", name_rule());
        fields.insert("year", FieldRule::integer(Some(1990.0), Some(current_year)));
        fields.insert("board", FieldRule::text(None, None, Some(80)));
        schemas.insert(
            DocumentType::PassingCertificate,
            DocumentSchema {
                name: "passing_certificate",
                required: &["name", "year"],
                fields,
            },
        );

        let mut fields = HashMap::new();
        fields.insert("name", name_rule());
        fields.insert(
            "aadhaar_number",
            FieldRule::text(Some(r"^[\d\s\-]+$"), None, None),
        );
        fields.insert("dob", FieldRule::text(Some(r"^\d{1,2}[-/]\d{1,2}[-/]\d{4}$"), None, None));
        fields.insert("gender", FieldRule::text_enum(&["Male", "Female", "Other"]));
        fields.insert("father_name", FieldRule::text(Some(r"^[A-Za-z .]+$"), None, Some(100)));
        schemas.insert(
            DocumentType::AadhaarCard,
            DocumentSchema {
                name: "aadhaar_card",
                required: &["name", "aadhaar_number", "dob"],
                fields,
            },
        );

        // Passport photos have no textual content to validate
        schemas.insert(
            DocumentType::PassportPhoto,
            DocumentSchema {
                name: "passport_photo",
                required: &[],
                fields: HashMap::new(),
            },
        );

        let mut fields = HashMap::new();
        fields.insert("name", name_rule());
        schemas.insert(
            DocumentType::Other,
            DocumentSchema {
                name: "generic_document",
                required: &[],
                fields,
            },
        );

        SchemaValidator { schemas }
    }

    /// Validate a structured record against its type's schema and the
    /// semantic rules.
    pub fn validate(&self, record: &StructuredRecord) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let schema = match self.schemas.get(&record.document_type) {
            Some(schema) => schema,
            None => {
                return ValidationReport {
                    is_valid: false,
                    errors: vec![format!(
                        "no schema available for document type '{}'",
                        record.document_type
                    )],
                    warnings,
                    confidence: 0.0,
                    metadata: Metadata::new(),
                };
            }
        };

        // Layer 1: mechanical schema checks. Missing required fields and
        // wrong types block; other constraint violations only warn.
        for required in schema.required {
            if !record.fields.contains_key(*required) {
                errors.push(format!("required field '{}' is missing", required));
            }
        }

        for (field_name, value) in &record.fields {
            let rule = match schema.fields.get(field_name.as_str()) {
                Some(rule) => rule,
                None => continue,
            };

            if !kind_matches(rule.kind, value) {
                errors.push(format!(
                    "field '{}' has type {} but the schema expects {:?}",
                    field_name,
                    value.type_name(),
                    rule.kind
                ));
                continue;
            }

            check_constraints(field_name, value, rule, &mut warnings);
        }

        // Layer 2: semantic checks
        self.semantic_checks(record, &mut errors, &mut warnings);

        let confidence = self.confidence(record, schema, errors.len(), warnings.len());

        let mut metadata = Metadata::new();
        metadata.insert("schema_used".into(), serde_json::json!(schema.name));
        metadata.insert("total_fields".into(), serde_json::json!(record.fields.len()));
        metadata.insert(
            "validated_at".into(),
            serde_json::json!(Utc::now().to_rfc3339()),
        );

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            confidence,
            metadata,
        }
    }

    fn semantic_checks(
        &self,
        record: &StructuredRecord,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        let today = Utc::now().date_naive();

        // Birth-date plausibility
        if let Some(dob_text) = record.text_field("dob") {
            match parse_flexible_date(dob_text) {
                Some(dob) => {
                    if dob > today {
                        errors.push("date of birth cannot be in the future".to_string());
                    } else {
                        let age = age_in_years(dob, today);
                        if age < 5 {
                            errors.push("date of birth indicates age less than 5 years".to_string());
                        } else if age > 100 {
                            errors.push(
                                "date of birth indicates age greater than 100 years".to_string(),
                            );
                        }
                    }
                }
                None => errors.push("invalid date format for date of birth".to_string()),
            }
        }

        // Academic-year plausibility
        if record.document_type.is_marksheet() {
            if let Some(year) = record.integer_field("year") {
                let current_year = today.year() as i64;
                if year > current_year {
                    errors.push("academic year cannot be in the future".to_string());
                } else if year < current_year - 10 {
                    warnings.push("academic year is more than 10 years old".to_string());
                }
            }
        }

        // Subject-marks sanity
        if let Some(subjects) = record.field("subjects").and_then(|v| v.as_map()) {
            if subjects.is_empty() {
                errors.push("no subject marks found".to_string());
            }
            for (subject, marks) in subjects {
                match marks.as_f64() {
                    Some(value) if (0.0..=100.0).contains(&value) => {}
                    Some(value) => errors.push(format!(
                        "marks for '{}' out of valid range: {}",
                        subject, value
                    )),
                    None => errors.push(format!(
                        "invalid marks for subject '{}': {:?}",
                        subject, marks
                    )),
                }
                if subject.trim().len() < 3 {
                    warnings.push(format!("subject name too short: '{}'", subject));
                }
            }
        }

        // Rank consistency on scorecards
        if record.document_type == DocumentType::EntranceScorecard {
            if let (Some(rank), Some(category_rank)) = (
                record.integer_field("rank"),
                record.integer_field("category_rank"),
            ) {
                if category_rank > rank {
                    errors.push(
                        "category rank cannot be higher than overall rank".to_string(),
                    );
                }
            }
        }

        // National-ID format: exactly 12 digits once separators are removed
        if let Some(aadhaar) = record.text_field("aadhaar_number") {
            let digits: String = aadhaar
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect();
            if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_digit()) {
                errors.push(format!(
                    "aadhaar number must contain exactly 12 digits, found {}",
                    digits.chars().filter(|c| c.is_ascii_digit()).count()
                ));
            }
        }
    }

    /// Required-field coverage minus error/warning penalties plus a small
    /// optional-coverage bonus, clamped to [0, 1].
    fn confidence(
        &self,
        record: &StructuredRecord,
        schema: &DocumentSchema,
        error_count: usize,
        warning_count: usize,
    ) -> f64 {
        let required_coverage = if schema.required.is_empty() {
            1.0
        } else {
            let present = schema
                .required
                .iter()
                .filter(|f| record.fields.contains_key(**f))
                .count() as f64;
            present / schema.required.len() as f64
        };

        let optional_fields: Vec<&str> = schema
            .fields
            .keys()
            .copied()
            .filter(|f| !schema.required.contains(f))
            .collect();
        let optional_coverage = if optional_fields.is_empty() {
            0.0
        } else {
            let present = optional_fields
                .iter()
                .filter(|f| record.fields.contains_key(**f))
                .count() as f64;
            present / optional_fields.len() as f64
        };

        let confidence = required_coverage - ERROR_PENALTY * error_count as f64
            - WARNING_PENALTY * warning_count as f64
            + OPTIONAL_BONUS * optional_coverage;
        confidence.clamp(0.0, 1.0)
    }
}

fn kind_matches(kind: FieldKind, value: &FieldValue) -> bool {
    match kind {
        FieldKind::Text => matches!(value, FieldValue::Text(_)),
        FieldKind::Integer => matches!(value, FieldValue::Integer(_)),
        FieldKind::Number => matches!(value, FieldValue::Integer(_) | FieldValue::Number(_)),
        FieldKind::Map => matches!(value, FieldValue::Map(_)),
    }
}

fn check_constraints(
    field_name: &str,
    value: &FieldValue,
    rule: &FieldRule,
    warnings: &mut Vec<String>,
) {
    match value {
        FieldValue::Text(text) => {
            if let Some(min) = rule.min_len {
                if text.len() < min {
                    warnings.push(format!("field '{}' is shorter than {} characters", field_name, min));
                }
            }
            if let Some(max) = rule.max_len {
                if text.len() > max {
                    warnings.push(format!("field '{}' is longer than {} characters", field_name, max));
                }
            }
            if let Some(pattern) = &rule.pattern {
                if !pattern.is_match(text) {
                    warnings.push(format!("field '{}' does not match the expected format", field_name));
                }
            }
            if let Some(allowed) = rule.allowed {
                if !allowed.iter().any(|a| a.eq_ignore_ascii_case(text)) {
                    warnings.push(format!(
                        "field '{}' has unrecognized value '{}'",
                        field_name, text
                    ));
                }
            }
        }
        FieldValue::Integer(_) | FieldValue::Number(_) => {
            if let Some(numeric) = value.as_f64() {
                if let Some(min) = rule.min_value {
                    if numeric < min {
                        warnings.push(format!("field '{}' is below the minimum {}", field_name, min));
                    }
                }
                if let Some(max) = rule.max_value {
                    if numeric > max {
                        warnings.push(format!("field '{}' is above the maximum {}", field_name, max));
                    }
                }
            }
        }
        FieldValue::Map(_) => {}
    }
}

/// Parse dates in the formats these documents actually carry.
pub fn parse_flexible_date(text: &str) -> Option<NaiveDate> {
    for format in ["%d-%m-%Y", "%d/%m/%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text.trim(), format) {
            return Some(date);
        }
    }
    None
}

fn age_in_years(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityMap;

    fn marksheet_record() -> StructuredRecord {
        let mut subjects = EntityMap::new();
        subjects.insert("Physics".into(), FieldValue::Integer(87));
        subjects.insert("Chemistry".into(), FieldValue::Integer(82));
        subjects.insert("Mathematics".into(), FieldValue::Integer(95));

        let mut fields = EntityMap::new();
        fields.insert("name".into(), FieldValue::Text("Sanjan B M".into()));
        fields.insert("roll_number".into(), FieldValue::Text("456123".into()));
        fields.insert("board".into(), FieldValue::Text("KARNATAKA PUC BOARD".into()));
        fields.insert("year".into(), FieldValue::Integer(2022));
        fields.insert("subjects".into(), FieldValue::Map(subjects));
        fields.insert("stream".into(), FieldValue::Text("Science".into()));

        StructuredRecord {
            document_type: DocumentType::Marksheet12th,
            fields,
        }
    }

    #[test]
    fn test_complete_marksheet_is_valid() {
        let report = SchemaValidator::new().validate(&marksheet_record());
        assert!(report.is_valid, "errors: {:?}", report.errors);
        assert!(report.confidence > 0.7);
    }

    #[test]
    fn test_missing_required_field_names_the_field() {
        let mut record = marksheet_record();
        record.fields.remove("roll_number");
        let report = SchemaValidator::new().validate(&record);

        assert!(!report.is_valid);
        assert!(
            report.errors.iter().any(|e| e.contains("roll_number")),
            "errors: {:?}",
            report.errors
        );
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        let mut record = marksheet_record();
        record
            .fields
            .insert("year".into(), FieldValue::Text("twenty twenty two".into()));
        let report = SchemaValidator::new().validate(&record);
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("year")));
    }

    #[test]
    fn test_future_year_is_an_error_and_old_year_warns() {
        let mut record = marksheet_record();
        let current_year = Utc::now().year() as i64;
        record
            .fields
            .insert("year".into(), FieldValue::Integer(current_year + 1));
        let report = SchemaValidator::new().validate(&record);
        assert!(report.errors.iter().any(|e| e.contains("future")));

        let mut record = marksheet_record();
        record
            .fields
            .insert("year".into(), FieldValue::Integer(current_year - 15));
        let report = SchemaValidator::new().validate(&record);
        assert!(report.warnings.iter().any(|w| w.contains("10 years")));
    }

    #[test]
    fn test_birth_date_plausibility() {
        let mut record = marksheet_record();
        record.fields.insert("dob".into(), FieldValue::Text("01-01-1900".into()));
        let report = SchemaValidator::new().validate(&record);
        assert!(report.errors.iter().any(|e| e.contains("100 years")));

        let mut record = marksheet_record();
        let next_year = Utc::now().year() + 1;
        record
            .fields
            .insert("dob".into(), FieldValue::Text(format!("01-01-{}", next_year)));
        let report = SchemaValidator::new().validate(&record);
        assert!(report.errors.iter().any(|e| e.contains("future")));
    }

    #[test]
    fn test_subject_marks_out_of_range() {
        let mut record = marksheet_record();
        let mut subjects = EntityMap::new();
        subjects.insert("Physics".into(), FieldValue::Integer(187));
        record.fields.insert("subjects".into(), FieldValue::Map(subjects));

        let report = SchemaValidator::new().validate(&record);
        assert!(report.errors.iter().any(|e| e.contains("Physics")));
    }

    #[test]
    fn test_category_rank_cannot_beat_overall_rank() {
        let mut fields = EntityMap::new();
        fields.insert("name".into(), FieldValue::Text("Anita R".into()));
        fields.insert("roll_number".into(), FieldValue::Text("AB123456".into()));
        fields.insert("exam_name".into(), FieldValue::Text("JEE MAIN".into()));
        fields.insert("rank".into(), FieldValue::Integer(100));
        fields.insert("category_rank".into(), FieldValue::Integer(250));
        fields.insert("score".into(), FieldValue::Integer(245));

        let report = SchemaValidator::new().validate(&StructuredRecord {
            document_type: DocumentType::EntranceScorecard,
            fields,
        });
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("category rank")));
    }

    fn aadhaar_record(number: &str) -> StructuredRecord {
        let mut fields = EntityMap::new();
        fields.insert("name".into(), FieldValue::Text("Ramesh Chandra".into()));
        fields.insert("aadhaar_number".into(), FieldValue::Text(number.into()));
        fields.insert("dob".into(), FieldValue::Text("12/03/2001".into()));
        StructuredRecord {
            document_type: DocumentType::AadhaarCard,
            fields,
        }
    }

    #[test]
    fn test_aadhaar_number_normalizes_and_validates() {
        let report = SchemaValidator::new().validate(&aadhaar_record("1234 5678 9012"));
        assert!(report.is_valid, "errors: {:?}", report.errors);
    }

    #[test]
    fn test_short_aadhaar_number_fails_with_digit_count() {
        let report = SchemaValidator::new().validate(&aadhaar_record("123456789"));
        assert!(!report.is_valid);
        assert!(
            report.errors.iter().any(|e| e.contains("12 digits") && e.contains("9")),
            "errors: {:?}",
            report.errors
        );
    }

    #[test]
    fn test_confidence_penalized_by_errors() {
        let validator = SchemaValidator::new();
        let complete = validator.validate(&marksheet_record());

        let mut record = marksheet_record();
        record.fields.remove("roll_number");
        record.fields.remove("subjects");
        let broken = validator.validate(&record);

        assert!(broken.confidence < complete.confidence);
    }
}
