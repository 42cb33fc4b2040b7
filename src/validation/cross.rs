use log::debug;

use crate::models::{DocumentType, Metadata, StructuredRecord, ValidationReport};
use crate::utils::text::char_overlap_similarity;

/// Similarity floor below which two name spellings count as different
/// people rather than OCR noise.
const NAME_SIMILARITY_THRESHOLD: f64 = 0.8;
/// Gap between the 10th and 12th examinations that triggers a warning.
const MAX_PLAUSIBLE_YEAR_GAP: i64 = 5;
const ERROR_PENALTY: f64 = 0.3;
const WARNING_PENALTY: f64 = 0.1;

/// Checks identity-field consistency and chronological plausibility across
/// several records believed to belong to the same subject.
#[derive(Debug, Clone, Default)]
pub struct CrossValidator;

impl CrossValidator {
    pub fn new() -> Self {
        CrossValidator
    }

    pub fn cross_validate(&self, records: &[StructuredRecord]) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if records.len() < 2 {
            return ValidationReport {
                is_valid: true,
                errors,
                warnings: vec!["cross-validation requires at least 2 documents".to_string()],
                confidence: 1.0,
                metadata: Metadata::new(),
            };
        }

        self.check_name_consistency(records, "name", &mut errors);
        self.check_father_name_consistency(records, &mut warnings);
        self.check_birth_date_consistency(records, &mut errors);
        self.check_academic_progression(records, &mut errors, &mut warnings);

        let confidence = (1.0
            - ERROR_PENALTY * errors.len() as f64
            - WARNING_PENALTY * warnings.len() as f64)
            .clamp(0.0, 1.0);

        let mut metadata = Metadata::new();
        metadata.insert("documents_validated".into(), serde_json::json!(records.len()));

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            confidence,
            metadata,
        }
    }

    /// Names must agree across documents; spelling drift from OCR is
    /// tolerated up to the similarity threshold.
    fn check_name_consistency(
        &self,
        records: &[StructuredRecord],
        field: &str,
        errors: &mut Vec<String>,
    ) {
        let names: Vec<String> = records
            .iter()
            .filter_map(|r| r.text_field(field))
            .map(|n| n.to_lowercase().trim().to_string())
            .collect();
        if names.len() < 2 {
            return;
        }

        let mut distinct = names.clone();
        distinct.sort();
        distinct.dedup();
        if distinct.len() <= 1 {
            return;
        }

        let reference = &names[0];
        for name in &names[1..] {
            let similarity = char_overlap_similarity(reference, name);
            if similarity < NAME_SIMILARITY_THRESHOLD {
                errors.push(format!(
                    "name inconsistency across documents: {:?}",
                    names
                ));
                return;
            }
            debug!(
                "names {:?} and {:?} differ but are {:.2} similar, treating as OCR noise",
                reference, name, similarity
            );
        }
    }

    /// Father's name uses the same fuzzy check but only warns; it is absent
    /// from enough document types that a mismatch is weaker evidence.
    fn check_father_name_consistency(
        &self,
        records: &[StructuredRecord],
        warnings: &mut Vec<String>,
    ) {
        let names: Vec<String> = records
            .iter()
            .filter_map(|r| r.text_field("father_name"))
            .map(|n| n.to_lowercase().trim().to_string())
            .collect();
        if names.len() < 2 {
            return;
        }

        let reference = &names[0];
        for name in &names[1..] {
            if name != reference
                && char_overlap_similarity(reference, name) < NAME_SIMILARITY_THRESHOLD
            {
                warnings.push(format!(
                    "father's name differs across documents: {:?}",
                    names
                ));
                return;
            }
        }
    }

    /// Birth dates must match exactly; this field is recognition-exact and
    /// any disagreement is a hard error.
    fn check_birth_date_consistency(
        &self,
        records: &[StructuredRecord],
        errors: &mut Vec<String>,
    ) {
        let mut dobs: Vec<&str> = records
            .iter()
            .filter_map(|r| r.text_field("dob"))
            .collect();
        dobs.sort();
        dobs.dedup();
        if dobs.len() > 1 {
            errors.push(format!("date of birth inconsistency: {:?}", dobs));
        }
    }

    /// If both marksheet levels are present, the 12th examination year must
    /// be strictly after the 10th; an unusually long gap is only a warning.
    fn check_academic_progression(
        &self,
        records: &[StructuredRecord],
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        let year_10th = records
            .iter()
            .find(|r| r.document_type == DocumentType::Marksheet10th)
            .and_then(|r| r.integer_field("year"));
        let year_12th = records
            .iter()
            .find(|r| r.document_type == DocumentType::Marksheet12th)
            .and_then(|r| r.integer_field("year"));

        if let (Some(tenth), Some(twelfth)) = (year_10th, year_12th) {
            if twelfth <= tenth {
                errors.push(format!(
                    "12th examination year {} should be after 10th examination year {}",
                    twelfth, tenth
                ));
            } else if twelfth - tenth > MAX_PLAUSIBLE_YEAR_GAP {
                warnings.push(format!(
                    "unusual gap of {} years between 10th and 12th examinations",
                    twelfth - tenth
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityMap, FieldValue};

    fn record(document_type: DocumentType, name: &str, dob: &str, year: i64) -> StructuredRecord {
        let mut fields = EntityMap::new();
        fields.insert("name".into(), FieldValue::Text(name.into()));
        fields.insert("dob".into(), FieldValue::Text(dob.into()));
        fields.insert("year".into(), FieldValue::Integer(year));
        StructuredRecord {
            document_type,
            fields,
        }
    }

    #[test]
    fn test_single_record_is_valid_with_warning() {
        let report = CrossValidator::new().cross_validate(&[record(
            DocumentType::Marksheet10th,
            "Sanjan B M",
            "14-06-2004",
            2020,
        )]);
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_consistent_pair_with_two_year_gap_is_clean() {
        let report = CrossValidator::new().cross_validate(&[
            record(DocumentType::Marksheet10th, "Sanjan B M", "14-06-2004", 2020),
            record(DocumentType::Marksheet12th, "Sanjan B M", "14-06-2004", 2022),
        ]);
        assert!(report.is_valid);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
        assert!((report.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ocr_noise_in_name_is_tolerated() {
        let report = CrossValidator::new().cross_validate(&[
            record(DocumentType::Marksheet10th, "Rahul Sharma", "14-06-2004", 2020),
            record(DocumentType::Marksheet12th, "Rahul Sharha", "14-06-2004", 2022),
        ]);
        assert!(report.is_valid, "errors: {:?}", report.errors);
    }

    #[test]
    fn test_genuinely_different_names_fail() {
        let report = CrossValidator::new().cross_validate(&[
            record(DocumentType::Marksheet10th, "Rahul Sharma", "14-06-2004", 2020),
            record(DocumentType::Marksheet12th, "Priya Venkatesh", "14-06-2004", 2022),
        ]);
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("name inconsistency")));
    }

    #[test]
    fn test_birth_date_mismatch_is_a_hard_error() {
        let report = CrossValidator::new().cross_validate(&[
            record(DocumentType::Marksheet10th, "Sanjan B M", "14-06-2004", 2020),
            record(DocumentType::Marksheet12th, "Sanjan B M", "15-06-2004", 2022),
        ]);
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("date of birth")));
    }

    #[test]
    fn test_regressing_examination_year_fails() {
        let report = CrossValidator::new().cross_validate(&[
            record(DocumentType::Marksheet10th, "Sanjan B M", "14-06-2004", 2022),
            record(DocumentType::Marksheet12th, "Sanjan B M", "14-06-2004", 2022),
        ]);
        assert!(!report.is_valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("should be after")));
    }

    #[test]
    fn test_long_gap_is_a_warning_not_an_error() {
        let report = CrossValidator::new().cross_validate(&[
            record(DocumentType::Marksheet10th, "Sanjan B M", "14-06-2004", 2012),
            record(DocumentType::Marksheet12th, "Sanjan B M", "14-06-2004", 2020),
        ]);
        assert!(report.is_valid);
        assert!(report.warnings.iter().any(|w| w.contains("gap")));
    }

    #[test]
    fn test_confidence_drops_with_findings() {
        let clean = CrossValidator::new().cross_validate(&[
            record(DocumentType::Marksheet10th, "Sanjan B M", "14-06-2004", 2020),
            record(DocumentType::Marksheet12th, "Sanjan B M", "14-06-2004", 2022),
        ]);
        let broken = CrossValidator::new().cross_validate(&[
            record(DocumentType::Marksheet10th, "Rahul Sharma", "14-06-2004", 2022),
            record(DocumentType::Marksheet12th, "Priya Venkatesh", "15-06-2004", 2020),
        ]);
        assert!(broken.confidence < clean.confidence);
    }
}
