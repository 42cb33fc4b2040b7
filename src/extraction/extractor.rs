use std::collections::BTreeMap;

use chrono::{Datelike, Utc};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::extraction::ner::{EntityLabel, EntityRecognizer, HeuristicRecognizer, NamedEntity};
use crate::extraction::templates::{ExtractionTemplate, TemplateSet};
use crate::models::{DocumentType, EntityMap, EntityResult, FieldValue, Metadata};
use crate::utils::text::clean_name;

/// Weight of required-field coverage in the extraction confidence.
const REQUIRED_COVERAGE_WEIGHT: f64 = 0.8;
/// Weight of optional-field coverage.
const OPTIONAL_COVERAGE_WEIGHT: f64 = 0.2;
/// Texts shorter than this usually mean the OCR stage failed silently.
const SHORT_TEXT_THRESHOLD: usize = 100;
const SHORT_TEXT_DISCOUNT: f64 = 0.7;

lazy_static! {
    /// Frequent OCR misreads in these document batches, fixed before the
    /// regex pass runs a second attempt on the cleaned text.
    static ref OCR_CORRECTIONS: Vec<(Regex, &'static str)> = {
        let table: &[(&str, &str)] = &[
            (r"(?i)\bEducejio\b", "Education"),
            (r"(?i)\bEducatio\b", "Education"),
            (r"(?i)\bEducafion\b", "Education"),
            (r"(?i)\bGovemment\b", "Government"),
            (r"(?i)\bGovemrnent\b", "Government"),
            (r"(?i)\bDepartrnent\b", "Department"),
            (r"(?i)\bDepariment\b", "Department"),
            (r"(?i)\bKarnateka\b", "Karnataka"),
            (r"(?i)\bKamataka\b", "Karnataka"),
            (r"(?i)\bReglster\b", "Register"),
            (r"(?i)\bCandldate\b", "Candidate"),
            (r"(?i)\bCendldate\b", "Candidate"),
            (r"(?i)\bStudenl\b", "Student"),
            (r"(?i)\bSiudent\b", "Student"),
            (r"(?i)\bFathe1\b", "Father"),
            (r"(?i)\bMothe1\b", "Mother"),
            (r"(?i)\bMa1ks\b", "Marks"),
            (r"(?i)\bMalks\b", "Marks"),
            (r"(?i)\bSubjecl\b", "Subject"),
            (r"(?i)\bSubjecis\b", "Subjects"),
        ];
        table
            .iter()
            .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
                Ok(re) => Some((re, *replacement)),
                Err(e) => {
                    warn!("skipping invalid correction pattern {:?}: {}", pattern, e);
                    None
                }
            })
            .collect()
    };
    static ref GENERIC_SUBJECT_ROW: Regex =
        Regex::new(r"(?m)^\s*([A-Z][A-Za-z ]{3,25}?)\s*[:\-. ]\s*(\d{1,3})\s*$")
            .expect("static pattern");
    static ref SCORE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)total\s*score\s*:?\s*(\d{1,4})").expect("static pattern"),
        Regex::new(r"(?i)\bscore\s*:?\s*(\d{1,4})").expect("static pattern"),
        Regex::new(r"(?i)marks\s*obtained\s*:?\s*(\d{1,4})").expect("static pattern"),
    ];
    static ref AUTHORITY_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)issued\s*by\s*:?\s*([A-Za-z][A-Za-z ,.]{3,60})").expect("static pattern"),
        Regex::new(r"(?i)authority\s*:?\s*([A-Za-z][A-Za-z ,.]{3,60})").expect("static pattern"),
        Regex::new(r"(?i)government\s*of\s*([A-Za-z][A-Za-z ]{2,40})").expect("static pattern"),
    ];
    static ref NAME_LABEL_LINE: Regex =
        Regex::new(r"(?i)name\s*[:\}]\s*([A-Za-z][A-Za-z .]{2,40})").expect("static pattern");
    static ref NAME_SHAPE: Regex = Regex::new(r"^[A-Za-z .]+$").expect("static pattern");
    static ref ROLL_FALLBACK: Regex = Regex::new(r"\b(\d{6,8})\b").expect("static pattern");
}

/// Lightweight shape rule for a candidate field value. Values that fail are
/// dropped silently; user-facing errors belong to schema validation.
#[derive(Debug)]
struct FieldShape {
    pattern: Option<Regex>,
    min_len: Option<usize>,
    max_len: Option<usize>,
    min_value: Option<f64>,
    max_value: Option<f64>,
}

fn shape(
    pattern: Option<&str>,
    min_len: Option<usize>,
    max_len: Option<usize>,
    min_value: Option<f64>,
    max_value: Option<f64>,
) -> FieldShape {
    FieldShape {
        pattern: pattern.and_then(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("skipping invalid shape pattern {:?}: {}", p, e);
                None
            }
        }),
        min_len,
        max_len,
        min_value,
        max_value,
    }
}

fn shape_rules() -> BTreeMap<&'static str, FieldShape> {
    let current_year = Utc::now().year() as f64;
    let mut rules = BTreeMap::new();
    rules.insert("name", shape(Some(r"^[A-Za-z .]+$"), Some(3), Some(50), None, None));
    rules.insert("father_name", shape(Some(r"^[A-Za-z .]+$"), Some(3), Some(50), None, None));
    rules.insert("mother_name", shape(Some(r"^[A-Za-z .]+$"), Some(3), Some(50), None, None));
    rules.insert("roll_number", shape(Some(r"^[A-Z0-9]{6,15}$"), Some(6), Some(15), None, None));
    rules.insert("year", shape(None, None, None, Some(1990.0), Some(current_year)));
    rules.insert("dob", shape(Some(r"^\d{1,2}[-/]\d{1,2}[-/]\d{4}$"), None, None, None, None));
    rules.insert(
        "aadhaar_number",
        shape(Some(r"^\d{4}\s*\d{4}\s*\d{4}$"), None, None, None, None),
    );
    rules.insert("percentage", shape(None, None, None, Some(0.0), Some(100.0)));
    rules.insert("percentile", shape(None, None, None, Some(0.0), Some(100.0)));
    rules.insert("rank", shape(None, None, None, Some(1.0), Some(10_000_000.0)));
    rules.insert("category_rank", shape(None, None, None, Some(1.0), Some(10_000_000.0)));
    rules.insert("score", shape(None, None, None, Some(0.0), None));
    rules
}

/// Extracts a structured entity map from OCR text using three complementary
/// passes: template regexes, named-entity recognition and type-specific
/// heuristics. Pattern matches win because they are schema-aware; NER only
/// fills fields the patterns left empty.
pub struct EntityExtractor {
    templates: TemplateSet,
    shapes: BTreeMap<&'static str, FieldShape>,
    recognizer: Box<dyn EntityRecognizer>,
}

impl EntityExtractor {
    pub fn new(templates: TemplateSet) -> Self {
        EntityExtractor {
            templates,
            shapes: shape_rules(),
            recognizer: Box::new(HeuristicRecognizer),
        }
    }

    pub fn with_recognizer(mut self, recognizer: Box<dyn EntityRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    /// Run the full extraction for one document. Deterministic: the same
    /// text and type always produce the same result.
    pub fn extract(
        &self,
        text: &str,
        document_type: DocumentType,
        context: Option<&BTreeMap<String, String>>,
    ) -> EntityResult {
        let template = match self.templates.template(document_type) {
            Some(t) => t,
            None => {
                debug!("no extraction template for {}", document_type);
                let mut metadata = Metadata::new();
                metadata.insert("status".into(), serde_json::json!("unsupported_document_type"));
                return EntityResult {
                    entities: EntityMap::new(),
                    confidence: 0.0,
                    extraction_method: "none".to_string(),
                    metadata,
                };
            }
        };

        let cleaned = clean_ocr_text(text);
        let mut entities = EntityMap::new();

        // Pass 1: template regexes against both the raw and the cleaned text
        self.regex_pass(text, &cleaned, template, &mut entities);

        // Pass 2: named entities fill whatever the patterns missed
        self.ner_pass(text, template, &mut entities);

        // Pass 3: type-specific heuristics for fields regex and NER cannot
        // reliably isolate
        self.heuristic_pass(text, template, &mut entities);

        let dropped = self.enforce_shapes(&mut entities);
        let confidence = self.confidence(&entities, text, template);

        let mut metadata = Metadata::new();
        metadata.insert("template_used".into(), serde_json::json!(template.name));
        metadata.insert("text_length".into(), serde_json::json!(text.len()));
        metadata.insert("dropped_fields".into(), serde_json::json!(dropped));
        metadata.insert(
            "extraction_methods".into(),
            serde_json::json!(["regex", "ner", "template"]),
        );
        if let Some(context) = context {
            if !context.is_empty() {
                metadata.insert("context_keys".into(), serde_json::json!(context.keys().collect::<Vec<_>>()));
            }
        }

        EntityResult {
            entities,
            confidence,
            extraction_method: "hybrid".to_string(),
            metadata,
        }
    }

    fn regex_pass(
        &self,
        text: &str,
        cleaned: &str,
        template: &ExtractionTemplate,
        entities: &mut EntityMap,
    ) {
        for field_pattern in &template.field_patterns {
            'patterns: for pattern in &field_pattern.patterns {
                for variant in [text, cleaned] {
                    if let Some(captures) = pattern.captures(variant) {
                        if let Some(m) = captures.get(1) {
                            if let Some(value) = normalize_field(field_pattern.field, m.as_str()) {
                                entities.insert(field_pattern.field.to_string(), value);
                                break 'patterns;
                            }
                        }
                    }
                }
            }
        }

        if template.required_fields.contains(&"subjects") {
            let subjects = self.collect_subjects(text, cleaned, template);
            if !subjects.is_empty() {
                entities.insert("subjects".to_string(), FieldValue::Map(subjects));
            }
        }

        // Fallback routes for fields the labelled patterns often miss
        if template.required_fields.contains(&"name") && !entities.contains_key("name") {
            if let Some(name) = name_fallback(text) {
                entities.insert("name".to_string(), FieldValue::Text(name));
            }
        }
        if template.required_fields.contains(&"roll_number")
            && !entities.contains_key("roll_number")
        {
            if let Some(roll) = roll_number_fallback(text) {
                entities.insert("roll_number".to_string(), FieldValue::Text(roll));
            }
        }
    }

    fn collect_subjects(
        &self,
        text: &str,
        cleaned: &str,
        template: &ExtractionTemplate,
    ) -> BTreeMap<String, FieldValue> {
        let mut subjects = BTreeMap::new();
        for pattern in &template.subject_patterns {
            for variant in [text, cleaned] {
                for captures in pattern.captures_iter(variant) {
                    let (name, marks) = match (captures.get(1), captures.get(2)) {
                        (Some(n), Some(m)) => (n, m),
                        _ => continue,
                    };
                    if let Ok(score) = marks.as_str().trim().parse::<i64>() {
                        if (0..=100).contains(&score) {
                            subjects
                                .entry(normalize_subject(name.as_str()))
                                .or_insert(FieldValue::Integer(score));
                        }
                    }
                }
            }
        }

        if subjects.is_empty() {
            // Tabular lines like "PHYSICS  87" without a known subject word
            for captures in GENERIC_SUBJECT_ROW.captures_iter(text) {
                let (name, marks) = match (captures.get(1), captures.get(2)) {
                    (Some(n), Some(m)) => (n, m),
                    _ => continue,
                };
                if let Ok(score) = marks.as_str().trim().parse::<i64>() {
                    if (0..=100).contains(&score) && name.as_str().trim().len() >= 4 {
                        subjects
                            .entry(normalize_subject(name.as_str()))
                            .or_insert(FieldValue::Integer(score));
                    }
                }
            }
        }
        subjects
    }

    fn ner_pass(&self, text: &str, template: &ExtractionTemplate, entities: &mut EntityMap) {
        let recognized = self.recognizer.recognize(text);

        if template.required_fields.contains(&"name") && !entities.contains_key("name") {
            if let Some(best) = best_person(&recognized) {
                if let Some(name) = clean_name(&best.text) {
                    entities.insert("name".to_string(), FieldValue::Text(name));
                }
            }
        }

        let wants_year = template.required_fields.contains(&"year")
            || template.optional_fields.contains(&"year");
        if wants_year && !entities.contains_key("year") {
            if let Some(entity) = recognized.iter().find(|e| e.label == EntityLabel::Year) {
                if let Ok(year) = entity.text.parse::<i64>() {
                    entities.insert("year".to_string(), FieldValue::Integer(year));
                }
            }
        }

        let wants_dob = template.required_fields.contains(&"dob")
            || template.optional_fields.contains(&"dob");
        if wants_dob && !entities.contains_key("dob") {
            let lower = text.to_lowercase();
            if lower.contains("birth") || lower.contains("born") || lower.contains("dob") {
                if let Some(entity) = recognized.iter().find(|e| e.label == EntityLabel::Date) {
                    entities.insert("dob".to_string(), FieldValue::Text(entity.text.clone()));
                }
            }
        }

        for entity in recognized.iter().filter(|e| e.label == EntityLabel::Organization) {
            let lower = entity.text.to_lowercase();
            if !entities.contains_key("board")
                && (lower.contains("board") || lower.contains("cbse") || lower.contains("icse"))
                && (template.required_fields.contains(&"board")
                    || template.optional_fields.contains(&"board"))
            {
                entities.insert("board".to_string(), FieldValue::Text(entity.text.clone()));
            } else if !entities.contains_key("school_name")
                && (lower.contains("school") || lower.contains("college"))
                && (template.required_fields.contains(&"school_name")
                    || template.optional_fields.contains(&"school_name"))
            {
                entities.insert(
                    "school_name".to_string(),
                    FieldValue::Text(entity.text.clone()),
                );
            }
        }
    }

    fn heuristic_pass(&self, text: &str, template: &ExtractionTemplate, entities: &mut EntityMap) {
        if template.name.contains("marksheet") {
            self.marksheet_heuristics(text, entities);
        } else if template.name.contains("scorecard") {
            self.scorecard_heuristics(text, entities);
        } else if template.name.contains("certificate") {
            self.certificate_heuristics(text, entities);
        }
    }

    /// Line-by-line scan for labelled name rows near the top of the sheet.
    fn marksheet_heuristics(&self, text: &str, entities: &mut EntityMap) {
        let lines: Vec<&str> = text.lines().collect();
        let top_section = lines.len().div_ceil(3).max(1);

        for (index, line) in lines.iter().enumerate() {
            let lower = line.to_lowercase();

            if !entities.contains_key("name")
                && index < top_section
                && (lower.contains("name") || lower.contains("student"))
            {
                if let Some(captures) = NAME_LABEL_LINE.captures(line) {
                    if let Some(name) = captures.get(1).and_then(|m| clean_name(m.as_str())) {
                        entities.insert("name".to_string(), FieldValue::Text(name));
                        continue;
                    }
                }
                // The value is sometimes printed on the following line
                if let Some(next) = lines.get(index + 1) {
                    let next = next.trim();
                    if next.len() > 3 && NAME_SHAPE.is_match(next) {
                        if let Some(name) = clean_name(next) {
                            entities.insert("name".to_string(), FieldValue::Text(name));
                        }
                    }
                }
            }

            if !entities.contains_key("father_name") && lower.contains("father") {
                if let Some(captures) = NAME_LABEL_LINE.captures(line) {
                    if let Some(name) = captures.get(1).and_then(|m| clean_name(m.as_str())) {
                        entities.insert("father_name".to_string(), FieldValue::Text(name));
                    }
                }
            }
        }
    }

    fn scorecard_heuristics(&self, text: &str, entities: &mut EntityMap) {
        if entities.contains_key("score") {
            return;
        }
        for pattern in SCORE_PATTERNS.iter() {
            if let Some(captures) = pattern.captures(text) {
                if let Some(score) = captures.get(1).and_then(|m| m.as_str().parse::<i64>().ok()) {
                    entities.insert("score".to_string(), FieldValue::Integer(score));
                    return;
                }
            }
        }
    }

    fn certificate_heuristics(&self, text: &str, entities: &mut EntityMap) {
        if entities.contains_key("issuing_authority") {
            return;
        }
        for pattern in AUTHORITY_PATTERNS.iter() {
            if let Some(captures) = pattern.captures(text) {
                if let Some(m) = captures.get(1) {
                    let value = m.as_str().trim().trim_end_matches(['.', ',']).to_string();
                    if value.len() >= 4 {
                        entities.insert("issuing_authority".to_string(), FieldValue::Text(value));
                        return;
                    }
                }
            }
        }
    }

    /// Drop candidate values that fail their shape rule. Returns the names
    /// of dropped fields for the result metadata.
    fn enforce_shapes(&self, entities: &mut EntityMap) -> Vec<String> {
        let mut dropped = Vec::new();
        entities.retain(|field, value| {
            let rule = match self.shapes.get(field.as_str()) {
                Some(rule) => rule,
                None => return true,
            };
            if Self::value_fits(rule, value) {
                true
            } else {
                debug!("dropping field '{}' with out-of-shape value {:?}", field, value);
                dropped.push(field.clone());
                false
            }
        });
        dropped
    }

    fn value_fits(rule: &FieldShape, value: &FieldValue) -> bool {
        match value {
            FieldValue::Text(text) => {
                let text = text.trim();
                if let Some(min) = rule.min_len {
                    if text.len() < min {
                        return false;
                    }
                }
                if let Some(max) = rule.max_len {
                    if text.len() > max {
                        return false;
                    }
                }
                if let Some(pattern) = &rule.pattern {
                    if !pattern.is_match(text) {
                        return false;
                    }
                }
                true
            }
            FieldValue::Integer(_) | FieldValue::Number(_) => {
                let numeric = match value.as_f64() {
                    Some(n) => n,
                    None => return false,
                };
                if let Some(min) = rule.min_value {
                    if numeric < min {
                        return false;
                    }
                }
                if let Some(max) = rule.max_value {
                    if numeric > max {
                        return false;
                    }
                }
                true
            }
            FieldValue::Map(_) => true,
        }
    }

    /// Coverage-based confidence with a discount for suspiciously short
    /// source text.
    fn confidence(&self, entities: &EntityMap, text: &str, template: &ExtractionTemplate) -> f64 {
        let mut confidence = if template.required_fields.is_empty() {
            0.8
        } else {
            let required_present = template
                .required_fields
                .iter()
                .filter(|f| entities.contains_key(**f))
                .count() as f64;
            let required_coverage = required_present / template.required_fields.len() as f64;

            let optional_coverage = if template.optional_fields.is_empty() {
                0.0
            } else {
                let optional_present = template
                    .optional_fields
                    .iter()
                    .filter(|f| entities.contains_key(**f))
                    .count() as f64;
                optional_present / template.optional_fields.len() as f64
            };

            required_coverage * REQUIRED_COVERAGE_WEIGHT
                + optional_coverage * OPTIONAL_COVERAGE_WEIGHT
        };

        if text.len() < SHORT_TEXT_THRESHOLD {
            confidence *= SHORT_TEXT_DISCOUNT;
        }
        confidence.min(1.0)
    }
}

/// Fix frequent OCR misreads and spacing before pattern matching.
fn clean_ocr_text(text: &str) -> String {
    let mut cleaned = text.to_string();
    for (pattern, replacement) in OCR_CORRECTIONS.iter() {
        cleaned = pattern.replace_all(&cleaned, *replacement).to_string();
    }
    cleaned
}

/// Field-specific value normalization applied to raw regex captures.
fn normalize_field(field: &str, raw: &str) -> Option<FieldValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match field {
        "name" | "father_name" | "mother_name" => clean_name(trimmed).map(FieldValue::Text),
        "roll_number" => {
            let digits: String = trimmed
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect();
            if digits.is_empty() {
                None
            } else {
                Some(FieldValue::Text(digits.to_uppercase()))
            }
        }
        "year" => trimmed.parse::<i64>().ok().map(FieldValue::Integer),
        "rank" | "category_rank" | "score" => {
            trimmed.parse::<i64>().ok().map(FieldValue::Integer)
        }
        "percentage" | "percentile" => trimmed.parse::<f64>().ok().map(FieldValue::Number),
        "stream" | "category" | "gender" => Some(FieldValue::Text(capitalize(trimmed))),
        "board" | "exam_name" => Some(FieldValue::Text(trimmed.to_uppercase())),
        _ => Some(FieldValue::Text(trimmed.to_string())),
    }
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => lower,
    }
}

fn normalize_subject(raw: &str) -> String {
    let name = raw.trim().to_lowercase();
    let mut normalized: Vec<String> = name
        .split_whitespace()
        .map(|w| capitalize(w))
        .collect();
    if normalized.len() == 2 && normalized[1] == "Sc" {
        normalized[1] = "Science".to_string();
    }
    normalized.join(" ")
}

/// Pick the best-scored person entity, earliest position breaking ties.
fn best_person(entities: &[NamedEntity]) -> Option<&NamedEntity> {
    entities
        .iter()
        .filter(|e| e.label == EntityLabel::Person)
        .max_by_key(|e| (e.score, std::cmp::Reverse(e.offset)))
}

/// Last-resort name extraction: uppercase runs that are not preceded by a
/// parent label.
fn name_fallback(text: &str) -> Option<String> {
    lazy_static! {
        static ref UPPER_RUN: Regex =
            Regex::new(r"\b([A-Z]{3,15}(?:\s+[A-Z]{1,15}){1,2})\b").expect("static pattern");
    }

    for m in UPPER_RUN.find_iter(text) {
        let before_start = m.start().saturating_sub(30);
        let before = text
            .get(before_start..m.start())
            .unwrap_or("")
            .to_lowercase();
        if before.contains("father") || before.contains("mother") || before.contains("parent") {
            continue;
        }
        if let Some(name) = clean_name(m.as_str()) {
            if name.split_whitespace().count() >= 2 {
                return Some(name);
            }
        }
    }
    None
}

fn roll_number_fallback(text: &str) -> Option<String> {
    ROLL_FALLBACK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> EntityExtractor {
        EntityExtractor::new(TemplateSet::standard())
    }

    const MARKSHEET_TEXT: &str = "Department of Pre-University Education\n\
        Candidate's Name: SANJAN B M\n\
        Father's Name: MAHESH B\n\
        Register No: 456123\n\
        Examination held in March 2022\n\
        Stream: Science\n\
        PHYSICS : 87\n\
        CHEMISTRY : 82\n\
        MATHEMATICS : 95\n\
        Percentage: 88.0";

    #[test]
    fn test_marksheet_extraction_covers_required_fields() {
        let result = extractor().extract(MARKSHEET_TEXT, DocumentType::Marksheet12th, None);

        assert_eq!(
            result.entities.get("name").and_then(|v| v.as_text()),
            Some("Sanjan B M")
        );
        assert_eq!(
            result.entities.get("roll_number").and_then(|v| v.as_text()),
            Some("456123")
        );
        assert_eq!(result.entities.get("year").and_then(|v| v.as_i64()), Some(2022));
        assert_eq!(
            result.entities.get("stream").and_then(|v| v.as_text()),
            Some("Science")
        );

        let subjects = result
            .entities
            .get("subjects")
            .and_then(|v| v.as_map())
            .expect("subjects map");
        assert_eq!(subjects.get("Physics").and_then(|v| v.as_i64()), Some(87));
        assert_eq!(subjects.get("Mathematics").and_then(|v| v.as_i64()), Some(95));

        assert!(result.confidence > 0.5, "confidence was {}", result.confidence);
        assert_eq!(
            result.metadata.get("template_used"),
            Some(&serde_json::json!("12th_marksheet"))
        );
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let extractor = extractor();
        let first = extractor.extract(MARKSHEET_TEXT, DocumentType::Marksheet12th, None);
        let second = extractor.extract(MARKSHEET_TEXT, DocumentType::Marksheet12th, None);
        assert_eq!(first.entities, second.entities);
        assert!((first.confidence - second.confidence).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ocr_corrections_recover_labels() {
        let text = "Cendldate Name: RAVI KUMAR S\nReglster No: 654321\n\
            Department of Pre-University Education, Government of Karnataka\n\
            examination held in March 2021\nPHYSICS : 66\nCHEMISTRY : 71";
        let result = extractor().extract(text, DocumentType::Marksheet12th, None);
        assert_eq!(
            result.entities.get("roll_number").and_then(|v| v.as_text()),
            Some("654321")
        );
        assert!(result.entities.contains_key("name"));
    }

    #[test]
    fn test_scorecard_rank_and_score() {
        let text = "JEE Main 2023\nCandidate's Name: ANITA R\nRoll No: AB123456\n\
            All India Rank: 1520\nCategory Rank: 310\nTotal Score: 245\nPercentile: 98.76";
        let result = extractor().extract(text, DocumentType::EntranceScorecard, None);

        assert_eq!(result.entities.get("rank").and_then(|v| v.as_i64()), Some(1520));
        assert_eq!(
            result.entities.get("category_rank").and_then(|v| v.as_i64()),
            Some(310)
        );
        assert_eq!(result.entities.get("score").and_then(|v| v.as_i64()), Some(245));
        assert_eq!(
            result.entities.get("percentile").and_then(|v| v.as_f64()),
            Some(98.76)
        );
        assert_eq!(
            result.entities.get("exam_name").and_then(|v| v.as_text()),
            Some("JEE MAIN")
        );
    }

    #[test]
    fn test_certificate_authority_heuristic() {
        let text = "CASTE CERTIFICATE\nName of the Candidate: VIJAY K\n\
            Category: OBC\nCaste: Kuruba\nIssued by: District Magistrate Office";
        let result = extractor().extract(text, DocumentType::CasteCertificate, None);

        assert_eq!(
            result.entities.get("issuing_authority").and_then(|v| v.as_text()),
            Some("District Magistrate Office")
        );
        assert_eq!(
            result.entities.get("category").and_then(|v| v.as_text()),
            Some("Obc")
        );
    }

    #[test]
    fn test_aadhaar_number_extraction() {
        let text = "Government of India\nRamesh Chandra\nDOB: 12/03/2001\nMale\n1234 5678 9012";
        let result = extractor().extract(text, DocumentType::AadhaarCard, None);
        assert_eq!(
            result.entities.get("aadhaar_number").and_then(|v| v.as_text()),
            Some("1234 5678 9012")
        );
        assert_eq!(
            result.entities.get("dob").and_then(|v| v.as_text()),
            Some("12/03/2001")
        );
    }

    #[test]
    fn test_out_of_shape_values_are_dropped() {
        // Marks above 100 are invalid, so the subject pattern rejects them
        // and a 4-digit "roll number" fails its shape rule
        let text = "Roll No: 12345\nPHYSICS : 87";
        let result = extractor().extract(text, DocumentType::Marksheet10th, None);
        assert!(!result.entities.contains_key("roll_number"));
    }

    #[test]
    fn test_short_text_discounts_confidence() {
        let extractor = extractor();
        let short = "Candidate's Name: ARUN P";
        let result = extractor.extract(short, DocumentType::Marksheet10th, None);
        // Only one of five required fields, and the short-text discount on top
        assert!(result.confidence < 0.25, "confidence was {}", result.confidence);
    }

    #[test]
    fn test_unsupported_type_yields_empty_result() {
        let result = extractor().extract("any text", DocumentType::Other, None);
        assert!(result.entities.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_empty_entity_map_rather_than_error_on_garbage() {
        let result = extractor().extract("@@@@ ####", DocumentType::Marksheet10th, None);
        // Nothing matched, but extraction still returns a low-confidence result
        assert!(result.confidence < 0.3);
    }
}
