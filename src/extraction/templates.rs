use std::collections::HashMap;

use log::warn;
use regex::Regex;

use crate::models::DocumentType;

/// Ordered regex alternatives for one field; the first matching pattern
/// wins.
#[derive(Debug)]
pub struct FieldPattern {
    pub field: &'static str,
    pub patterns: Vec<Regex>,
}

/// Per-type extraction template: which fields to look for and how.
#[derive(Debug)]
pub struct ExtractionTemplate {
    pub name: &'static str,
    pub document_type: DocumentType,
    pub required_fields: &'static [&'static str],
    pub optional_fields: &'static [&'static str],
    pub field_patterns: Vec<FieldPattern>,
    /// Subject/marks row patterns; capture group 1 is the subject, group 2
    /// the marks.
    pub subject_patterns: Vec<Regex>,
}

/// Immutable template table keyed by document type, built once and passed
/// into the extractor so tests can swap in alternates.
#[derive(Debug)]
pub struct TemplateSet {
    templates: HashMap<DocumentType, ExtractionTemplate>,
}

/// Compile a pattern list, skipping any that fail to parse. A bad pattern
/// costs one extraction route, not the whole pipeline.
fn compile(patterns: &[&str]) -> Vec<Regex> {
    let mut compiled = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        match Regex::new(pattern) {
            Ok(re) => compiled.push(re),
            Err(e) => warn!("skipping invalid extraction pattern {:?}: {}", pattern, e),
        }
    }
    compiled
}

fn field(field: &'static str, patterns: &[&str]) -> FieldPattern {
    FieldPattern {
        field,
        patterns: compile(patterns),
    }
}

const NAME_PATTERNS: &[&str] = &[
    r"(?i)candidate'?s?\s*name\s*[:\}]?\s*([A-Z][A-Za-z .]{2,40})",
    r"(?i)name\s*of\s*(?:the\s*)?candidate\s*[:\}]?\s*([A-Z][A-Za-z .]{2,40})",
    r"(?i)student\s*name\s*[:\}]?\s*([A-Z][A-Za-z .]{2,40})",
    r"(?i)name\s*of\s*(?:the\s*)?student\s*[:\}]?\s*([A-Z][A-Za-z .]{2,40})",
];

const FATHER_NAME_PATTERNS: &[&str] =
    &[r"(?i)father'?s?\s*name\s*[:\}]?\s*([A-Z][A-Za-z .]{2,40})"];

const MOTHER_NAME_PATTERNS: &[&str] =
    &[r"(?i)mother'?s?\s*name\s*[:\}]?\s*([A-Z][A-Za-z .]{2,40})"];

const DOB_PATTERNS: &[&str] = &[
    r"(?i)date\s*of\s*birth\s*:?\s*(\d{1,2}[-/]\d{1,2}[-/]\d{4})",
    r"(?i)\bdob\s*:?\s*(\d{1,2}[-/]\d{1,2}[-/]\d{4})",
    r"(?i)born\s*on\s*:?\s*(\d{1,2}[-/]\d{1,2}[-/]\d{4})",
];

const ROLL_NUMBER_PATTERNS: &[&str] = &[
    r"(?i)roll\s*no\.?\s*:?\s*(\d{6,12})",
    r"(?i)roll\s*number\s*:?\s*(\d{6,12})",
    r"(?i)register\s*no\.?\s*:?\s*(\d{6,12})",
    r"(?i)reg\.?\s*no\.?\s*:?\s*(\d{6,12})",
    r"(?i)enrolment\s*no\.?\s*:?\s*(\d{6,12})",
];

const YEAR_PATTERNS: &[&str] = &[
    r"(?i)(?:year|examination)\s*:?\s*((?:19|20)\d{2})",
    r"(?i)(?:march|april|may|june)\s*((?:19|20)\d{2})",
    r"(?i)examination\s*held\s*in\s*[a-z]*\s*((?:19|20)\d{2})",
    r"(?i)((?:19|20)\d{2})\s*examination",
    r"\b(20\d{2})\b",
];

const BOARD_PATTERNS: &[&str] = &[
    r"(?i)(cbse|icse|state\s*board|bihar\s*board|up\s*board)",
    r"(?i)(karnataka\s*secondary|department\s*of\s*pre[\- ]*university)",
    r"(?i)board\s*:?\s*([A-Za-z][A-Za-z ]{3,40})",
];

const SCHOOL_PATTERNS: &[&str] = &[
    r"(?i)school\s*:?\s*([A-Z][A-Za-z ,.]{3,60})",
    r"(?i)([A-Z][A-Za-z ]+(?:high\s*school|school|college))",
];

impl TemplateSet {
    /// The standard template table, one entry per extractable type.
    pub fn standard() -> Self {
        let mut templates = HashMap::new();

        templates.insert(
            DocumentType::Marksheet10th,
            ExtractionTemplate {
                name: "10th_marksheet",
                document_type: DocumentType::Marksheet10th,
                required_fields: &["name", "roll_number", "board", "year", "subjects"],
                optional_fields: &["dob", "father_name", "school_name"],
                field_patterns: vec![
                    field("name", NAME_PATTERNS),
                    field("roll_number", ROLL_NUMBER_PATTERNS),
                    field("board", BOARD_PATTERNS),
                    field("year", YEAR_PATTERNS),
                    field("dob", DOB_PATTERNS),
                    field("father_name", FATHER_NAME_PATTERNS),
                    field("school_name", SCHOOL_PATTERNS),
                ],
                subject_patterns: compile(&[
                    r"(?i)(mathematics|maths|math)\s*[:\- ]*\s*(\d{1,3})",
                    r"(?i)(science|physics|chemistry|biology)\s*[:\- ]*\s*(\d{1,3})",
                    r"(?i)(english|hindi|kannada|social\s*science)\s*[:\- ]*\s*(\d{1,3})",
                ]),
            },
        );

        templates.insert(
            DocumentType::Marksheet12th,
            ExtractionTemplate {
                name: "12th_marksheet",
                document_type: DocumentType::Marksheet12th,
                required_fields: &["name", "roll_number", "board", "year", "subjects", "stream"],
                optional_fields: &[
                    "dob",
                    "father_name",
                    "mother_name",
                    "school_name",
                    "percentage",
                ],
                field_patterns: vec![
                    field("name", NAME_PATTERNS),
                    field("roll_number", ROLL_NUMBER_PATTERNS),
                    field("board", BOARD_PATTERNS),
                    field("year", YEAR_PATTERNS),
                    field(
                        "stream",
                        &[
                            r"(?i)stream\s*:?\s*(science|commerce|arts|humanities)",
                            r"(?i)(science|commerce|arts|humanities)\s*stream",
                            r"\b(PCMB|PCMC|PCM|CEC|HEP)\b",
                        ],
                    ),
                    field(
                        "percentage",
                        &[
                            r"(?i)percentage\s*:?\s*(\d{1,3}(?:\.\d{1,2})?)\s*%?",
                            r"(?i)total\s*:?\s*(\d{1,3}(?:\.\d{1,2})?)\s*%",
                        ],
                    ),
                    field("dob", DOB_PATTERNS),
                    field("father_name", FATHER_NAME_PATTERNS),
                    field("mother_name", MOTHER_NAME_PATTERNS),
                    field("school_name", SCHOOL_PATTERNS),
                ],
                subject_patterns: compile(&[
                    r"(?i)(kannada|english|hindi)\s*[:\- ]*\s*(\d{2,3})",
                    r"(?i)(physics|chemistry|mathematics|biology)\s*[:\- ]*\s*(\d{2,3})",
                    r"(?i)(computer\s*science|electronics|economics|accountancy|statistics)\s*[:\- ]*\s*(\d{2,3})",
                ]),
            },
        );

        templates.insert(
            DocumentType::EntranceScorecard,
            ExtractionTemplate {
                name: "entrance_scorecard",
                document_type: DocumentType::EntranceScorecard,
                required_fields: &["name", "roll_number", "exam_name", "rank", "score"],
                optional_fields: &["percentile", "category", "category_rank"],
                field_patterns: vec![
                    field("name", NAME_PATTERNS),
                    field(
                        "roll_number",
                        &[
                            r"(?i)roll\s*no\.?\s*:?\s*([A-Z0-9]{6,15})",
                            r"(?i)application\s*no\.?\s*:?\s*([A-Z0-9]{6,15})",
                        ],
                    ),
                    field(
                        "exam_name",
                        &[
                            r"(?i)(jee\s*main|jee\s*advanced|neet|cat|gate)",
                            r"(?i)(joint\s*entrance\s*examination)",
                        ],
                    ),
                    field(
                        "rank",
                        &[
                            r"(?i)all\s*india\s*rank\s*:?\s*(\d{1,7})",
                            r"(?i)\bcrl\s*:?\s*(\d{1,7})",
                            r"(?i)\brank\s*:?\s*(\d{1,7})",
                        ],
                    ),
                    field(
                        "category_rank",
                        &[r"(?i)category\s*rank\s*:?\s*(\d{1,7})"],
                    ),
                    field(
                        "percentile",
                        &[
                            r"(?i)percentile\s*:?\s*(\d{1,3}(?:\.\d{1,4})?)",
                            r"(?i)nta\s*score\s*:?\s*(\d{1,3}(?:\.\d{1,4})?)",
                        ],
                    ),
                    field(
                        "category",
                        &[r"(?i)category\s*:?\s*(general|sc|st|obc|ews)\b"],
                    ),
                ],
                subject_patterns: Vec::new(),
            },
        );

        templates.insert(
            DocumentType::EntranceAdmitCard,
            ExtractionTemplate {
                name: "entrance_admit_card",
                document_type: DocumentType::EntranceAdmitCard,
                required_fields: &["name", "roll_number", "exam_name"],
                optional_fields: &["exam_date", "venue"],
                field_patterns: vec![
                    field("name", NAME_PATTERNS),
                    field(
                        "roll_number",
                        &[r"(?i)roll\s*no\.?\s*:?\s*([A-Z0-9]{6,15})"],
                    ),
                    field(
                        "exam_name",
                        &[
                            r"(?i)(jee\s*main|jee\s*advanced|neet|cat|gate)",
                            r"(?i)(entrance\s*examination)",
                        ],
                    ),
                    field(
                        "exam_date",
                        &[r"(?i)(?:date\s*of\s*exam|exam\s*date)\s*:?\s*(\d{1,2}[-/]\d{1,2}[-/]\d{4})"],
                    ),
                    field(
                        "venue",
                        &[r"(?i)(?:centre|center|venue)\s*:?\s*([A-Z][A-Za-z ,.]{3,60})"],
                    ),
                ],
                subject_patterns: Vec::new(),
            },
        );

        templates.insert(
            DocumentType::CasteCertificate,
            ExtractionTemplate {
                name: "caste_certificate",
                document_type: DocumentType::CasteCertificate,
                required_fields: &["name", "category", "caste", "issuing_authority"],
                optional_fields: &["certificate_number", "father_name"],
                field_patterns: vec![
                    field("name", NAME_PATTERNS),
                    field(
                        "category",
                        &[
                            r"(?i)category\s*:?\s*(sc|st|obc|general|ews)\b",
                            r"(?i)(scheduled\s*caste|scheduled\s*tribe|other\s*backward)",
                        ],
                    ),
                    field("caste", &[r"(?i)caste\s*:\s*([A-Za-z][A-Za-z ]{1,40})"]),
                    field(
                        "certificate_number",
                        &[
                            r"(?i)certificate\s*no\.?\s*:?\s*([A-Z0-9/\-]+)",
                            r"(?i)cert\.?\s*no\.?\s*:?\s*([A-Z0-9/\-]+)",
                        ],
                    ),
                    field("father_name", FATHER_NAME_PATTERNS),
                ],
                subject_patterns: Vec::new(),
            },
        );

        templates.insert(
            DocumentType::DomicileCertificate,
            ExtractionTemplate {
                name: "domicile_certificate",
                document_type: DocumentType::DomicileCertificate,
                required_fields: &["name", "state"],
                optional_fields: &["district", "certificate_number", "father_name"],
                field_patterns: vec![
                    field("name", NAME_PATTERNS),
                    field(
                        "state",
                        &[
                            r"(?i)state\s*(?:of)?\s*:?\s*([A-Z][A-Za-z ]{2,40})",
                            r"(?i)government\s*of\s*([A-Za-z][A-Za-z ]{2,40})",
                        ],
                    ),
                    field("district", &[r"(?i)district\s*:?\s*([A-Z][A-Za-z ]{2,40})"]),
                    field(
                        "certificate_number",
                        &[r"(?i)certificate\s*no\.?\s*:?\s*([A-Z0-9/\-]+)"],
                    ),
                    field("father_name", FATHER_NAME_PATTERNS),
                ],
                subject_patterns: Vec::new(),
            },
        );

        templates.insert(
            DocumentType::TransferCertificate,
            ExtractionTemplate {
                name: "transfer_certificate",
                document_type: DocumentType::TransferCertificate,
                required_fields: &["name", "institution"],
                optional_fields: &["conduct", "certificate_number", "father_name"],
                field_patterns: vec![
                    field("name", NAME_PATTERNS),
                    field(
                        "institution",
                        &[
                            r"(?i)(?:school|college|institution)\s*:?\s*([A-Z][A-Za-z ,.]{3,60})",
                            r"(?i)([A-Z][A-Za-z ]+(?:high\s*school|school|college))",
                        ],
                    ),
                    field("conduct", &[r"(?i)conduct\s*:?\s*([A-Za-z][A-Za-z ]{2,30})"]),
                    field(
                        "certificate_number",
                        &[r"(?i)(?:tc|certificate)\s*no\.?\s*:?\s*([A-Z0-9/\-]+)"],
                    ),
                    field("father_name", FATHER_NAME_PATTERNS),
                ],
                subject_patterns: Vec::new(),
            },
        );

        templates.insert(
            DocumentType::MigrationCertificate,
            ExtractionTemplate {
                name: "migration_certificate",
                document_type: DocumentType::MigrationCertificate,
                required_fields: &["name", "university"],
                optional_fields: &["college", "certificate_number", "year"],
                field_patterns: vec![
                    field("name", NAME_PATTERNS),
                    field(
                        "university",
                        &[
                            r"(?i)university\s*:?\s*([A-Z][A-Za-z ,.]{3,60})",
                            r"(?i)([A-Z][A-Za-z ]+university)",
                        ],
                    ),
                    field(
                        "college",
                        &[r"(?i)college\s*:?\s*([A-Z][A-Za-z ,.]{3,60})"],
                    ),
                    field(
                        "certificate_number",
                        &[r"(?i)(?:migration|certificate)\s*no\.?\s*:?\s*([A-Z0-9/\-]+)"],
                    ),
                    field("year", YEAR_PATTERNS),
                ],
                subject_patterns: Vec::new(),
            },
        );

        templates.insert(
            DocumentType::PassingCertificate,
            ExtractionTemplate {
                name: "passing_certificate",
                document_type: DocumentType::PassingCertificate,
                required_fields: &["name", "year"],
                optional_fields: &["board", "certificate_number"],
                field_patterns: vec![
                    field("name", NAME_PATTERNS),
                    field("year", YEAR_PATTERNS),
                    field("board", BOARD_PATTERNS),
                    field(
                        "certificate_number",
                        &[r"(?i)certificate\s*no\.?\s*:?\s*([A-Z0-9/\-]+)"],
                    ),
                ],
                subject_patterns: Vec::new(),
            },
        );

        templates.insert(
            DocumentType::AadhaarCard,
            ExtractionTemplate {
                name: "aadhaar_card",
                document_type: DocumentType::AadhaarCard,
                required_fields: &["name", "aadhaar_number", "dob"],
                optional_fields: &["gender", "father_name", "address"],
                field_patterns: vec![
                    field("name", NAME_PATTERNS),
                    field(
                        "aadhaar_number",
                        &[
                            r"(?i)uid\s*:?\s*(\d{4}\s*\d{4}\s*\d{4})",
                            r"(\d{4}\s+\d{4}\s+\d{4})",
                            r"\b(\d{12})\b",
                        ],
                    ),
                    field("dob", DOB_PATTERNS),
                    field("gender", &[r"(?i)\b(male|female)\b"]),
                    field("father_name", FATHER_NAME_PATTERNS),
                ],
                subject_patterns: Vec::new(),
            },
        );

        // Passport photos carry no extractable text fields
        templates.insert(
            DocumentType::PassportPhoto,
            ExtractionTemplate {
                name: "passport_photo",
                document_type: DocumentType::PassportPhoto,
                required_fields: &[],
                optional_fields: &[],
                field_patterns: Vec::new(),
                subject_patterns: Vec::new(),
            },
        );

        TemplateSet { templates }
    }

    pub fn template(&self, document_type: DocumentType) -> Option<&ExtractionTemplate> {
        self.templates.get(&document_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_except_other_has_a_template() {
        let set = TemplateSet::standard();
        for doc_type in DocumentType::all() {
            if *doc_type == DocumentType::Other {
                assert!(set.template(*doc_type).is_none());
            } else {
                assert!(set.template(*doc_type).is_some(), "missing {}", doc_type);
            }
        }
    }

    #[test]
    fn test_required_fields_have_patterns_or_heuristics() {
        // Subjects, score and issuing_authority come from dedicated passes;
        // every other required field needs at least one regex route.
        let covered_elsewhere = ["subjects", "score", "issuing_authority"];
        let set = TemplateSet::standard();
        for doc_type in DocumentType::all() {
            let template = match set.template(*doc_type) {
                Some(t) => t,
                None => continue,
            };
            for required in template.required_fields {
                if covered_elsewhere.contains(required) {
                    continue;
                }
                assert!(
                    template.field_patterns.iter().any(|fp| fp.field == *required),
                    "{} required field '{}' has no patterns",
                    doc_type,
                    required
                );
            }
        }
    }

    #[test]
    fn test_marksheet_roll_number_pattern_matches() {
        let set = TemplateSet::standard();
        let template = set.template(DocumentType::Marksheet10th).expect("template");
        let roll = template
            .field_patterns
            .iter()
            .find(|fp| fp.field == "roll_number")
            .expect("roll_number patterns");
        let captures = roll.patterns[0].captures("Roll No: 1234567").expect("match");
        assert_eq!(&captures[1], "1234567");
    }
}
