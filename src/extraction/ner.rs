use lazy_static::lazy_static;
use regex::Regex;

/// Kinds of entities the recognizer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityLabel {
    Person,
    Date,
    Year,
    Organization,
}

/// A located entity with a context score; higher scores are more likely to
/// be the field the extractor is looking for.
#[derive(Debug, Clone)]
pub struct NamedEntity {
    pub label: EntityLabel,
    pub text: String,
    pub score: i32,
    pub offset: usize,
}

/// Pluggable named-entity step. The extractor only consumes this seam, so a
/// model-backed recognizer can replace the heuristic one without touching
/// the extraction logic.
pub trait EntityRecognizer: Send + Sync {
    fn recognize(&self, text: &str) -> Vec<NamedEntity>;
}

lazy_static! {
    static ref TITLE_CASE_NAME: Regex =
        Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,3})\b").expect("static pattern");
    static ref UPPER_CASE_NAME: Regex =
        Regex::new(r"\b([A-Z]{2,15}(?:\s+[A-Z]{1,15}){1,3})\b").expect("static pattern");
    static ref FULL_DATE: Regex =
        Regex::new(r"\b(\d{1,2}[-/]\d{1,2}[-/]\d{4})\b").expect("static pattern");
    static ref YEAR: Regex = Regex::new(r"\b((?:19|20)\d{2})\b").expect("static pattern");
}

/// Words that disqualify an uppercase run from being a person name.
const NAME_STOPWORDS: &[&str] = &[
    "BOARD",
    "SCHOOL",
    "COLLEGE",
    "UNIVERSITY",
    "CERTIFICATE",
    "EXAMINATION",
    "MARKS",
    "GOVERNMENT",
    "DEPARTMENT",
    "SECONDARY",
    "EDUCATION",
    "INDIA",
    "RESULT",
];

/// Rule-based recognizer for the entities these documents actually carry:
/// person names, dates, examination years and issuing organizations.
#[derive(Debug, Clone, Default)]
pub struct HeuristicRecognizer;

impl HeuristicRecognizer {
    /// Score a name candidate by its surrounding context. Candidate and
    /// student labels raise the score; parent labels lower it, since
    /// father's and mother's names share the same shape.
    fn context_score(text: &str, offset: usize, len: usize) -> i32 {
        // OCR text may contain multi-byte characters; keep the window edges
        // on character boundaries
        let before_start = floor_char_boundary(text, offset.saturating_sub(50));
        let before = text[before_start..offset].to_lowercase();
        let after_end = floor_char_boundary(text, (offset + len + 30).min(text.len()));
        let after = text[offset + len..after_end].to_lowercase();

        let mut score = 0;
        if ["candidate", "student", "name of", "name:"]
            .iter()
            .any(|k| before.contains(k))
        {
            score += 10;
        }
        if ["father", "mother", "parent", "guardian"]
            .iter()
            .any(|k| before.contains(k))
        {
            score -= 5;
        }
        if after.contains("father") || after.contains("mother") {
            // Student names are printed right before the parent rows
            score += 3;
        }
        score
    }

    fn looks_like_name(candidate: &str) -> bool {
        let upper = candidate.to_uppercase();
        !NAME_STOPWORDS.iter().any(|stop| upper.contains(stop))
    }
}

impl EntityRecognizer for HeuristicRecognizer {
    fn recognize(&self, text: &str) -> Vec<NamedEntity> {
        let mut entities = Vec::new();

        for re in [&*TITLE_CASE_NAME, &*UPPER_CASE_NAME] {
            for captures in re.captures_iter(text) {
                if let Some(m) = captures.get(1) {
                    let candidate = m.as_str().trim();
                    if !Self::looks_like_name(candidate) {
                        continue;
                    }
                    entities.push(NamedEntity {
                        label: EntityLabel::Person,
                        text: candidate.to_string(),
                        score: Self::context_score(text, m.start(), m.len()),
                        offset: m.start(),
                    });
                }
            }
        }

        for captures in FULL_DATE.captures_iter(text) {
            if let Some(m) = captures.get(1) {
                entities.push(NamedEntity {
                    label: EntityLabel::Date,
                    text: m.as_str().to_string(),
                    score: 0,
                    offset: m.start(),
                });
            }
        }

        for captures in YEAR.captures_iter(text) {
            if let Some(m) = captures.get(1) {
                entities.push(NamedEntity {
                    label: EntityLabel::Year,
                    text: m.as_str().to_string(),
                    score: 0,
                    offset: m.start(),
                });
            }
        }

        for (line_offset, line) in line_offsets(text) {
            let lower = line.to_lowercase();
            if ["board", "university", "college", "school"]
                .iter()
                .any(|k| lower.contains(k))
            {
                let trimmed = line.trim();
                if trimmed.len() >= 4 && trimmed.len() <= 80 {
                    entities.push(NamedEntity {
                        label: EntityLabel::Organization,
                        text: trimmed.to_string(),
                        score: 0,
                        offset: line_offset,
                    });
                }
            }
        }

        entities
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn line_offsets(text: &str) -> Vec<(usize, &str)> {
    let mut result = Vec::new();
    let mut offset = 0;
    for line in text.split('\n') {
        result.push((offset, line));
        offset += line.len() + 1;
    }
    result
}
