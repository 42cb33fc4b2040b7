use std::collections::HashMap;

use crate::models::DocumentType;

/// Classification evidence for one document type: textual keywords, the
/// subset of keywords distinctive enough to count double, the structural
/// image features that support the type, and the minimum combined score the
/// classifier demands before committing to it.
#[derive(Debug, Clone)]
pub struct TypeRule {
    pub document_type: DocumentType,
    pub keywords: &'static [&'static str],
    /// Type-distinguishing keywords; an exact hit scores double weight.
    pub strong_keywords: &'static [&'static str],
    /// Names of structural features (see the feature extractor) whose scores
    /// back this type.
    pub structure_features: &'static [&'static str],
    /// Hand-tuned acceptance threshold. Overridable through configuration;
    /// not calibrated against a labelled set.
    pub min_confidence: f64,
}

/// Immutable rule table keyed by document type, built once at startup and
/// passed into the classifier so tests can substitute alternate tables.
#[derive(Debug, Clone)]
pub struct ClassificationRules {
    rules: Vec<TypeRule>,
}

impl ClassificationRules {
    /// The standard rule set for Indian academic and identity documents.
    pub fn standard() -> Self {
        let rules = vec![
            TypeRule {
                document_type: DocumentType::Marksheet10th,
                keywords: &[
                    "class x", "10th", "tenth", "secondary", "matriculation", "board",
                    "sslc", "cbse", "icse", "roll no", "mathematics", "marks",
                ],
                strong_keywords: &["matriculation", "sslc", "class x", "tenth"],
                structure_features: &["table_score", "text_density"],
                min_confidence: 0.7,
            },
            TypeRule {
                document_type: DocumentType::Marksheet12th,
                keywords: &[
                    "class xii", "12th", "twelfth", "senior secondary", "intermediate",
                    "puc", "pre-university", "pre university", "higher secondary",
                    "plus two", "cbse", "icse", "roll no", "marks", "stream",
                ],
                strong_keywords: &["intermediate", "higher secondary", "plus two", "twelfth"],
                structure_features: &["table_score", "text_density"],
                min_confidence: 0.7,
            },
            TypeRule {
                document_type: DocumentType::PassingCertificate,
                keywords: &[
                    "passing", "passed", "certificate", "completion", "qualify",
                    "qualified", "course and passed",
                ],
                strong_keywords: &["passing", "qualified", "completion"],
                structure_features: &["logo_presence", "signature_presence"],
                min_confidence: 0.6,
            },
            TypeRule {
                document_type: DocumentType::TransferCertificate,
                keywords: &[
                    "transfer", "tc", "school leaving", "leaving certificate", "conduct",
                ],
                strong_keywords: &["transfer", "school leaving", "leaving certificate"],
                structure_features: &["logo_presence", "signature_presence"],
                min_confidence: 0.6,
            },
            TypeRule {
                document_type: DocumentType::MigrationCertificate,
                keywords: &[
                    "migration", "university", "college", "migration certificate",
                ],
                strong_keywords: &["migration", "migration certificate", "university"],
                structure_features: &["logo_presence", "signature_presence"],
                min_confidence: 0.6,
            },
            TypeRule {
                document_type: DocumentType::EntranceScorecard,
                keywords: &[
                    "rank", "score", "percentile", "entrance", "jee", "neet",
                    "all india rank", "nta score",
                ],
                strong_keywords: &["percentile", "all india rank", "entrance"],
                structure_features: &["table_score", "text_density"],
                min_confidence: 0.8,
            },
            TypeRule {
                document_type: DocumentType::EntranceAdmitCard,
                keywords: &[
                    "admit card", "hall ticket", "entrance", "exam", "centre",
                    "reporting time",
                ],
                strong_keywords: &["admit card", "hall ticket", "reporting time"],
                structure_features: &["photo_likelihood", "table_score"],
                min_confidence: 0.8,
            },
            TypeRule {
                document_type: DocumentType::CasteCertificate,
                keywords: &[
                    "caste", "category", "scheduled caste", "scheduled tribe", "obc",
                    "reservation", "backward",
                ],
                strong_keywords: &["caste", "scheduled caste", "scheduled tribe"],
                structure_features: &["logo_presence", "signature_presence"],
                min_confidence: 0.7,
            },
            TypeRule {
                document_type: DocumentType::DomicileCertificate,
                keywords: &[
                    "domicile", "residence", "resident", "state", "residence certificate",
                    "resident of",
                ],
                strong_keywords: &["domicile", "residence certificate", "resident of"],
                structure_features: &["logo_presence", "signature_presence"],
                min_confidence: 0.7,
            },
            TypeRule {
                document_type: DocumentType::AadhaarCard,
                keywords: &[
                    "aadhaar", "aadhar", "uid", "unique identification",
                    "government of india",
                ],
                strong_keywords: &["aadhaar", "aadhar", "unique identification"],
                structure_features: &["photo_likelihood"],
                min_confidence: 0.9,
            },
            TypeRule {
                document_type: DocumentType::PassportPhoto,
                // Passport photos carry no text; only structural evidence applies
                keywords: &[],
                strong_keywords: &[],
                structure_features: &["photo_likelihood"],
                min_confidence: 0.8,
            },
        ];

        ClassificationRules { rules }
    }

    /// Apply per-type minimum-confidence overrides from configuration.
    pub fn with_overrides(mut self, overrides: &HashMap<DocumentType, f64>) -> Self {
        for rule in &mut self.rules {
            if let Some(&threshold) = overrides.get(&rule.document_type) {
                rule.min_confidence = threshold.clamp(0.0, 1.0);
            }
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeRule> {
        self.rules.iter()
    }

    pub fn rule(&self, document_type: DocumentType) -> Option<&TypeRule> {
        self.rules.iter().find(|r| r.document_type == document_type)
    }
}
