use image::{DynamicImage, GenericImageView};
use log::{debug, warn};

use crate::classification::features::FeatureExtractor;
use crate::models::{ClassificationResult, ClassificationRules, DocumentType, Metadata, TypeRule};
use crate::processing::ocr::OcrBackend;
use crate::utils::text::fuzzy_keyword_match;

/// Weight of structural image evidence in a type's combined score.
const STRUCTURE_WEIGHT: f64 = 0.4;
/// Weight of textual keyword evidence.
const KEYWORD_WEIGHT: f64 = 0.6;
/// Matched keyword weight at which the keyword score saturates. Three
/// converging keywords are treated as conclusive textual evidence.
const KEYWORD_SATURATION: f64 = 3.0;
/// Filename-derived keywords are weak evidence and only earn half credit.
const FILE_NAME_CREDIT: f64 = 0.5;

/// Classifies a document image into one of the supported types by combining
/// structural image features with keyword evidence from OCR text.
pub struct DocumentClassifier {
    rules: ClassificationRules,
    features: FeatureExtractor,
    /// Optional low-cost OCR used when the caller supplies no text. Without
    /// it, keyword matching falls back to the file name.
    fallback_ocr: Option<Box<dyn OcrBackend>>,
}

impl DocumentClassifier {
    pub fn new(rules: ClassificationRules) -> Self {
        DocumentClassifier {
            rules,
            features: FeatureExtractor,
            fallback_ocr: None,
        }
    }

    pub fn with_fallback_ocr(mut self, backend: Box<dyn OcrBackend>) -> Self {
        self.fallback_ocr = Some(backend);
        self
    }

    /// Score every known type and return the best one, or `Other` with the
    /// computed (low) score when no type reaches its acceptance threshold.
    /// Classification never fails; missing evidence just produces a low
    /// score.
    pub fn classify(
        &self,
        image: &DynamicImage,
        ocr_text: Option<&str>,
        file_name: &str,
    ) -> ClassificationResult {
        let features = self.features.extract(image);
        let (keyword_text, keyword_source, source_credit) =
            self.resolve_keyword_source(image, ocr_text, file_name);

        let mut best_type = DocumentType::Other;
        let mut best_score = 0.0;

        for rule in self.rules.iter() {
            let mut score = 0.0;

            for feature_name in rule.structure_features {
                if let Some(value) = features.get(*feature_name) {
                    score += value * STRUCTURE_WEIGHT;
                }
            }

            let (keyword_score, matched) = Self::keyword_score(&keyword_text, rule);
            score += keyword_score * source_credit * KEYWORD_WEIGHT;
            let score = score.min(1.0);

            debug!(
                "{} scored {:.3} ({} keyword matches)",
                rule.document_type, score, matched
            );

            if score > best_score {
                best_score = score;
                best_type = rule.document_type;
            }
        }

        let threshold = self
            .rules
            .rule(best_type)
            .map(|r| r.min_confidence)
            .unwrap_or(1.0);
        let decided = if best_score >= threshold {
            best_type
        } else {
            DocumentType::Other
        };

        let mut metadata = Metadata::new();
        metadata.insert("keyword_source".into(), serde_json::json!(keyword_source));
        metadata.insert("used_ocr_text".into(), serde_json::json!(ocr_text.is_some()));
        metadata.insert(
            "image_size".into(),
            serde_json::json!([image.width(), image.height()]),
        );
        metadata.insert("best_candidate".into(), serde_json::json!(best_type.as_str()));

        ClassificationResult {
            document_type: decided,
            confidence: best_score,
            features,
            metadata,
        }
    }

    /// Keyword text priority: caller-supplied OCR text, then a quick OCR
    /// pass when a fallback backend is configured, then the file name at
    /// reduced credit.
    fn resolve_keyword_source(
        &self,
        image: &DynamicImage,
        ocr_text: Option<&str>,
        file_name: &str,
    ) -> (String, &'static str, f64) {
        if let Some(text) = ocr_text {
            if !text.trim().is_empty() {
                return (text.to_string(), "ocr_text", 1.0);
            }
        }

        if let Some(backend) = &self.fallback_ocr {
            match backend.extract_text(image, false) {
                Ok(result) if !result.text.trim().is_empty() => {
                    return (result.text, "fallback_ocr", 1.0);
                }
                Ok(_) => debug!("fallback OCR produced no text"),
                Err(e) => warn!("fallback OCR failed: {}", e),
            }
        }

        (file_name.to_lowercase(), "file_name", FILE_NAME_CREDIT)
    }

    /// Score a rule's keywords against the text. Exact substring hits earn
    /// full weight (double for type-distinguishing keywords), partial word
    /// overlap earns half, and a fuzzy character-overlap hit earns a small
    /// credit. Converging evidence gets a bonus before clamping.
    fn keyword_score(text: &str, rule: &TypeRule) -> (f64, usize) {
        if rule.keywords.is_empty() || text.trim().is_empty() {
            return (0.0, 0);
        }

        let text = text.to_lowercase();
        let mut weight = 0.0;
        let mut fuzzy_weight: f64 = 0.0;
        let mut matched = 0usize;

        for keyword in rule.keywords {
            if text.contains(keyword) {
                weight += if rule.strong_keywords.contains(keyword) {
                    2.0
                } else {
                    1.0
                };
                matched += 1;
            } else if keyword
                .split_whitespace()
                .any(|word| word.len() > 2 && text.contains(word))
            {
                weight += 0.5;
                matched += 1;
            } else if fuzzy_keyword_match(keyword, &text) {
                fuzzy_weight += 0.3;
            }
        }

        // Character-overlap hits are weak evidence; a long keyword list must
        // not accumulate them into the equivalent of a real match
        weight += fuzzy_weight.min(0.3);

        let mut score = (weight / KEYWORD_SATURATION).min(1.0);
        if matched >= 3 {
            score *= 1.2;
        } else if matched >= 2 {
            score *= 1.1;
        }
        (score.min(1.0), matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::features::test_images::*;

    fn classifier() -> DocumentClassifier {
        DocumentClassifier::new(ClassificationRules::standard())
    }

    /// Three strong keywords plus neutral filler for a given type.
    fn strong_keyword_text(rule: &TypeRule) -> String {
        let mut text = String::from("issued under the authority of the examining body\n");
        for keyword in rule.strong_keywords.iter().take(3) {
            text.push_str(keyword);
            text.push('\n');
        }
        text
    }

    fn image_for_rule(rule: &TypeRule) -> image::DynamicImage {
        if rule.structure_features.contains(&"photo_likelihood") {
            photo_card()
        } else if rule.structure_features.contains(&"table_score") {
            table_document()
        } else {
            certificate_document()
        }
    }

    #[test]
    fn test_each_type_reachable_with_strong_keywords_and_structure() {
        let rules = ClassificationRules::standard();
        let classifier = classifier();

        for rule in rules.iter() {
            if rule.strong_keywords.len() < 3 {
                // Keywordless types (passport photo) are hint-only
                continue;
            }
            let text = strong_keyword_text(rule);
            let image = image_for_rule(rule);
            let result = classifier.classify(&image, Some(&text), "scan.png");

            assert_eq!(
                result.document_type, rule.document_type,
                "expected {} for text {:?}, got {} at {:.3}",
                rule.document_type, text, result.document_type, result.confidence
            );
            assert!(
                result.confidence >= rule.min_confidence,
                "{} confidence {:.3} below threshold {:.3}",
                rule.document_type,
                result.confidence,
                rule.min_confidence
            );
        }
    }

    #[test]
    fn test_no_evidence_returns_other() {
        let result = classifier().classify(&near_blank_page(), Some("zzzz qqqq"), "scan.png");
        assert_eq!(result.document_type, DocumentType::Other);
        assert!(result.confidence < 0.6);
    }

    #[test]
    fn test_marksheet_scenario_with_board_and_subject_text() {
        let text = "CBSE Board of Secondary Education\nroll no: 123456\nmathematics: 95";
        let result = classifier().classify(&table_document(), Some(text), "marksheet.png");

        assert!(
            result.document_type == DocumentType::Marksheet10th
                || result.document_type == DocumentType::Marksheet12th,
            "got {}",
            result.document_type
        );
        let threshold = ClassificationRules::standard()
            .rule(result.document_type)
            .map(|r| r.min_confidence)
            .unwrap_or(1.0);
        assert!(result.confidence > threshold);
    }

    #[test]
    fn test_file_name_is_last_resort_keyword_source() {
        let result = classifier().classify(&near_blank_page(), None, "aadhaar_card_scan.jpg");
        assert_eq!(
            result.metadata.get("keyword_source"),
            Some(&serde_json::json!("file_name"))
        );
        // Filename evidence alone must not cross the Aadhaar threshold
        assert_eq!(result.document_type, DocumentType::Other);
    }

    #[test]
    fn test_keyword_scoring_tiers() {
        let rules = ClassificationRules::standard();
        let rule = rules.rule(DocumentType::CasteCertificate).expect("rule");

        // Strong exact hit counts double
        let (strong, _) = DocumentClassifier::keyword_score("caste certificate attached", rule);
        let (weak, _) = DocumentClassifier::keyword_score("reservation applies", rule);
        assert!(strong > weak);

        // Empty text scores zero
        let (zero, matched) = DocumentClassifier::keyword_score("   ", rule);
        assert_eq!(zero, 0.0);
        assert_eq!(matched, 0);
    }

    #[test]
    fn test_multi_keyword_bonus_rewards_convergence() {
        let rules = ClassificationRules::standard();
        let rule = rules.rule(DocumentType::EntranceScorecard).expect("rule");

        let (single, _) = DocumentClassifier::keyword_score("percentile", rule);
        let (triple, matched) =
            DocumentClassifier::keyword_score("percentile entrance all india rank", rule);
        assert!(matched >= 3);
        assert!(triple > single);
    }
}
