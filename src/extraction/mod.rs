pub mod extractor;
pub mod ner;
pub mod templates;

pub use extractor::EntityExtractor;
pub use ner::{EntityRecognizer, HeuristicRecognizer};
pub use templates::TemplateSet;
