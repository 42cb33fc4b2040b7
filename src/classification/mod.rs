pub mod classifier;
pub mod features;

pub use classifier::DocumentClassifier;
pub use features::FeatureExtractor;
