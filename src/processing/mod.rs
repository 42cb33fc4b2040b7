pub mod arbitrator;
pub mod image;
pub mod ocr;

pub use self::arbitrator::MultiEngineOcr;
pub use self::image::{PreprocessOptions, Preprocessor};
pub use self::ocr::OcrBackend;
