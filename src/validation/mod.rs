pub mod cross;
pub mod schema;

pub use cross::CrossValidator;
pub use schema::SchemaValidator;
