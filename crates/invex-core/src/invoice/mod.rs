//! Invoice field extraction module.

mod extractor;
mod parser;
mod prompt;

pub use extractor::FieldExtractor;
pub use parser::parse_response;
pub use prompt::build_prompt;
