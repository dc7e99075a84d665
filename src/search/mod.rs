pub mod results;
pub mod full_text;

pub use full_text::FullTextIndex;
