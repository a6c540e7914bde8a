pub mod article;
pub mod key;

pub use article::{Article, OutputFormat};
pub use key::CacheKey;
