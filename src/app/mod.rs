pub mod error;

pub use error::{CleanwebError, ConvertError, ExtractError, Result, RetrievalError};
