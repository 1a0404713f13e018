pub mod types;
pub mod prompt;
pub mod parser;
pub mod ingest;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use ingest::*;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::providers::ProviderError;

#[derive(Error, Debug)]
pub enum PrescriptionError {
    #[error("Vision provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Vision model returned an empty response")]
    EmptyResponse,

    #[error("Uploaded file is empty: {0}")]
    EmptyUpload(String),
}
