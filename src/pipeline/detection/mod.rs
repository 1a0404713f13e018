pub mod types;
pub mod schedule;
pub mod text_match;
pub mod pointer;
pub mod geometry;
pub mod coordinator;
pub mod session;

pub use types::*;
pub use schedule::*;
pub use text_match::*;
pub use pointer::*;
pub use geometry::*;
pub use coordinator::*;
pub use session::*;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Prescription store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("Detection configuration error: {0}")]
    Config(String),

    #[error("Detection run was superseded by a newer image")]
    Cancelled,

    #[error("Detection task failed: {0}")]
    Task(String),
}
