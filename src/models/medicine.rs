use serde::{Deserialize, Serialize};

use super::enums::WhenToTake;

/// One medicine line parsed from a prescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medicine {
    pub name: String,
    pub when_to_take: WhenToTake,
    /// Doses per day: 1 or 2.
    pub frequency: u8,
}

impl Medicine {
    pub fn new(name: impl Into<String>, when_to_take: WhenToTake, frequency: u8) -> Self {
        Self {
            name: name.into(),
            when_to_take,
            frequency,
        }
    }
}

/// A saved prescription upload and the medicines extracted from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionRecord {
    pub id: String,
    pub file_name: String,
    /// Raw model output, kept even when structured parsing failed.
    pub extracted_text: String,
    pub medicines: Vec<Medicine>,
    pub timestamp_millis: i64,
    pub is_pdf: bool,
}

impl PrescriptionRecord {
    /// New record with a fresh v4 id, stamped with the current time.
    pub fn new(
        file_name: impl Into<String>,
        extracted_text: impl Into<String>,
        medicines: Vec<Medicine>,
        is_pdf: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            extracted_text: extracted_text.into(),
            medicines,
            timestamp_millis: chrono::Utc::now().timestamp_millis(),
            is_pdf,
        }
    }
}
