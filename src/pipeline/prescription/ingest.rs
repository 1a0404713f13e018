use std::sync::Arc;
use std::time::Instant;

use super::parser::parse_medicine_response;
use super::prompt::EXTRACT_MEDICINE_INFO;
use super::types::{PrescriptionUpload, UploadContent, VisionChatClient};
use super::PrescriptionError;
use crate::db::PrescriptionStore;
use crate::models::PrescriptionRecord;

/// Upload → vision model → parsed medicines → saved record.
pub struct PrescriptionIngestor {
    client: Arc<dyn VisionChatClient>,
    store: Arc<dyn PrescriptionStore>,
}

impl PrescriptionIngestor {
    pub fn new(client: Arc<dyn VisionChatClient>, store: Arc<dyn PrescriptionStore>) -> Self {
        Self { client, store }
    }

    /// Read one prescription and save it.
    ///
    /// A response that is not valid medicine JSON still produces a record,
    /// with no medicines and the raw answer as `extracted_text`.
    pub fn ingest(&self, upload: &PrescriptionUpload) -> Result<PrescriptionRecord, PrescriptionError> {
        let _span = tracing::info_span!(
            "ingest_prescription",
            file = %upload.file_name,
            is_pdf = upload.is_pdf()
        )
        .entered();
        let start = Instant::now();

        if upload.byte_len() == 0 {
            return Err(PrescriptionError::EmptyUpload(upload.file_name.clone()));
        }

        let raw = match &upload.content {
            UploadContent::Image(image) => self.client.generate_from_image(EXTRACT_MEDICINE_INFO, image)?,
            UploadContent::Pdf(bytes) => {
                self.client
                    .generate_from_pdf(EXTRACT_MEDICINE_INFO, bytes, &upload.file_name)?
            }
        };

        if raw.trim().is_empty() {
            return Err(PrescriptionError::EmptyResponse);
        }

        let medicines = parse_medicine_response(&raw);
        if medicines.is_empty() {
            tracing::warn!("No medicines parsed, keeping raw response only");
        }

        let record = PrescriptionRecord::new(&upload.file_name, raw, medicines, upload.is_pdf());
        self.store.save_record(&record)?;

        tracing::info!(
            id = %record.id,
            medicines = record.medicines.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Prescription saved"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryPrescriptionStore, SqlitePrescriptionStore};
    use crate::models::{Medicine, WhenToTake};
    use crate::pipeline::detection::ImageInput;
    use crate::pipeline::prescription::MockVisionChatClient;
    use crate::providers::ProviderError;

    const GOOD_RESPONSE: &str = r#"```json
{"medicines": [
  {"name": "Paracetamol", "when_to_take": "Morning", "frequency": 1},
  {"name": "Ibuprofen", "when_to_take": "Evening", "frequency": 2}
]}
```"#;

    fn image_upload() -> PrescriptionUpload {
        PrescriptionUpload::image("rx.jpg", ImageInput::new(vec![1u8, 2, 3], 10, 10, "image/jpeg"))
    }

    #[test]
    fn image_upload_is_parsed_and_saved() {
        let client = Arc::new(MockVisionChatClient::new(GOOD_RESPONSE));
        let store = Arc::new(InMemoryPrescriptionStore::new());
        let ingestor = PrescriptionIngestor::new(client.clone(), store.clone());

        let record = ingestor.ingest(&image_upload()).unwrap();
        assert_eq!(record.file_name, "rx.jpg");
        assert!(!record.is_pdf);
        assert_eq!(
            record.medicines,
            vec![
                Medicine::new("Paracetamol", WhenToTake::Morning, 1),
                Medicine::new("Ibuprofen", WhenToTake::Evening, 2),
            ]
        );
        assert_eq!(record.extracted_text, GOOD_RESPONSE);
        assert_eq!(client.calls(), vec!["image:image/jpeg"]);

        let saved = store.get_all_records().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, record.id);
    }

    #[test]
    fn pdf_upload_uses_file_part() {
        let client = Arc::new(MockVisionChatClient::new(GOOD_RESPONSE));
        let store = Arc::new(InMemoryPrescriptionStore::new());
        let ingestor = PrescriptionIngestor::new(client.clone(), store);

        let record = ingestor
            .ingest(&PrescriptionUpload::pdf("rx.pdf", b"%PDF-1.4".to_vec()))
            .unwrap();
        assert!(record.is_pdf);
        assert_eq!(client.calls(), vec!["pdf:rx.pdf"]);
    }

    #[test]
    fn unparsable_answer_keeps_raw_text() {
        let client = Arc::new(MockVisionChatClient::new("The image is too blurry to read."));
        let store = Arc::new(InMemoryPrescriptionStore::new());
        let ingestor = PrescriptionIngestor::new(client, store.clone());

        let record = ingestor.ingest(&image_upload()).unwrap();
        assert!(record.medicines.is_empty());
        assert_eq!(record.extracted_text, "The image is too blurry to read.");
        assert_eq!(store.get_all_records().unwrap().len(), 1);
    }

    #[test]
    fn empty_answer_is_an_error_and_not_saved() {
        let client = Arc::new(MockVisionChatClient::new("   "));
        let store = Arc::new(InMemoryPrescriptionStore::new());
        let ingestor = PrescriptionIngestor::new(client, store.clone());

        let err = ingestor.ingest(&image_upload()).unwrap_err();
        assert!(matches!(err, PrescriptionError::EmptyResponse));
        assert!(store.get_all_records().unwrap().is_empty());
    }

    #[test]
    fn provider_failure_propagates() {
        let client = Arc::new(MockVisionChatClient::failing("connection reset"));
        let ingestor = PrescriptionIngestor::new(client, Arc::new(InMemoryPrescriptionStore::new()));

        let err = ingestor.ingest(&image_upload()).unwrap_err();
        assert!(matches!(err, PrescriptionError::Provider(ProviderError::HttpClient(_))));
    }

    #[test]
    fn empty_file_is_rejected_without_calling_model() {
        let client = Arc::new(MockVisionChatClient::new(GOOD_RESPONSE));
        let ingestor = PrescriptionIngestor::new(client.clone(), Arc::new(InMemoryPrescriptionStore::new()));

        let err = ingestor.ingest(&PrescriptionUpload::pdf("empty.pdf", Vec::new())).unwrap_err();
        assert!(matches!(err, PrescriptionError::EmptyUpload(_)));
        assert!(client.calls().is_empty());
    }

    #[test]
    fn ingested_records_reach_sqlite() {
        let client = Arc::new(MockVisionChatClient::new(GOOD_RESPONSE));
        let store = Arc::new(SqlitePrescriptionStore::open_in_memory().unwrap());
        let ingestor = PrescriptionIngestor::new(client, store.clone());

        ingestor.ingest(&image_upload()).unwrap();
        let latest = store.most_recent().unwrap().unwrap();
        assert_eq!(latest.medicines.len(), 2);
    }
}
