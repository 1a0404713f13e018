use std::sync::Mutex;

use crate::pipeline::detection::ImageInput;
use crate::providers::ProviderError;

/// A prescription file chosen by the user.
#[derive(Debug, Clone)]
pub struct PrescriptionUpload {
    pub file_name: String,
    pub content: UploadContent,
}

#[derive(Debug, Clone)]
pub enum UploadContent {
    Image(ImageInput),
    /// Raw PDF bytes; sent to the model as a file part, never rasterised here.
    Pdf(Vec<u8>),
}

impl PrescriptionUpload {
    pub fn image(file_name: &str, image: ImageInput) -> Self {
        Self {
            file_name: file_name.to_string(),
            content: UploadContent::Image(image),
        }
    }

    pub fn pdf(file_name: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            content: UploadContent::Pdf(bytes),
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self.content, UploadContent::Pdf(_))
    }

    pub fn byte_len(&self) -> usize {
        match &self.content {
            UploadContent::Image(image) => image.bytes.len(),
            UploadContent::Pdf(bytes) => bytes.len(),
        }
    }
}

/// Vision chat model that reads documents (allows mocking for tests).
pub trait VisionChatClient: Send + Sync {
    fn generate_from_image(&self, prompt: &str, image: &ImageInput) -> Result<String, ProviderError>;

    fn generate_from_pdf(
        &self,
        prompt: &str,
        pdf_bytes: &[u8],
        file_name: &str,
    ) -> Result<String, ProviderError>;
}

/// Mock chat client for testing. Returns a configurable response.
pub struct MockVisionChatClient {
    response: Result<String, String>,
    calls: Mutex<Vec<String>>,
}

impl MockVisionChatClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with a transport error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Recorded calls as `image:<mime>` / `pdf:<file name>`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn reply(&self, call: String) -> Result<String, ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        self.response.clone().map_err(ProviderError::HttpClient)
    }
}

impl VisionChatClient for MockVisionChatClient {
    fn generate_from_image(&self, _prompt: &str, image: &ImageInput) -> Result<String, ProviderError> {
        self.reply(format!("image:{}", image.mime_type))
    }

    fn generate_from_pdf(
        &self,
        _prompt: &str,
        _pdf_bytes: &[u8],
        file_name: &str,
    ) -> Result<String, ProviderError> {
        self.reply(format!("pdf:{file_name}"))
    }
}
