use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{build_http_client, read_json, send_error, ProviderError};
use crate::config::OpenRouterConfig;
use crate::pipeline::detection::{ImageInput, LookupOutcome, Point, VisionLocateProvider};
use crate::pipeline::prescription::{extract_json_block, VisionChatClient};

/// OpenRouter chat-completions client for vision-capable models.
pub struct OpenRouterClient {
    base_url: String,
    api_key: String,
    model: String,
    site_url: Option<String>,
    site_name: Option<String>,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

/// Request body for /chat/completions
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
    File { file: FileData<'a> },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Serialize)]
struct FileData<'a> {
    filename: &'a str,
    file_data: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenRouterClient {
    pub fn new(config: &OpenRouterConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey("OpenRouter"));
        }
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            site_url: config.site_url.clone(),
            site_name: config.site_name.clone(),
            client: build_http_client(config.timeout_secs)?,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One user turn; returns the first choice's text (empty when absent).
    fn complete(&self, content: Vec<ContentPart<'_>>) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let _span = tracing::info_span!("openrouter_call", model = %self.model).entered();
        let start = std::time::Instant::now();

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
        };

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(site_url) = &self.site_url {
            request = request.header("HTTP-Referer", site_url);
        }
        if let Some(site_name) = &self.site_name {
            request = request.header("X-Title", site_name);
        }

        let response = request
            .send()
            .map_err(|e| send_error(e, &self.base_url, self.timeout_secs))?;
        let parsed: ChatResponse = read_json(response)?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        tracing::debug!(
            chars = text.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "OpenRouter call finished"
        );
        Ok(text)
    }
}

impl VisionChatClient for OpenRouterClient {
    fn generate_from_image(&self, prompt: &str, image: &ImageInput) -> Result<String, ProviderError> {
        self.complete(vec![
            ContentPart::Text { text: prompt },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.to_data_uri(),
                },
            },
        ])
    }

    fn generate_from_pdf(
        &self,
        prompt: &str,
        pdf_bytes: &[u8],
        file_name: &str,
    ) -> Result<String, ProviderError> {
        use base64::Engine as _;
        let encoded = base64::engine::general_purpose::STANDARD.encode(pdf_bytes);
        self.complete(vec![
            ContentPart::Text { text: prompt },
            ContentPart::File {
                file: FileData {
                    filename: file_name,
                    file_data: format!("data:application/pdf;base64,{encoded}"),
                },
            },
        ])
    }
}

// ──────────────────────────────────────────────
// Point queries over a chat model
// ──────────────────────────────────────────────

/// `VisionLocateProvider` built on a general chat model: points come back
/// as a JSON `coordinates` list, questions are passed through verbatim.
pub struct OpenRouterLocator {
    chat: Arc<dyn VisionChatClient>,
}

impl OpenRouterLocator {
    pub fn new(chat: Arc<dyn VisionChatClient>) -> Self {
        Self { chat }
    }
}

pub fn build_locate_prompt(query: &str) -> String {
    format!(
        r#"Analyze this image and find the location of "{query}".

Look for:
- Exact name match
- Abbreviations (like "Para" for "Paracetamol", "ASP" for "Aspirin")
- Partial names
- Brand names for this generic medicine

If you find it, return its location as normalized coordinates (0-1 range, where 0,0 is top-left and 1,1 is bottom-right).
Return the center point of where the name is visible.

Respond ONLY with valid JSON in this exact format:
{{
  "coordinates": [
    {{"x": 0.5, "y": 0.3}}
  ]
}}

If it is not found, return:
{{
  "coordinates": []
}}

Do not include any other text, explanation, or markdown formatting. Only return the JSON object."#
    )
}

#[derive(Deserialize)]
struct CoordinateResponse {
    coordinates: Vec<Coordinate>,
}

#[derive(Deserialize)]
struct Coordinate {
    x: f32,
    y: f32,
}

/// Points from a coordinates answer; `None` if the answer is not that JSON.
pub fn parse_coordinates(response: &str) -> Option<Vec<Point>> {
    let block = extract_json_block(response)?;
    let parsed: CoordinateResponse = serde_json::from_str(block).ok()?;
    Some(
        parsed
            .coordinates
            .into_iter()
            .filter(|c| c.x.is_finite() && c.y.is_finite())
            .map(|c| Point::new(c.x.clamp(0.0, 1.0), c.y.clamp(0.0, 1.0)))
            .collect(),
    )
}

impl VisionLocateProvider for OpenRouterLocator {
    fn point(&self, image: &ImageInput, query: &str) -> LookupOutcome<Vec<Point>> {
        let raw = match self.chat.generate_from_image(&build_locate_prompt(query), image) {
            Ok(raw) => raw,
            Err(e) => return e.into_outcome(),
        };
        match parse_coordinates(&raw) {
            Some(points) => LookupOutcome::Success(points),
            None => {
                tracing::warn!(query, "Coordinate answer was not valid JSON");
                LookupOutcome::ParseFailure(format!("unreadable coordinates: {}", raw.trim()))
            }
        }
    }

    fn ask(&self, image: &ImageInput, question: &str) -> LookupOutcome<String> {
        match self.chat.generate_from_image(question, image) {
            Ok(answer) => LookupOutcome::Success(answer),
            Err(e) => e.into_outcome(),
        }
    }
}
