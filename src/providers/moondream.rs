use serde::{Deserialize, Serialize};

use super::{build_http_client, outcome, read_json, send_error, ProviderError};
use crate::config::MoondreamConfig;
use crate::pipeline::detection::{ImageInput, LookupOutcome, Point, VisionLocateProvider};

/// Moondream cloud client: object pointing and visual question answering.
pub struct MoondreamClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

/// Request body for /point
#[derive(Serialize)]
struct PointRequest<'a> {
    image_url: &'a str,
    object: &'a str,
}

/// Request body for /query
#[derive(Serialize)]
struct QueryRequest<'a> {
    image_url: &'a str,
    question: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct PointResponse {
    #[serde(default)]
    points: Vec<RawPoint>,
}

#[derive(Deserialize)]
struct RawPoint {
    x: f32,
    y: f32,
}

#[derive(Deserialize)]
struct QueryResponse {
    answer: String,
}

impl MoondreamClient {
    pub fn new(config: &MoondreamConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey("Moondream"));
        }
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client: build_http_client(config.timeout_secs)?,
            timeout_secs: config.timeout_secs,
        })
    }

    fn post<B: Serialize, R: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<R, ProviderError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let _span = tracing::info_span!("moondream_call", endpoint).entered();
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(&url)
            .header("X-Moondream-Auth", &self.api_key)
            .json(body)
            .send()
            .map_err(|e| send_error(e, &self.base_url, self.timeout_secs))?;

        let parsed = read_json(response);
        tracing::debug!(
            ok = parsed.is_ok(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Moondream call finished"
        );
        parsed
    }

    /// Centre points of every instance of `object`, normalized to [0, 1].
    pub fn point_at(&self, image: &ImageInput, object: &str) -> Result<Vec<Point>, ProviderError> {
        let image_url = image.to_data_uri();
        let response: PointResponse = self.post(
            "point",
            &PointRequest {
                image_url: &image_url,
                object,
            },
        )?;
        Ok(normalize_points(response.points))
    }

    pub fn query(&self, image: &ImageInput, question: &str) -> Result<String, ProviderError> {
        let image_url = image.to_data_uri();
        let response: QueryResponse = self.post(
            "query",
            &QueryRequest {
                image_url: &image_url,
                question,
                stream: false,
            },
        )?;
        Ok(response.answer)
    }
}

fn normalize_points(raw: Vec<RawPoint>) -> Vec<Point> {
    raw.into_iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .map(|p| Point::new(p.x.clamp(0.0, 1.0), p.y.clamp(0.0, 1.0)))
        .collect()
}

impl VisionLocateProvider for MoondreamClient {
    fn point(&self, image: &ImageInput, query: &str) -> LookupOutcome<Vec<Point>> {
        outcome(self.point_at(image, query))
    }

    fn ask(&self, image: &ImageInput, question: &str) -> LookupOutcome<String> {
        outcome(self.query(image, question))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key: &str) -> MoondreamConfig {
        MoondreamConfig {
            api_key: key.into(),
            base_url: "https://api.moondream.ai/v1/".into(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn constructor_trims_trailing_slash() {
        let client = MoondreamClient::new(&config("k")).unwrap();
        assert_eq!(client.base_url, "https://api.moondream.ai/v1");
        assert_eq!(client.timeout_secs, 30);
    }

    #[test]
    fn blank_key_is_rejected() {
        assert!(matches!(
            MoondreamClient::new(&config("  ")),
            Err(ProviderError::MissingApiKey("Moondream"))
        ));
    }

    #[test]
    fn point_request_shape() {
        let body = serde_json::to_value(PointRequest {
            image_url: "data:image/jpeg;base64,AA==",
            object: "Aspirin medicine",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"image_url": "data:image/jpeg;base64,AA==", "object": "Aspirin medicine"})
        );
    }

    #[test]
    fn query_request_is_not_streamed() {
        let body = serde_json::to_value(QueryRequest {
            image_url: "u",
            question: "q",
            stream: false,
        })
        .unwrap();
        assert_eq!(body["stream"], serde_json::json!(false));
    }

    #[test]
    fn point_response_is_normalized() {
        let parsed: PointResponse = serde_json::from_str(
            r#"{"request_id": "r1", "points": [{"x": 0.25, "y": 0.5}, {"x": 1.2, "y": -0.1}]}"#,
        )
        .unwrap();
        let points = normalize_points(parsed.points);
        assert_eq!(points, vec![Point::new(0.25, 0.5), Point::new(1.0, 0.0)]);
    }

    #[test]
    fn missing_points_field_is_empty() {
        let parsed: PointResponse = serde_json::from_str(r#"{"request_id": "r1"}"#).unwrap();
        assert!(parsed.points.is_empty());
    }

    #[test]
    fn unreachable_host_is_transport_failure() {
        let client = MoondreamClient::new(&MoondreamConfig {
            api_key: "k".into(),
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
        })
        .unwrap();
        let image = ImageInput::new(vec![0u8; 4], 2, 2, "image/png");
        assert!(matches!(
            client.point(&image, "Aspirin"),
            LookupOutcome::TransportFailure(_)
        ));
    }
}
