use serde::{Deserialize, Serialize};

use super::DetectionError;
use crate::models::{Medicine, TimeOfDay};

// ──────────────────────────────────────────────
// Geometry primitives
// ──────────────────────────────────────────────

/// Axis-aligned box in image-relative units, each edge in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl NormalizedBoundingBox {
    /// Build a box from any two corners. Edges are ordered and clamped to [0, 1]
    /// so `left <= right` and `top <= bottom` always hold.
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        let clamp = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        let (l, r) = (clamp(left), clamp(right));
        let (t, b) = (clamp(top), clamp(bottom));
        Self {
            left: l.min(r),
            top: t.min(b),
            right: l.max(r),
            bottom: t.max(b),
        }
    }

    /// Convert a pixel rectangle measured against an image of the given size.
    /// Returns `None` for an empty image.
    pub fn from_pixels(
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
        image_width: u32,
        image_height: u32,
    ) -> Option<Self> {
        if image_width == 0 || image_height == 0 {
            return None;
        }
        let w = image_width as f32;
        let h = image_height as f32;
        Some(Self::new(
            left as f32 / w,
            top as f32 / h,
            right as f32 / w,
            bottom as f32 / h,
        ))
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point {
        Point {
            x: (self.left + self.right) / 2.0,
            y: (self.top + self.bottom) / 2.0,
        }
    }
}

/// Normalized point; (0, 0) is top-left, (1, 1) bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

// ──────────────────────────────────────────────
// Image + OCR layout
// ──────────────────────────────────────────────

/// Encoded image handed to the engine. Decoding is the host's job; the engine
/// only needs the bytes (for cloud upload) and the pixel size (for geometry).
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: std::sync::Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// e.g. "image/jpeg"
    pub mime_type: String,
}

impl ImageInput {
    pub fn new(bytes: impl Into<std::sync::Arc<[u8]>>, width: u32, height: u32, mime_type: &str) -> Self {
        Self {
            bytes: bytes.into(),
            width,
            height,
            mime_type: mime_type.to_string(),
        }
    }

    /// `data:` URI accepted by both vision providers.
    pub fn to_data_uri(&self) -> String {
        use base64::Engine as _;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.mime_type, encoded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrElement {
    pub text: String,
    pub bounding_box: Option<NormalizedBoundingBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    pub text: String,
    pub bounding_box: Option<NormalizedBoundingBox>,
    #[serde(default)]
    pub elements: Vec<OcrElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrBlock {
    pub text: String,
    pub bounding_box: Option<NormalizedBoundingBox>,
    #[serde(default)]
    pub lines: Vec<OcrLine>,
}

/// Text layout recognised in one image. Boxes are normalized against the
/// image's own pixel dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub full_text: String,
    pub blocks: Vec<OcrBlock>,
}

/// One recognised span of text, at any granularity.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrFragment {
    pub text: String,
    pub bounding_box: Option<NormalizedBoundingBox>,
    pub granularity: FragmentGranularity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentGranularity {
    Line,
    Element,
}

impl OcrFragment {
    pub fn line(text: &str, bounding_box: Option<NormalizedBoundingBox>) -> Self {
        Self {
            text: text.to_string(),
            bounding_box,
            granularity: FragmentGranularity::Line,
        }
    }

    pub fn element(text: &str, bounding_box: Option<NormalizedBoundingBox>) -> Self {
        Self {
            text: text.to_string(),
            bounding_box,
            granularity: FragmentGranularity::Element,
        }
    }
}

impl OcrResult {
    /// Flatten into line- and word-level fragments. Each line is followed by
    /// its elements; block-level text is not included.
    pub fn fragments(&self) -> Vec<OcrFragment> {
        let mut out = Vec::new();
        for block in &self.blocks {
            for line in &block.lines {
                out.push(OcrFragment::line(&line.text, line.bounding_box));
                for element in &line.elements {
                    out.push(OcrFragment::element(&element.text, element.bounding_box));
                }
            }
        }
        out
    }
}

// ──────────────────────────────────────────────
// Provider call outcomes
// ──────────────────────────────────────────────

/// Result of one remote lookup. Callers must handle each case explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome<T> {
    Success(T),
    /// The provider answered but the payload could not be understood.
    ParseFailure(String),
    /// The call itself failed (network, auth, HTTP status).
    TransportFailure(String),
}

impl<T> LookupOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(v) => Some(v),
            _ => None,
        }
    }
}

// ──────────────────────────────────────────────
// Detection results
// ──────────────────────────────────────────────

/// The best textual occurrence of one medicine in the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedMedicine {
    pub name: String,
    pub matched_text: String,
    pub bounding_box: NormalizedBoundingBox,
}

/// A medicine located by a vision point query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointDetection {
    pub name: String,
    pub point: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum Detections {
    Boxes(Vec<DetectedMedicine>),
    Points(Vec<PointDetection>),
}

impl Detections {
    pub fn len(&self) -> usize {
        match self {
            Self::Boxes(b) => b.len(),
            Self::Points(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Boxes(b) => b.iter().map(|d| d.name.as_str()).collect(),
            Self::Points(p) => p.iter().map(|d| d.name.as_str()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    /// Nothing is due at this hour; no lookup was attempted.
    NoEligibleMedicines,
    Completed,
}

/// Everything one detection run produced. Request-scoped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub time_of_day: TimeOfDay,
    pub status: ReportStatus,
    pub eligible_medicines: Vec<Medicine>,
    pub detections: Detections,
    /// Set when some lookups failed and the result may be partial.
    pub diagnostic: Option<String>,
}

impl DetectionReport {
    /// Human-readable summary for the result panel.
    pub fn summary(&self) -> String {
        if self.status == ReportStatus::NoEligibleMedicines {
            return format!(
                "No medicines found for {} time in your saved prescriptions.",
                self.time_of_day
            );
        }

        let mut text = format!("Time: {}\n\nMedicines to take now:\n", self.time_of_day);
        let due: Vec<String> = self
            .eligible_medicines
            .iter()
            .map(|m| format!("• {}", m.name))
            .collect();
        text.push_str(&due.join("\n"));

        match &self.detections {
            d if d.is_empty() => {
                text.push_str("\n\nNone of these medicines were found in the image.");
            }
            Detections::Boxes(found) => {
                text.push_str("\n\nDetected in image:\n");
                let lines: Vec<String> = found
                    .iter()
                    .map(|d| format!("✓ {} (found: '{}')", d.name, d.matched_text))
                    .collect();
                text.push_str(&lines.join("\n"));
            }
            Detections::Points(found) => {
                text.push_str("\n\nDetected in image:\n");
                let lines: Vec<String> = found.iter().map(|d| format!("✓ {}", d.name)).collect();
                text.push_str(&lines.join("\n"));
            }
        }

        if let Some(diag) = &self.diagnostic {
            text.push_str("\n\n");
            text.push_str(diag);
        }
        text
    }
}

// ──────────────────────────────────────────────
// Collaborator traits
// ──────────────────────────────────────────────

/// On-device OCR abstraction (allows mocking for tests)
pub trait OcrProvider: Send + Sync {
    fn extract_text_with_layout(&self, image: &ImageInput) -> Result<OcrResult, DetectionError>;
}

/// Remote vision model that can point at things and answer yes/no questions.
/// Every call is billed; callers keep them to a minimum.
pub trait VisionLocateProvider: Send + Sync {
    /// Normalized centre points of every instance of `query`.
    fn point(&self, image: &ImageInput, query: &str) -> LookupOutcome<Vec<Point>>;

    /// Free-text answer to a question about the image.
    fn ask(&self, image: &ImageInput, question: &str) -> LookupOutcome<String>;
}

/// Detection configuration, passed explicitly into the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    pub strategy: DetectionStrategy,
    pub verification: super::pointer::VerificationPolicy,
    /// Appended to the medicine name for the primary point query.
    pub point_qualifier: String,
    pub vision_backend: VisionBackend,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            strategy: DetectionStrategy::OnDeviceOcr,
            verification: super::pointer::VerificationPolicy::AcceptOnAmbiguous,
            point_qualifier: "medicine".to_string(),
            vision_backend: VisionBackend::Moondream,
        }
    }
}

/// Which `MedicineLocator` implementation a coordinator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionStrategy {
    /// Fuzzy-match OCR text (deterministic, no network).
    OnDeviceOcr,
    /// Ask a cloud vision model to point at each medicine.
    CloudPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisionBackend {
    Moondream,
    OpenRouter,
}
