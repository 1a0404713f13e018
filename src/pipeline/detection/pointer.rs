//! Cloud point-query protocol for one medicine.
//!
//! 1. Primary query `"<name> <qualifier>"`; first point is the candidate.
//! 2. No point (empty or failed call) → one fallback query with the bare name.
//! 3. Optional yes/no verification against the same image.
//!
//! At most three billed calls per medicine.

use std::sync::{Arc, LazyLock, Mutex};

use regex::Regex;

use super::types::{ImageInput, LookupOutcome, Point, VisionLocateProvider};

/// How a verification answer that is neither a clear yes nor a clear no is treated.
///
/// `AcceptOnAmbiguous` is the default: a spurious highlight costs the user less
/// than a missed one. Transport failures during verification count as ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VerificationPolicy {
    /// Skip the verification call entirely.
    Disabled,
    AcceptOnAmbiguous,
    RejectOnAmbiguous,
}

impl VerificationPolicy {
    fn accepts_ambiguous(self) -> bool {
        !matches!(self, Self::RejectOnAmbiguous)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Yes,
    No,
    Ambiguous,
}

/// Outcome of locating one medicine.
#[derive(Debug, Clone, PartialEq)]
pub enum LocateOutcome {
    Found(Point),
    /// A candidate existed but verification turned it down.
    Rejected(Point),
    /// Provider answered, nothing to point at.
    NotFound,
    /// Every query for this medicine failed.
    Failed(String),
}

pub struct CoordinatePointer {
    provider: Arc<dyn VisionLocateProvider>,
    policy: VerificationPolicy,
    qualifier: String,
}

impl CoordinatePointer {
    pub fn new(provider: Arc<dyn VisionLocateProvider>, policy: VerificationPolicy, qualifier: &str) -> Self {
        Self {
            provider,
            policy,
            qualifier: qualifier.trim().to_string(),
        }
    }

    pub fn policy(&self) -> VerificationPolicy {
        self.policy
    }

    pub fn locate(&self, image: &ImageInput, medicine_name: &str) -> LocateOutcome {
        let _span = tracing::info_span!("locate_medicine", medicine = %medicine_name).entered();

        let primary = self.primary_query(medicine_name);
        let mut failure = None;

        let mut candidate = match self.provider.point(image, &primary) {
            LookupOutcome::Success(points) => points.first().copied(),
            LookupOutcome::ParseFailure(e) | LookupOutcome::TransportFailure(e) => {
                tracing::warn!(query = %primary, error = %e, "Primary point query failed");
                failure = Some(e);
                None
            }
        };

        if candidate.is_none() && primary != medicine_name.trim() {
            tracing::debug!("No point from primary query, retrying with bare name");
            candidate = match self.provider.point(image, medicine_name.trim()) {
                LookupOutcome::Success(points) => {
                    failure = None;
                    points.first().copied()
                }
                LookupOutcome::ParseFailure(e) | LookupOutcome::TransportFailure(e) => {
                    tracing::warn!(error = %e, "Fallback point query failed");
                    failure = Some(e);
                    None
                }
            };
        }

        let Some(point) = candidate else {
            return match failure {
                Some(e) => LocateOutcome::Failed(e),
                None => LocateOutcome::NotFound,
            };
        };

        if self.policy == VerificationPolicy::Disabled {
            return LocateOutcome::Found(point);
        }

        let verdict = match self.provider.ask(image, &verification_question(medicine_name)) {
            LookupOutcome::Success(answer) => parse_verdict(&answer),
            LookupOutcome::ParseFailure(e) | LookupOutcome::TransportFailure(e) => {
                tracing::warn!(error = %e, "Verification call failed, treating as ambiguous");
                Verdict::Ambiguous
            }
        };

        let accepted = match verdict {
            Verdict::Yes => true,
            Verdict::No => false,
            Verdict::Ambiguous => self.policy.accepts_ambiguous(),
        };

        tracing::info!(
            x = point.x,
            y = point.y,
            verdict = ?verdict,
            accepted,
            "Point candidate verified"
        );

        if accepted {
            LocateOutcome::Found(point)
        } else {
            LocateOutcome::Rejected(point)
        }
    }

    fn primary_query(&self, medicine_name: &str) -> String {
        let name = medicine_name.trim();
        if self.qualifier.is_empty() {
            name.to_string()
        } else {
            format!("{name} {}", self.qualifier)
        }
    }
}

pub fn verification_question(medicine_name: &str) -> String {
    format!(
        "Is the medicine \"{}\" (or a recognizable abbreviation or brand name of it) \
         visible in this image? Answer YES or NO.",
        medicine_name.trim()
    )
}

/// Permissive yes/no reading of a free-text answer.
/// A whole-word YES with no whole-word NO is a yes; an answer starting
/// with NO is a no; everything else is ambiguous.
pub fn parse_verdict(answer: &str) -> Verdict {
    static YES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bYES\b").expect("valid regex"));
    static NO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bNO\b").expect("valid regex"));

    let upper = answer.trim().to_uppercase();
    if YES_RE.is_match(&upper) && !NO_RE.is_match(&upper) {
        Verdict::Yes
    } else if upper.starts_with("NO") {
        Verdict::No
    } else {
        Verdict::Ambiguous
    }
}

// ──────────────────────────────────────────────
// MockVisionLocator (testing)
// ──────────────────────────────────────────────

/// Scripted vision provider. Point replies are consumed in order (an empty
/// success once exhausted); every ask returns the same reply. All queries
/// are recorded.
pub struct MockVisionLocator {
    point_replies: Mutex<Vec<LookupOutcome<Vec<Point>>>>,
    ask_reply: LookupOutcome<String>,
    calls: Mutex<Vec<String>>,
}

impl MockVisionLocator {
    pub fn new() -> Self {
        Self {
            point_replies: Mutex::new(Vec::new()),
            ask_reply: LookupOutcome::Success("YES".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_point_reply(self, reply: LookupOutcome<Vec<Point>>) -> Self {
        if let Ok(mut replies) = self.point_replies.lock() {
            replies.push(reply);
        }
        self
    }

    pub fn with_ask_reply(mut self, reply: LookupOutcome<String>) -> Self {
        self.ask_reply = reply;
        self
    }

    /// Recorded calls as `point:<query>` / `ask:<question>`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl Default for MockVisionLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl VisionLocateProvider for MockVisionLocator {
    fn point(&self, _image: &ImageInput, query: &str) -> LookupOutcome<Vec<Point>> {
        self.record(format!("point:{query}"));
        let mut replies = match self.point_replies.lock() {
            Ok(r) => r,
            Err(_) => return LookupOutcome::TransportFailure("mock poisoned".into()),
        };
        if replies.is_empty() {
            LookupOutcome::Success(Vec::new())
        } else {
            replies.remove(0)
        }
    }

    fn ask(&self, _image: &ImageInput, question: &str) -> LookupOutcome<String> {
        self.record(format!("ask:{question}"));
        self.ask_reply.clone()
    }
}
