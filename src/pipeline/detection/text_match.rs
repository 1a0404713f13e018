//! Fuzzy matching of OCR text against medicine names.
//!
//! Match rules (case-insensitive, trimmed), any one suffices:
//! 1. exact equality
//! 2. fragment contains the full name
//! 3. name contains the full fragment, fragment at least 3 chars
//! 4. some token pair (split on space, `-`, `_`) is equal, or one token is a
//!    prefix of the other and the prefix is at least 3 chars
//!
//! Per medicine only the occurrence with the largest box area survives,
//! compared across line and word fragments alike.

use super::types::{DetectedMedicine, OcrFragment, OcrResult};

/// Shortest fragment/token allowed to match as a partial name.
const MIN_PARTIAL_LEN: usize = 3;

pub struct TextMatcher;

impl TextMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Best occurrence of each target name among the fragments. Names with no
    /// match are absent. Output follows the order of `target_names`; names
    /// that differ only in case or surrounding space produce one entry.
    pub fn detect(&self, fragments: &[OcrFragment], target_names: &[String]) -> Vec<DetectedMedicine> {
        let names = distinct_names(target_names);

        let mut best: Vec<Option<DetectedMedicine>> = vec![None; names.len()];

        for fragment in fragments {
            let Some(bbox) = fragment.bounding_box else {
                continue;
            };
            let area = bbox.area();

            for (slot, name) in best.iter_mut().zip(&names) {
                if !is_match(&fragment.text, name) {
                    continue;
                }
                let replace = match slot {
                    None => true,
                    Some(existing) => area > existing.bounding_box.area(),
                };
                if replace {
                    tracing::debug!(
                        medicine = %name,
                        fragment = %fragment.text,
                        granularity = ?fragment.granularity,
                        area,
                        "Best text match updated"
                    );
                    *slot = Some(DetectedMedicine {
                        name: name.to_string(),
                        matched_text: fragment.text.clone(),
                        bounding_box: bbox,
                    });
                }
            }
        }

        best.into_iter().flatten().collect()
    }

    /// Convenience over a full OCR layout tree (lines + words).
    pub fn detect_in_layout(&self, ocr: &OcrResult, target_names: &[String]) -> Vec<DetectedMedicine> {
        self.detect(&ocr.fragments(), target_names)
    }
}

impl Default for TextMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether an OCR fragment plausibly names the medicine.
pub fn is_match(fragment_text: &str, medicine_name: &str) -> bool {
    let fragment = fragment_text.trim().to_lowercase();
    let medicine = medicine_name.trim().to_lowercase();

    if fragment.is_empty() || medicine.is_empty() {
        return false;
    }

    if fragment == medicine || fragment.contains(&medicine) {
        return true;
    }

    if medicine.contains(&fragment) && fragment.chars().count() >= MIN_PARTIAL_LEN {
        return true;
    }

    let medicine_tokens: Vec<&str> = tokenize(&medicine).collect();
    let token_hit = tokenize(&fragment).any(|ocr_token| {
        medicine_tokens
            .iter()
            .any(|med_token| tokens_match(ocr_token, med_token))
    });
    token_hit
}

/// One entry per medicine, compared case-insensitively after trimming.
/// The first spelling seen is kept.
pub fn distinct_names(names: &[String]) -> Vec<&str> {
    let mut seen: Vec<String> = Vec::new();
    let mut distinct = Vec::new();
    for name in names {
        let key = name.trim().to_lowercase();
        if !seen.contains(&key) {
            seen.push(key);
            distinct.push(name.as_str());
        }
    }
    distinct
}

fn tokenize(s: &str) -> impl Iterator<Item = &str> {
    s.split([' ', '-', '_']).filter(|t| !t.is_empty())
}

fn tokens_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    long.starts_with(short) && short.chars().count() >= MIN_PARTIAL_LEN
}
