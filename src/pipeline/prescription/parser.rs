use serde::Deserialize;

use crate::models::{Medicine, WhenToTake};

/// Lenient view of one model-produced medicine entry.
#[derive(Debug, Deserialize)]
struct RawMedicine {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    when_to_take: Option<String>,
    #[serde(default)]
    frequency: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawMedicineResponse {
    #[serde(default)]
    medicines: Vec<RawMedicine>,
}

/// Locate the JSON payload in a model response: a ```json fence, a bare
/// fence holding an object/array, or the outermost `{ ... }` span.
pub fn extract_json_block(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') || block.starts_with('[') {
                return Some(block);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return Some(&trimmed[start..=end]);
        }
    }

    None
}

/// Medicines from a model answer to `EXTRACT_MEDICINE_INFO`.
///
/// Never fails: an unreadable answer yields an empty list (the caller keeps
/// the raw text). Entries are validated one by one:
/// - blank names are dropped
/// - missing `when_to_take` means Morning
/// - unrecognised `when_to_take` (e.g. "Afternoon") is dropped
/// - `frequency` is clamped to 1..=2, missing or unreadable means 1
pub fn parse_medicine_response(response: &str) -> Vec<Medicine> {
    let Some(block) = extract_json_block(response) else {
        tracing::warn!(len = response.len(), "No JSON found in medicine response");
        return Vec::new();
    };

    let raw: Vec<RawMedicine> = if block.starts_with('[') {
        serde_json::from_str::<Vec<RawMedicine>>(block)
    } else {
        serde_json::from_str::<RawMedicineResponse>(block).map(|r| r.medicines)
    }
    .unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Medicine response is not valid JSON, keeping raw text only");
        Vec::new()
    });

    raw.into_iter().filter_map(validate_medicine).collect()
}

fn validate_medicine(raw: RawMedicine) -> Option<Medicine> {
    let name = raw.name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        tracing::debug!("Dropping medicine entry without a name");
        return None;
    }

    let when_to_take = match raw.when_to_take.as_deref().map(str::trim) {
        None | Some("") => WhenToTake::Morning,
        Some(value) => match WhenToTake::parse_lenient(value) {
            Some(w) => w,
            None => {
                tracing::warn!(medicine = %name, value, "Unschedulable when_to_take, dropping entry");
                return None;
            }
        },
    };

    Some(Medicine::new(name, when_to_take, parse_frequency(raw.frequency.as_ref())))
}

fn parse_frequency(value: Option<&serde_json::Value>) -> u8 {
    let n = match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    n.map(|n| n.clamp(1, 2) as u8).unwrap_or(1)
}
