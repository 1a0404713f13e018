/// Prompt sent with every prescription upload. The model must answer with the
/// `{"medicines": [...]}` JSON contract read by `parse_medicine_response`.
pub const EXTRACT_MEDICINE_INFO: &str = r#"Extract medicine information from this prescription and return ONLY a valid JSON response in the following exact format:

{
  "medicines": [
    {
      "name": "Medicine name",
      "when_to_take": "Morning",
      "frequency": 1
    }
  ]
}

CRITICAL RULES:
1. "when_to_take" must be EXACTLY one of: "Morning", "Evening", or "Both"
2. "frequency" must be a number: 1 (once daily) or 2 (twice daily)
3. If dosage timing is not mentioned or unclear, use "Morning" as default
4. If frequency is not mentioned or unclear, use 1 as default
5. Return ONLY the JSON object, no additional text or explanation

Common prescription patterns to recognize:
- "OD" / "Once daily" / "1 time" = frequency: 1
- "BD" / "BID" / "Twice daily" / "2 times" = frequency: 2
- "Morning" / "AM" / "Before breakfast" = when_to_take: "Morning"
- "Evening" / "PM" / "Before dinner" / "Night" = when_to_take: "Evening"
- "Morning and evening" / "AM & PM" / "Twice" = when_to_take: "Both"

If no medicines are found, return: {"medicines": []}"#;
