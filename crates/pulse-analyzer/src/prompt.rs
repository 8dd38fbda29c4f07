use serde_json::{json, Value};

/// Prompt for a single feedback item.
pub fn analysis_prompt(feedback: &str) -> String {
    format!(
        r#"You are analyzing user feedback.

Return ONLY valid JSON with exactly this structure:

{{
  "sentiment": "positive" | "neutral" | "negative",
  "key_topics": ["topic1", "topic2"],
  "action_required": boolean,
  "summary": "a summary of at least 5-7 words"
}}

Feedback:
"""{feedback}""""#
    )
}

/// Prompt for a batch of items. Items are enumerated `1. "…"` so the model
/// can keep positions straight; the response must contain exactly one
/// analysis per item, in order.
pub fn batch_analysis_prompt(texts: &[String]) -> String {
    let mut numbered = String::new();
    for (i, text) in texts.iter().enumerate() {
        numbered.push_str(&format!("{}. \"{}\"\n", i + 1, text));
    }
    format!(
        r#"You are analyzing a batch of user feedback items.

Return ONLY valid JSON: an object with an "analyses" array containing exactly {count} analysis objects, one per feedback item, in the same order as listed.

Each analysis object has exactly this structure:

{{
  "sentiment": "positive" | "neutral" | "negative",
  "key_topics": ["topic1", "topic2"],
  "action_required": boolean,
  "summary": "a summary of at least 5-7 words"
}}

Feedback items:
{numbered}"#,
        count = texts.len()
    )
}

/// Expected result schema for a single analysis.
pub fn analysis_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "sentiment": { "type": "string", "enum": ["positive", "neutral", "negative"] },
            "key_topics": { "type": "array", "items": { "type": "string" } },
            "action_required": { "type": "boolean" },
            "summary": { "type": "string" },
        },
        "required": ["sentiment", "key_topics", "action_required", "summary"],
    })
}

/// Expected result schema for a batch of exactly `count` analyses.
pub fn batch_schema(count: usize) -> Value {
    json!({
        "type": "object",
        "properties": {
            "analyses": {
                "type": "array",
                "items": analysis_schema(),
                "minItems": count,
                "maxItems": count,
            },
        },
        "required": ["analyses"],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_prompt_carries_text_and_fields() {
        let prompt = analysis_prompt("Great product!");
        assert!(prompt.contains("Great product!"));
        assert!(prompt.contains("sentiment"));
        assert!(prompt.contains("key_topics"));
    }

    #[test]
    fn batch_prompt_enumerates_and_pins_count() {
        let texts = vec![
            "Text 1".to_string(),
            "Text 2".to_string(),
            "Text 3".to_string(),
        ];
        let prompt = batch_analysis_prompt(&texts);
        assert!(prompt.contains(r#"1. "Text 1""#));
        assert!(prompt.contains(r#"2. "Text 2""#));
        assert!(prompt.contains(r#"3. "Text 3""#));
        assert!(prompt.contains("exactly 3 analysis objects"));
    }

    #[test]
    fn batch_schema_pins_length() {
        let schema = batch_schema(4);
        assert_eq!(schema["properties"]["analyses"]["minItems"], 4);
        assert_eq!(schema["properties"]["analyses"]["maxItems"], 4);
    }
}
