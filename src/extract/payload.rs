//! Best-effort text mining from JSON payloads embedded in `<script>` tags.
//! Markup-version fragile; only consulted when enabled in config.

use std::sync::LazyLock;

use scraper::{ElementRef, Selector};
use serde_json::Value;

use crate::extract::{Extraction, ExtractionOutcome};

const MAX_DEPTH: usize = 64;

static JSON_SCRIPTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script[type=\"application/json\"]").unwrap());

pub(crate) fn mine_payload_text(root: &ElementRef<'_>) -> Extraction<Vec<String>> {
    let mut found = Vec::new();
    let mut malformed = 0usize;

    for script in root.select(&JSON_SCRIPTS) {
        let raw: String = script.text().collect();
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => collect_messages(&value, 0, &mut found),
            Err(_) => malformed += 1,
        }
    }

    if !found.is_empty() {
        found.dedup();
        Ok(found)
    } else if malformed > 0 {
        Err(ExtractionOutcome::Malformed(format!(
            "{} unparseable script payload(s)",
            malformed
        )))
    } else {
        Err(ExtractionOutcome::NotFound)
    }
}

/// Collect every `message.text` string in the payload.
fn collect_messages(value: &Value, depth: usize, out: &mut Vec<String>) {
    if depth > MAX_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            if let Some(text) = map
                .get("message")
                .and_then(|m| m.get("text"))
                .and_then(Value::as_str)
            {
                let text = text.trim();
                if !text.is_empty() && !out.iter().any(|t| t == text) {
                    out.push(text.to_string());
                }
            }
            for child in map.values() {
                collect_messages(child, depth + 1, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_messages(child, depth + 1, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn mine(html: &str) -> Extraction<Vec<String>> {
        let doc = Html::parse_fragment(html);
        let root = doc
            .root_element()
            .children()
            .find_map(ElementRef::wrap)
            .unwrap();
        mine_payload_text(&root)
    }

    #[test]
    fn test_nested_story_message() {
        let found = mine(
            r#"<div><script type="application/json">{"data":{"story":{"message":{"text":"Hidden full text"}},"attachments":[{"message":{"text":"Second"}}]}}</script></div>"#,
        )
        .unwrap();
        assert_eq!(found, vec!["Hidden full text", "Second"]);
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            mine(r#"<div><script type="application/json">{not json</script></div>"#),
            Err(ExtractionOutcome::Malformed(_))
        ));
    }

    #[test]
    fn test_no_payload() {
        assert_eq!(mine("<div>plain</div>"), Err(ExtractionOutcome::NotFound));
    }
}
