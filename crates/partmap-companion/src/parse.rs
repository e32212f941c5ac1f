use partmap_core::{ImpressionCategory, PartData};

use crate::SuggestedImpression;

#[derive(serde::Deserialize)]
struct LlmSuggestion {
    category: String,
    label: String,
}

/// Parse raw LLM output into impression suggestions for `part`. Unknown
/// categories, blank labels and impressions the part already has are dropped.
/// Returns empty vec on total parse failure (graceful degradation).
pub fn parse_llm_output(raw: &str, part: &PartData) -> Vec<SuggestedImpression> {
    let json_str = match extract_json_array(raw) {
        Some(s) => s,
        None => return vec![],
    };

    // Try full array parse first
    let suggestions: Vec<LlmSuggestion> = match serde_json::from_str(&json_str) {
        Ok(s) => s,
        Err(_) => parse_object_by_object(&json_str),
    };

    let mut out: Vec<SuggestedImpression> = Vec::new();
    for s in suggestions {
        let Some(category) = ImpressionCategory::parse(s.category.trim().to_lowercase().as_str())
        else {
            continue;
        };
        let label = s.label.trim().to_string();
        if label.is_empty() || already_present(part, &label) {
            continue;
        }
        if out.iter().any(|o| o.label.eq_ignore_ascii_case(&label)) {
            continue;
        }
        out.push(SuggestedImpression { category, label });
    }
    out
}

fn already_present(part: &PartData, label: &str) -> bool {
    part.impressions
        .iter()
        .any(|(_, i)| i.data.label.trim().eq_ignore_ascii_case(label))
}

/// Extract the JSON array substring from raw LLM output.
fn extract_json_array(raw: &str) -> Option<String> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end <= start {
        return None;
    }
    Some(raw[start..=end].to_string())
}

/// Try to parse individual objects from a malformed JSON array.
fn parse_object_by_object(json_str: &str) -> Vec<LlmSuggestion> {
    let inner = json_str
        .trim()
        .strip_prefix('[')
        .unwrap_or(json_str)
        .strip_suffix(']')
        .unwrap_or(json_str);

    let mut items = Vec::new();
    let mut depth = 0;
    let mut start = None;

    for (i, ch) in inner.char_indices() {
        match ch {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        if let Ok(item) = serde_json::from_str::<LlmSuggestion>(&inner[s..=i]) {
                            items.push(item);
                        }
                    }
                    start = None;
                }
            }
            _ => {}
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use partmap_core::{Impression, NodeId};
    use pretty_assertions::assert_eq;

    fn part_with(label: &str) -> PartData {
        let mut part = PartData::default();
        part.impressions
            .emotions
            .push(Impression::new(NodeId::from("node-1"), label, ImpressionCategory::Emotion));
        part
    }

    #[test]
    fn parses_array_wrapped_in_prose() {
        let raw = "Here you go:\n```json\n[{\"category\":\"emotion\",\"label\":\"grief\"},\
                   {\"category\":\"self\",\"label\":\"curiosity\"}]\n```";
        let got = parse_llm_output(raw, &PartData::default());
        assert_eq!(
            got,
            vec![
                SuggestedImpression {
                    category: ImpressionCategory::Emotion,
                    label: "grief".into()
                },
                SuggestedImpression {
                    category: ImpressionCategory::SelfEnergy,
                    label: "curiosity".into()
                },
            ]
        );
    }

    #[test]
    fn salvages_objects_from_broken_array() {
        let raw = "[{\"category\":\"thought\",\"label\":\"I'm failing\"}, {\"category\":, }, \
                   {\"category\":\"Behaviors\",\"label\":\"overworking\"}";
        // no closing bracket: nothing to extract
        assert!(parse_llm_output(raw, &PartData::default()).is_empty());

        let raw = format!("{raw}]");
        let got = parse_llm_output(&raw, &PartData::default());
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].category, ImpressionCategory::Behavior);
    }

    #[test]
    fn drops_known_duplicate_and_unknown_entries() {
        let raw = r#"[
            {"category":"emotion","label":"Anger"},
            {"category":"mood","label":"grumpy"},
            {"category":"thought","label":"  "},
            {"category":"sensation","label":"heat"},
            {"category":"sensation","label":"HEAT"}
        ]"#;
        let got = parse_llm_output(raw, &part_with("anger"));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].label, "heat");
    }
}
