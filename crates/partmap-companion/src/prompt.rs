use partmap_core::{
    ImpressionCollections, JournalEntry, MapGraph, Node, NodeId, NodePayload, PartData, PartType,
};

const COMPANION: &str = include_str!("../prompts/companion.md");
const PART_ANALYSIS: &str = include_str!("../prompts/part_analysis.md");
const IMPRESSION_SUGGESTIONS: &str = include_str!("../prompts/impression_suggestions.md");
const JOURNAL_REFLECTION: &str = include_str!("../prompts/journal_reflection.md");

fn label_of<'a>(id: &'a NodeId, map: &'a MapGraph) -> &'a str {
    map.node(id).map(Node::label).unwrap_or(id.as_str())
}

fn part_type_str(t: PartType) -> &'static str {
    match t {
        PartType::Manager => "manager",
        PartType::Firefighter => "firefighter",
        PartType::Exile => "exile",
        PartType::Custom => "custom",
    }
}

fn push_field(out: &mut String, name: &str, value: &str) {
    if value.trim().is_empty() {
        return;
    }
    out.push_str("  ");
    out.push_str(name);
    out.push_str(": \"");
    // Long free text is truncated on a char boundary
    if value.chars().count() > 200 {
        out.extend(value.chars().take(200));
        out.push_str("...");
    } else {
        out.push_str(value);
    }
    out.push_str("\"\n");
}

fn push_impressions(out: &mut String, impressions: &ImpressionCollections) {
    for category in partmap_core::ImpressionCategory::ALL {
        let items = impressions.get(category);
        if items.is_empty() {
            continue;
        }
        out.push_str("  ");
        out.push_str(category.collection_name());
        out.push_str(": ");
        let labels: Vec<&str> = items.iter().map(|i| i.data.label.as_str()).collect();
        out.push_str(&labels.join("; "));
        out.push('\n');
    }
}

fn push_part(out: &mut String, id: &NodeId, part: &PartData) {
    out.push_str("[Part] ");
    out.push_str(id.as_str());
    out.push_str(" \"");
    out.push_str(&part.label);
    out.push('"');
    if let Some(t) = part.part_type {
        out.push_str(" (");
        out.push_str(part_type_str(t));
        out.push(')');
    }
    out.push('\n');
    push_impressions(out, &part.impressions);
    push_field(out, "needs", &part.needs);
    push_field(out, "fears", &part.fears);
    push_field(out, "image", &part.image);
}

/// Convert a map to a compact text representation for LLM consumption.
pub fn serialize_map(map: &MapGraph) -> String {
    let mut out = String::with_capacity(2048);

    out.push_str("PARTS:\n");
    for node in &map.nodes {
        if let NodePayload::Part(part) = &node.payload {
            push_part(&mut out, &node.id, part);
        }
    }

    let relationships: Vec<&Node> = map.nodes.iter().filter(|n| n.is_relationship()).collect();
    if !relationships.is_empty() {
        out.push_str("RELATIONSHIPS:\n");
        for node in relationships {
            let Some(rel) = node.as_relationship() else {
                continue;
            };
            out.push_str("[Rel] ");
            out.push_str(node.id.as_str());
            out.push_str(" \"");
            out.push_str(&rel.label);
            out.push_str("\"\n");
            for member in &rel.connected_nodes {
                out.push_str("  - ");
                out.push_str(label_of(&member.part_id, map));
                if !member.description.is_empty() {
                    out.push_str(": ");
                    out.push_str(&member.description);
                }
                out.push('\n');
            }
        }
    }

    let floating: Vec<&Node> = map
        .nodes
        .iter()
        .filter(|n| n.as_impression().is_some())
        .collect();
    if !floating.is_empty() || !map.sidebar_impressions.is_empty() {
        out.push_str("UNASSIGNED IMPRESSIONS:\n");
        for node in floating {
            if let Some(imp) = node.as_impression() {
                out.push_str("  ");
                out.push_str(imp.category.as_str());
                out.push_str(": ");
                out.push_str(&imp.label);
                out.push('\n');
            }
        }
        for (category, imp) in map.sidebar_impressions.iter() {
            out.push_str("  ");
            out.push_str(category.as_str());
            out.push_str(": ");
            out.push_str(&imp.data.label);
            out.push_str(" (sidebar)\n");
        }
    }

    out
}

/// Text for a single part, followed by the relationships it belongs to.
pub fn serialize_part(map: &MapGraph, id: &NodeId) -> Option<String> {
    let part = map.part(id)?;
    let mut out = String::new();
    push_part(&mut out, id, part);
    for node in &map.nodes {
        let Some(rel) = node.as_relationship() else {
            continue;
        };
        let Some(member) = rel.member(id) else {
            continue;
        };
        out.push_str("  in relationship \"");
        out.push_str(&rel.label);
        out.push_str("\" with ");
        let others: Vec<&str> = rel
            .connected_nodes
            .iter()
            .filter(|m| &m.part_id != id)
            .map(|m| label_of(&m.part_id, map))
            .collect();
        out.push_str(&if others.is_empty() {
            "no one yet".to_string()
        } else {
            others.join(", ")
        });
        if !member.description.is_empty() {
            out.push_str(" | its side: \"");
            out.push_str(&member.description);
            out.push('"');
        }
        out.push('\n');
    }
    Some(out)
}

fn with_guide(template: &str) -> String {
    format!(
        "{}\n\n## Mapping conventions\n{}",
        template.trim_end(),
        partmap_core::guide::GUIDE
    )
}

pub fn companion_system(map: &MapGraph) -> String {
    format!("{}\n\n## Current map\n{}", with_guide(COMPANION), serialize_map(map))
}

pub fn part_analysis_system() -> String {
    with_guide(PART_ANALYSIS)
}

pub fn impression_suggestions_system() -> String {
    with_guide(IMPRESSION_SUGGESTIONS)
}

pub fn journal_reflection_system() -> String {
    with_guide(JOURNAL_REFLECTION)
}

pub fn part_message(map: &MapGraph, part_text: &str) -> String {
    format!("MAP:\n{}\nFOCUS PART:\n{}", serialize_map(map), part_text)
}

/// The journal entry as plain text. The editor document is flattened to its
/// text nodes; the structure itself carries nothing the model needs.
pub fn journal_message(entry: &JournalEntry, map: Option<&MapGraph>) -> String {
    let mut out = String::new();
    if !entry.title.is_empty() {
        out.push_str("TITLE: ");
        out.push_str(&entry.title);
        out.push('\n');
    }
    if let (Some(map), Some(part_id)) = (map, &entry.part_id) {
        if let Some(part_text) = serialize_part(map, part_id) {
            out.push_str("WRITTEN ABOUT:\n");
            out.push_str(&part_text);
        }
    }
    out.push_str("ENTRY:\n");
    out.push_str(&document_text(&entry.content));
    out
}

/// Collect the `text` leaves of a rich-text document, one block per line.
pub fn document_text(doc: &serde_json::Value) -> String {
    fn walk(val: &serde_json::Value, out: &mut String) {
        match val {
            serde_json::Value::String(s) => out.push_str(s),
            serde_json::Value::Object(map) => {
                if let Some(serde_json::Value::String(text)) = map.get("text") {
                    out.push_str(text);
                }
                if let Some(children) = map.get("content") {
                    walk(children, out);
                    if map.get("type").and_then(|t| t.as_str()) != Some("doc")
                        && !out.ends_with('\n')
                    {
                        out.push('\n');
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    walk(item, out);
                }
            }
            _ => {}
        }
    }

    let mut out = String::new();
    walk(doc, &mut out);
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use partmap_core::{Impression, ImpressionCategory, NodeKind, Position};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> (MapGraph, NodeId) {
        let mut map = MapGraph::new();
        let critic = map.create_node(NodeKind::Part, Position::default(), "Critic").id;
        let rester = map.create_node(NodeKind::Part, Position::default(), "Rester").id;
        let rel = map
            .create_node(NodeKind::Relationship, Position::default(), "Work vs rest")
            .id;
        map.add_part_to_relationship(&rel, &critic).unwrap();
        map.add_part_to_relationship(&rel, &rester).unwrap();
        map.update_member_description(&rel, &critic, "keep going");
        map.insert_impression_to_part(
            Impression::new(NodeId::from("node-9"), "tight jaw", ImpressionCategory::Sensation),
            &critic,
            ImpressionCategory::Sensation,
        )
        .unwrap();
        map.add_sidebar_impression(ImpressionCategory::Emotion, "dread");
        (map, critic)
    }

    #[test]
    fn map_text_lists_parts_relationships_and_loose_impressions() {
        let (map, _) = sample();
        let text = serialize_map(&map);
        assert!(text.contains("[Part] node-1 \"Critic\""));
        assert!(text.contains("  sensations: tight jaw\n"));
        assert!(text.contains("  - Critic: keep going\n"));
        assert!(text.contains("  - Rester\n"));
        assert!(text.contains("  emotion: dread (sidebar)\n"));
    }

    #[test]
    fn part_text_names_relationship_partners() {
        let (map, critic) = sample();
        let text = serialize_part(&map, &critic).unwrap();
        assert!(text.contains("in relationship \"Work vs rest\" with Rester | its side: \"keep going\""));
        assert!(serialize_part(&map, &NodeId::from("node-3")).is_none());
    }

    #[test]
    fn document_text_flattens_editor_json() {
        let doc = json!({
            "type": "doc",
            "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "I noticed "}, {"type": "text", "text": "the critic."}]},
                {"type": "paragraph", "content": [{"type": "text", "text": "Then it softened."}]}
            ]
        });
        assert_eq!(document_text(&doc), "I noticed the critic.\nThen it softened.");
        assert_eq!(document_text(&json!("plain")), "plain");
    }

    #[test]
    fn system_prompts_carry_the_guide() {
        assert!(part_analysis_system().contains("## Mapping conventions"));
        assert!(companion_system(&MapGraph::new()).contains("## Current map\nPARTS:\n"));
    }
}
