use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Identifiers ---

/// Identifier of a node. Unique across every node kind within one map,
/// including impressions held inside parts or the sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric suffix of a `node-{N}` id, if it has one.
    pub fn sequence(&self) -> Option<u64> {
        self.0.strip_prefix("node-").and_then(|s| s.parse::<u64>().ok())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(transparent)]
pub struct EdgeId(pub String);

impl EdgeId {
    /// Edge ids are derived from their endpoints, so one part/relationship
    /// pair can only ever have one edge.
    pub fn between(source: &NodeId, target: &NodeId) -> Self {
        Self(format!("edge-{}-{}", source, target))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Geometry ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, schemars::JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, schemars::JsonSchema)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

// --- Categories ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum PartType {
    Manager,
    Firefighter,
    Exile,
    Custom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ImpressionCategory {
    Emotion,
    Thought,
    Sensation,
    Behavior,
    Other,
    #[serde(rename = "self")]
    SelfEnergy,
}

impl ImpressionCategory {
    pub const ALL: [ImpressionCategory; 6] = [
        ImpressionCategory::Emotion,
        ImpressionCategory::Thought,
        ImpressionCategory::Sensation,
        ImpressionCategory::Behavior,
        ImpressionCategory::Other,
        ImpressionCategory::SelfEnergy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ImpressionCategory::Emotion => "emotion",
            ImpressionCategory::Thought => "thought",
            ImpressionCategory::Sensation => "sensation",
            ImpressionCategory::Behavior => "behavior",
            ImpressionCategory::Other => "other",
            ImpressionCategory::SelfEnergy => "self",
        }
    }

    /// Name of the collection this category is filed under on a part.
    pub fn collection_name(self) -> &'static str {
        match self {
            ImpressionCategory::Emotion => "emotions",
            ImpressionCategory::Thought => "thoughts",
            ImpressionCategory::Sensation => "sensations",
            ImpressionCategory::Behavior => "behaviors",
            ImpressionCategory::Other => "others",
            ImpressionCategory::SelfEnergy => "self",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.collection_name() == s)
    }
}

impl fmt::Display for ImpressionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Node payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImpressionData {
    pub label: String,
    pub category: ImpressionCategory,
    /// Back-reference to the part holding this impression. Lookup only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_id: Option<NodeId>,
}

/// An impression held in a collection (a part or the sidebar) rather than
/// placed on the canvas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Impression {
    pub id: NodeId,
    pub data: ImpressionData,
}

impl Impression {
    pub fn new(id: NodeId, label: impl Into<String>, category: ImpressionCategory) -> Self {
        Self {
            id,
            data: ImpressionData {
                label: label.into(),
                category,
                part_id: None,
            },
        }
    }
}

/// The six impression collections, one per category.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImpressionCollections {
    #[serde(default)]
    pub emotions: Vec<Impression>,
    #[serde(default)]
    pub thoughts: Vec<Impression>,
    #[serde(default)]
    pub sensations: Vec<Impression>,
    #[serde(default)]
    pub behaviors: Vec<Impression>,
    #[serde(default)]
    pub others: Vec<Impression>,
    #[serde(default, rename = "self")]
    pub self_energy: Vec<Impression>,
}

impl ImpressionCollections {
    pub fn get(&self, category: ImpressionCategory) -> &Vec<Impression> {
        match category {
            ImpressionCategory::Emotion => &self.emotions,
            ImpressionCategory::Thought => &self.thoughts,
            ImpressionCategory::Sensation => &self.sensations,
            ImpressionCategory::Behavior => &self.behaviors,
            ImpressionCategory::Other => &self.others,
            ImpressionCategory::SelfEnergy => &self.self_energy,
        }
    }

    pub fn get_mut(&mut self, category: ImpressionCategory) -> &mut Vec<Impression> {
        match category {
            ImpressionCategory::Emotion => &mut self.emotions,
            ImpressionCategory::Thought => &mut self.thoughts,
            ImpressionCategory::Sensation => &mut self.sensations,
            ImpressionCategory::Behavior => &mut self.behaviors,
            ImpressionCategory::Other => &mut self.others,
            ImpressionCategory::SelfEnergy => &mut self.self_energy,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ImpressionCategory, &Impression)> {
        ImpressionCategory::ALL
            .into_iter()
            .flat_map(move |c| self.get(c).iter().map(move |i| (c, i)))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.iter().any(|(_, i)| &i.id == id)
    }

    /// Remove an impression from whichever collection holds it.
    pub fn take(&mut self, id: &NodeId) -> Option<Impression> {
        for category in ImpressionCategory::ALL {
            let items = self.get_mut(category);
            if let Some(idx) = items.iter().position(|i| &i.id == id) {
                return Some(items.remove(idx));
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        ImpressionCategory::ALL
            .into_iter()
            .map(|c| self.get(c).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartData {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_type: Option<PartType>,
    #[serde(flatten)]
    pub impressions: ImpressionCollections,
    #[serde(default)]
    pub needs: String,
    #[serde(default)]
    pub fears: String,
    /// Free-text description of how the part appears to the user.
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipMember {
    pub part_id: NodeId,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipData {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub connected_nodes: Vec<RelationshipMember>,
}

impl RelationshipData {
    pub fn member(&self, part_id: &NodeId) -> Option<&RelationshipMember> {
        self.connected_nodes.iter().find(|m| &m.part_id == part_id)
    }

    pub fn has_member(&self, part_id: &NodeId) -> bool {
        self.member(part_id).is_some()
    }
}

/// Kind-specific node payload, serialized the way ReactFlow expects:
/// a `type` discriminant next to a `data` object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum NodePayload {
    Part(PartData),
    Impression(ImpressionData),
    Relationship(RelationshipData),
}

/// What to create with `MapGraph::create_node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Part,
    Impression(ImpressionCategory),
    Relationship,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Part => "part",
            NodeKind::Impression(_) => "impression",
            NodeKind::Relationship => "relationship",
        }
    }
}

/// A node on the canvas. Matches ReactFlow's Node structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub position: Position,
    /// Rendered size reported by the canvas. Parts without one are not drop targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured: Option<Dimensions>,
    #[serde(flatten)]
    pub payload: NodePayload,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match &self.payload {
            NodePayload::Part(_) => NodeKind::Part,
            NodePayload::Impression(d) => NodeKind::Impression(d.category),
            NodePayload::Relationship(_) => NodeKind::Relationship,
        }
    }

    pub fn label(&self) -> &str {
        match &self.payload {
            NodePayload::Part(d) => &d.label,
            NodePayload::Impression(d) => &d.label,
            NodePayload::Relationship(d) => &d.label,
        }
    }

    pub fn as_part(&self) -> Option<&PartData> {
        match &self.payload {
            NodePayload::Part(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_part_mut(&mut self) -> Option<&mut PartData> {
        match &mut self.payload {
            NodePayload::Part(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_impression(&self) -> Option<&ImpressionData> {
        match &self.payload {
            NodePayload::Impression(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&RelationshipData> {
        match &self.payload {
            NodePayload::Relationship(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_relationship_mut(&mut self) -> Option<&mut RelationshipData> {
        match &mut self.payload {
            NodePayload::Relationship(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_part(&self) -> bool {
        matches!(self.payload, NodePayload::Part(_))
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self.payload, NodePayload::Relationship(_))
    }

    /// True when `point` lies inside the measured bounds, edges included.
    pub fn contains(&self, point: Position) -> bool {
        let Some(size) = self.measured else {
            return false;
        };
        point.x >= self.position.x
            && point.x <= self.position.x + size.width
            && point.y >= self.position.y
            && point.y <= self.position.y + size.height
    }

    pub fn center(&self) -> Position {
        let size = self.measured.unwrap_or_default();
        Position::new(
            self.position.x + size.width / 2.0,
            self.position.y + size.height / 2.0,
        )
    }
}

/// A connector between a part (source) and a relationship (target).
/// Matches ReactFlow's Edge structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            id: EdgeId::between(&source, &target),
            source,
            target,
        }
    }
}

/// Shallow update for a node's payload. Fields that don't apply to the
/// node's kind are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_type: Option<PartType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fears: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Impression category. Only applies to free-standing impression nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ImpressionCategory>,
}

// --- Documents ---

/// The full editable state of one map: what the canvas hydrates from and
/// what a save persists verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapGraph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub sidebar_impressions: ImpressionCollections,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapDocument {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub graph: MapGraph,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapSummary {
    pub id: String,
    pub name: String,
    pub updated_at: DateTime<Utc>,
    pub node_count: usize,
}

impl From<&MapDocument> for MapSummary {
    fn from(doc: &MapDocument) -> Self {
        Self {
            id: doc.id.clone(),
            name: doc.name.clone(),
            updated_at: doc.updated_at,
            node_count: doc.graph.nodes.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_id: Option<String>,
    /// The part this entry was written about, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_id: Option<NodeId>,
    #[serde(default)]
    pub title: String,
    /// Rich-text document produced by the editor, stored as-is.
    #[serde(default)]
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn part_node_serializes_like_reactflow() {
        let mut data = PartData {
            label: "Critic".into(),
            part_type: Some(PartType::Manager),
            ..Default::default()
        };
        data.impressions
            .self_energy
            .push(Impression::new(NodeId::from("node-2"), "calm", ImpressionCategory::SelfEnergy));
        let node = Node {
            id: NodeId::from("node-1"),
            position: Position::new(10.0, 20.0),
            measured: None,
            payload: NodePayload::Part(data),
        };

        let val = serde_json::to_value(&node).unwrap();
        assert_eq!(val["type"], json!("part"));
        assert_eq!(val["data"]["partType"], json!("manager"));
        assert_eq!(val["data"]["self"][0]["data"]["category"], json!("self"));
        assert_eq!(val["data"]["emotions"], json!([]));
        assert!(val.get("measured").is_none());
    }

    #[test]
    fn relationship_node_parses() {
        let raw = json!({
            "id": "node-7",
            "type": "relationship",
            "position": {"x": 1.0, "y": 2.0},
            "data": {
                "label": "Tug of war",
                "connectedNodes": [{"partId": "node-1", "description": "pulls back"}]
            }
        });
        let node: Node = serde_json::from_value(raw).unwrap();
        let rel = node.as_relationship().unwrap();
        assert_eq!(rel.connected_nodes[0].part_id, NodeId::from("node-1"));
        assert_eq!(node.kind(), NodeKind::Relationship);
    }

    #[test]
    fn containment_includes_edges() {
        let node = Node {
            id: NodeId::from("node-1"),
            position: Position::new(100.0, 100.0),
            measured: Some(Dimensions::new(200.0, 150.0)),
            payload: NodePayload::Part(PartData::default()),
        };
        assert!(node.contains(Position::new(100.0, 100.0)));
        assert!(node.contains(Position::new(300.0, 250.0)));
        assert!(!node.contains(Position::new(300.1, 250.0)));
    }

    #[test]
    fn category_parse_accepts_both_spellings() {
        assert_eq!(ImpressionCategory::parse("self"), Some(ImpressionCategory::SelfEnergy));
        assert_eq!(ImpressionCategory::parse("thoughts"), Some(ImpressionCategory::Thought));
        assert_eq!(ImpressionCategory::parse("feelings"), None);
    }
}
