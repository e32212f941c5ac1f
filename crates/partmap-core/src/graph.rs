//! Graph state for one open map.
//!
//! Every mutation keeps three things in step: relationship membership mirrors
//! the part→relationship edges, each impression id lives in exactly one place
//! (the canvas, one part, or the sidebar), and node ids stay unique.
//! `delete_node` is the one deliberate exception; it removes a single node and
//! leaves cascading to `remove_node`.

use std::collections::{HashMap, HashSet};

use crate::error::GraphError;
use crate::model::{
    Dimensions, Edge, EdgeId, Impression, ImpressionCategory, ImpressionData, MapGraph, Node,
    NodeId, NodeKind, NodePatch, NodePayload, PartData, Position, RelationshipData,
    RelationshipMember,
};

/// Result of dropping something onto the canvas.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    /// The node stayed on the canvas.
    Moved,
    /// The impression was filed into this part.
    Attached { part_id: NodeId },
    /// A sidebar impression became a free-standing canvas node.
    Placed { node_id: NodeId },
}

/// A broken invariant found by `MapGraph::violations`.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    DuplicateId(NodeId),
    DanglingEdge { edge: EdgeId, missing: NodeId },
    EdgeNotPartToRelationship(EdgeId),
    EdgeWithoutMembership(EdgeId),
    MembershipWithoutEdge { relationship: NodeId, part: NodeId },
    ImpressionOwnedTwice(NodeId),
    MisfiledImpression { part: NodeId, impression: NodeId },
}

impl MapGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Lookup ---

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    pub fn part(&self, id: &NodeId) -> Option<&PartData> {
        self.node(id).and_then(Node::as_part)
    }

    pub fn relationship(&self, id: &NodeId) -> Option<&RelationshipData> {
        self.node(id).and_then(Node::as_relationship)
    }

    pub fn parts(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_part())
    }

    /// The part whose collections currently hold `impression_id`.
    pub fn owner_of(&self, impression_id: &NodeId) -> Option<&NodeId> {
        self.nodes
            .iter()
            .find(|n| n.as_part().is_some_and(|p| p.impressions.contains(impression_id)))
            .map(|n| &n.id)
    }

    /// A copy of the impression with `id`, whether it is a canvas node, filed
    /// on a part or waiting in the sidebar.
    pub fn impression(&self, id: &NodeId) -> Option<Impression> {
        if let Some(node) = self.node(id) {
            return node.as_impression().map(|data| Impression {
                id: id.clone(),
                data: data.clone(),
            });
        }
        self.nodes
            .iter()
            .filter_map(Node::as_part)
            .flat_map(|p| p.impressions.iter())
            .chain(self.sidebar_impressions.iter())
            .find(|(_, i)| &i.id == id)
            .map(|(_, i)| i.clone())
    }

    /// Every node id in use, wherever the node currently lives.
    fn all_ids(&self) -> impl Iterator<Item = &NodeId> {
        let attached = self
            .nodes
            .iter()
            .filter_map(Node::as_part)
            .flat_map(|p| p.impressions.iter().map(|(_, i)| &i.id));
        let sidebar = self.sidebar_impressions.iter().map(|(_, i)| &i.id);
        self.nodes.iter().map(|n| &n.id).chain(attached).chain(sidebar)
    }

    /// "node-{N}" with N one past the highest sequence anywhere in the map,
    /// including impressions filed on parts or parked in the sidebar.
    /// If the highest sequence is already `u64::MAX`, the lowest unused
    /// sequence is handed out instead.
    pub fn next_node_id(&self) -> NodeId {
        let max = self.all_ids().filter_map(NodeId::sequence).max().unwrap_or(0);
        let next = match max.checked_add(1) {
            Some(next) => next,
            None => {
                let used: HashSet<u64> = self.all_ids().filter_map(NodeId::sequence).collect();
                (1..=u64::MAX).find(|n| !used.contains(n)).unwrap_or(0)
            }
        };
        NodeId(format!("node-{}", next))
    }

    // --- Node lifecycle ---

    pub fn create_node(&mut self, kind: NodeKind, position: Position, label: &str) -> Node {
        let id = self.next_node_id();
        let label = label.to_string();
        let payload = match kind {
            NodeKind::Part => NodePayload::Part(PartData {
                label,
                ..Default::default()
            }),
            NodeKind::Impression(category) => NodePayload::Impression(ImpressionData {
                label,
                category,
                part_id: None,
            }),
            NodeKind::Relationship => NodePayload::Relationship(RelationshipData {
                label,
                connected_nodes: Vec::new(),
            }),
        };
        let node = Node {
            id,
            position,
            measured: None,
            payload,
        };
        tracing::debug!(id = %node.id, kind = kind.as_str(), "created node");
        self.nodes.push(node.clone());
        node
    }

    /// Remove a node and nothing else. Edges and memberships that point at it
    /// are left for the caller; see `remove_node` for the cascading form.
    pub fn delete_node(&mut self, id: &NodeId) -> Option<Node> {
        let idx = self.nodes.iter().position(|n| &n.id == id)?;
        Some(self.nodes.remove(idx))
    }

    /// Remove a node together with every edge touching it and every
    /// membership entry naming it.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let removed = self.delete_node(id)?;
        self.edges.retain(|e| &e.source != id && &e.target != id);
        if removed.is_part() {
            for node in &mut self.nodes {
                if let Some(rel) = node.as_relationship_mut() {
                    rel.connected_nodes.retain(|m| &m.part_id != id);
                }
            }
        }
        tracing::debug!(%id, "removed node with dependents");
        Some(removed)
    }

    pub fn update_node(&mut self, id: &NodeId, patch: &NodePatch) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        match &mut node.payload {
            NodePayload::Part(d) => {
                if let Some(label) = &patch.label {
                    d.label = label.clone();
                }
                if let Some(t) = patch.part_type {
                    d.part_type = Some(t);
                }
                if let Some(needs) = &patch.needs {
                    d.needs = needs.clone();
                }
                if let Some(fears) = &patch.fears {
                    d.fears = fears.clone();
                }
                if let Some(image) = &patch.image {
                    d.image = image.clone();
                }
            }
            NodePayload::Impression(d) => {
                if let Some(label) = &patch.label {
                    d.label = label.clone();
                }
                if let Some(category) = patch.category {
                    d.category = category;
                }
            }
            NodePayload::Relationship(d) => {
                if let Some(label) = &patch.label {
                    d.label = label.clone();
                }
            }
        }
        true
    }

    pub fn move_node(&mut self, id: &NodeId, position: Position) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.position = position;
                true
            }
            None => false,
        }
    }

    pub fn set_measured(&mut self, id: &NodeId, size: Dimensions) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.measured = Some(size);
                true
            }
            None => false,
        }
    }

    // --- Impressions ---

    fn require_part(&self, part_id: &NodeId) -> Result<(), GraphError> {
        match self.node(part_id) {
            None => Err(GraphError::PartNotFound(part_id.clone())),
            Some(n) if !n.is_part() => Err(GraphError::not_a_part(part_id, n.kind())),
            Some(_) => Ok(()),
        }
    }

    /// Take an impression id out of every place it might live.
    fn take_impression_everywhere(&mut self, id: &NodeId) {
        self.nodes
            .retain(|n| !(&n.id == id && matches!(n.payload, NodePayload::Impression(_))));
        for node in &mut self.nodes {
            if let Some(part) = node.as_part_mut() {
                part.impressions.take(id);
            }
        }
        self.sidebar_impressions.take(id);
    }

    /// File `impression` into `category` on the part. Whatever copy of the
    /// impression existed before (canvas, another part, sidebar) is removed in
    /// the same step. A missing target is rejected and nothing changes.
    pub fn insert_impression_to_part(
        &mut self,
        mut impression: Impression,
        part_id: &NodeId,
        category: ImpressionCategory,
    ) -> Result<(), GraphError> {
        self.require_part(part_id)?;
        if let Some(node) = self.node(&impression.id) {
            if node.as_impression().is_none() {
                return Err(GraphError::NotAnImpression {
                    id: impression.id.clone(),
                    kind: node.kind().as_str(),
                });
            }
        }
        self.take_impression_everywhere(&impression.id);

        impression.data.category = category;
        impression.data.part_id = Some(part_id.clone());
        tracing::debug!(impression = %impression.id, part = %part_id, %category, "attached impression");

        let part = self
            .node_mut(part_id)
            .and_then(Node::as_part_mut)
            .ok_or_else(|| GraphError::PartNotFound(part_id.clone()))?;
        part.impressions.get_mut(category).push(impression);
        Ok(())
    }

    /// Remove an impression from one of a part's collections. The impression is
    /// handed back but not put anywhere; `release_impression` puts it on the canvas.
    pub fn detach_impression_from_part(
        &mut self,
        impression_id: &NodeId,
        part_id: &NodeId,
        category: ImpressionCategory,
    ) -> Option<Impression> {
        let part = self.node_mut(part_id)?.as_part_mut()?;
        let items = part.impressions.get_mut(category);
        let idx = items.iter().position(|i| &i.id == impression_id)?;
        let mut impression = items.remove(idx);
        impression.data.part_id = None;
        Some(impression)
    }

    /// Detach an impression and place it back on the canvas at `position`.
    pub fn release_impression(
        &mut self,
        impression_id: &NodeId,
        part_id: &NodeId,
        category: ImpressionCategory,
        position: Position,
    ) -> Option<NodeId> {
        let impression = self.detach_impression_from_part(impression_id, part_id, category)?;
        let id = impression.id.clone();
        self.nodes.push(Node {
            id: impression.id,
            position,
            measured: None,
            payload: NodePayload::Impression(impression.data),
        });
        Some(id)
    }

    // --- Relationships ---

    fn require_pair(&self, relationship_id: &NodeId, part_id: &NodeId) -> Result<(), GraphError> {
        match self.node(relationship_id) {
            None => return Err(GraphError::NodeNotFound(relationship_id.clone())),
            Some(n) if !n.is_relationship() => {
                return Err(GraphError::not_a_relationship(relationship_id, n.kind()))
            }
            Some(_) => {}
        }
        self.require_part(part_id)
    }

    /// Add a part to a relationship: the membership entry and the edge are
    /// written together. Adding an existing member returns its edge unchanged.
    pub fn add_part_to_relationship(
        &mut self,
        relationship_id: &NodeId,
        part_id: &NodeId,
    ) -> Result<EdgeId, GraphError> {
        self.require_pair(relationship_id, part_id)?;

        let edge = Edge::new(part_id.clone(), relationship_id.clone());
        let edge_id = edge.id.clone();
        if !self.edges.iter().any(|e| e.id == edge_id) {
            self.edges.push(edge);
        }
        if let Some(rel) = self.node_mut(relationship_id).and_then(Node::as_relationship_mut) {
            if !rel.has_member(part_id) {
                rel.connected_nodes.push(RelationshipMember {
                    part_id: part_id.clone(),
                    description: String::new(),
                });
            }
        }
        tracing::debug!(relationship = %relationship_id, part = %part_id, "joined relationship");
        Ok(edge_id)
    }

    /// Remove a part from a relationship, dropping both membership and edge.
    pub fn remove_part_from_relationship(
        &mut self,
        relationship_id: &NodeId,
        part_id: &NodeId,
    ) -> bool {
        let mut changed = false;
        if let Some(rel) = self.node_mut(relationship_id).and_then(Node::as_relationship_mut) {
            let before = rel.connected_nodes.len();
            rel.connected_nodes.retain(|m| &m.part_id != part_id);
            changed = rel.connected_nodes.len() != before;
        }
        let before = self.edges.len();
        self.edges
            .retain(|e| !(&e.source == part_id && &e.target == relationship_id));
        changed || self.edges.len() != before
    }

    pub fn update_member_description(
        &mut self,
        relationship_id: &NodeId,
        part_id: &NodeId,
        text: &str,
    ) -> bool {
        let Some(rel) = self.node_mut(relationship_id).and_then(Node::as_relationship_mut) else {
            return false;
        };
        match rel.connected_nodes.iter_mut().find(|m| &m.part_id == part_id) {
            Some(member) => {
                member.description = text.to_string();
                true
            }
            None => false,
        }
    }

    /// Handle a connection drawn on the canvas. Either end may be the part.
    pub fn connect(&mut self, source: &NodeId, target: &NodeId) -> Result<EdgeId, GraphError> {
        let source_node = self
            .node(source)
            .ok_or_else(|| GraphError::NodeNotFound(source.clone()))?;
        let target_node = self
            .node(target)
            .ok_or_else(|| GraphError::NodeNotFound(target.clone()))?;

        match (source_node.kind(), target_node.kind()) {
            (NodeKind::Part, NodeKind::Relationship) => self.add_part_to_relationship(target, source),
            (NodeKind::Relationship, NodeKind::Part) => self.add_part_to_relationship(source, target),
            (s, t) => Err(GraphError::InvalidConnection {
                source_kind: s.as_str(),
                target_kind: t.as_str(),
            }),
        }
    }

    /// Remove edges by id, along with the memberships they stand for.
    /// Returns how many edges were removed.
    pub fn remove_edges(&mut self, edge_ids: &[EdgeId]) -> usize {
        let wanted: HashSet<&EdgeId> = edge_ids.iter().collect();
        let (removed, kept): (Vec<Edge>, Vec<Edge>) = std::mem::take(&mut self.edges)
            .into_iter()
            .partition(|e| wanted.contains(&e.id));
        self.edges = kept;
        for edge in &removed {
            if let Some(rel) = self.node_mut(&edge.target).and_then(Node::as_relationship_mut) {
                rel.connected_nodes.retain(|m| m.part_id != edge.source);
            }
        }
        removed.len()
    }

    // --- Dropping ---

    /// The part that should receive something dropped at `point`: among the
    /// measured parts containing the point, the one whose centre is nearest.
    /// Equal distances go to the part that comes first in node order.
    pub fn drop_target(&self, point: Position) -> Option<&NodeId> {
        let mut best: Option<(&Node, f64)> = None;
        for part in self.parts().filter(|p| p.contains(point)) {
            let c = part.center();
            let dist = (c.x - point.x).powi(2) + (c.y - point.y).powi(2);
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((part, dist));
            }
        }
        best.map(|(n, _)| &n.id)
    }

    /// Finish a drag. A free-standing impression released over a part is
    /// filed into it; anything else just stays where it was dropped.
    pub fn on_node_drag_stop(
        &mut self,
        node_id: &NodeId,
        point: Position,
    ) -> Result<DropOutcome, GraphError> {
        let node = self
            .node(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(node_id.clone()))?;
        let NodePayload::Impression(data) = &node.payload else {
            return Ok(DropOutcome::Moved);
        };
        let Some(part_id) = self.drop_target(point).cloned() else {
            return Ok(DropOutcome::Moved);
        };
        let impression = Impression {
            id: node_id.clone(),
            data: data.clone(),
        };
        let category = impression.data.category;
        self.insert_impression_to_part(impression, &part_id, category)?;
        Ok(DropOutcome::Attached { part_id })
    }

    // --- Sidebar palette ---

    pub fn add_sidebar_impression(&mut self, category: ImpressionCategory, label: &str) -> NodeId {
        let id = self.next_node_id();
        self.sidebar_impressions
            .get_mut(category)
            .push(Impression::new(id.clone(), label, category));
        id
    }

    pub fn remove_sidebar_impression(&mut self, id: &NodeId) -> Option<Impression> {
        self.sidebar_impressions.take(id)
    }

    /// Drop a sidebar impression onto the canvas at `point`. Over a part it is
    /// filed into that part; elsewhere it becomes a free node keeping its id.
    pub fn place_sidebar_impression(
        &mut self,
        id: &NodeId,
        point: Position,
    ) -> Result<DropOutcome, GraphError> {
        if !self.sidebar_impressions.contains(id) {
            return Err(GraphError::NotInSidebar(id.clone()));
        }
        if let Some(part_id) = self.drop_target(point).cloned() {
            let impression = self
                .sidebar_impressions
                .take(id)
                .ok_or_else(|| GraphError::NotInSidebar(id.clone()))?;
            let category = impression.data.category;
            self.insert_impression_to_part(impression, &part_id, category)?;
            return Ok(DropOutcome::Attached { part_id });
        }

        let impression = self
            .sidebar_impressions
            .take(id)
            .ok_or_else(|| GraphError::NotInSidebar(id.clone()))?;
        self.nodes.push(Node {
            id: impression.id.clone(),
            position: point,
            measured: None,
            payload: NodePayload::Impression(impression.data),
        });
        Ok(DropOutcome::Placed {
            node_id: impression.id,
        })
    }

    // --- Invariants ---

    pub fn violations(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        let mut seen = HashSet::new();
        for id in self.all_ids() {
            if !seen.insert(id) {
                violations.push(Violation::DuplicateId(id.clone()));
            }
        }

        let mut owners: HashMap<&NodeId, usize> = HashMap::new();
        for node in &self.nodes {
            if let NodePayload::Impression(_) = node.payload {
                *owners.entry(&node.id).or_default() += 1;
            }
            if let Some(part) = node.as_part() {
                for (category, imp) in part.impressions.iter() {
                    *owners.entry(&imp.id).or_default() += 1;
                    if imp.data.category != category {
                        violations.push(Violation::MisfiledImpression {
                            part: node.id.clone(),
                            impression: imp.id.clone(),
                        });
                    }
                }
            }
        }
        for (_, imp) in self.sidebar_impressions.iter() {
            *owners.entry(&imp.id).or_default() += 1;
        }
        let mut twice: Vec<&NodeId> = owners
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(id, _)| id)
            .collect();
        twice.sort();
        violations.extend(twice.into_iter().cloned().map(Violation::ImpressionOwnedTwice));

        let mut edge_pairs = HashSet::new();
        for edge in &self.edges {
            let source = self.node(&edge.source);
            let target = self.node(&edge.target);
            match (source, target) {
                (None, _) => violations.push(Violation::DanglingEdge {
                    edge: edge.id.clone(),
                    missing: edge.source.clone(),
                }),
                (_, None) => violations.push(Violation::DanglingEdge {
                    edge: edge.id.clone(),
                    missing: edge.target.clone(),
                }),
                (Some(s), Some(t)) => {
                    if !s.is_part() || !t.is_relationship() {
                        violations.push(Violation::EdgeNotPartToRelationship(edge.id.clone()));
                    } else if !t.as_relationship().is_some_and(|r| r.has_member(&edge.source)) {
                        violations.push(Violation::EdgeWithoutMembership(edge.id.clone()));
                    }
                }
            }
            edge_pairs.insert((&edge.source, &edge.target));
        }

        for node in &self.nodes {
            if let Some(rel) = node.as_relationship() {
                for member in &rel.connected_nodes {
                    if !edge_pairs.contains(&(&member.part_id, &node.id)) {
                        violations.push(Violation::MembershipWithoutEdge {
                            relationship: node.id.clone(),
                            part: member.part_id.clone(),
                        });
                    }
                }
            }
        }

        violations
    }
}
