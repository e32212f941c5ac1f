use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};

use partmap_companion::{Role, Turn};
use partmap_core::{
    AiSettings, Dimensions, DropOutcome, ImpressionCategory, JournalEntry, JournalFilter,
    MapDocument, MapGraph, NodeId, NodeKind, NodePatch, PartType, Position, Store, UserId,
};

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct MapRequest {
    /// ID of the map (see list_maps)
    map_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CreateMapRequest {
    /// Display name for the new map
    name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RenameMapRequest {
    map_id: String,
    name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddNodeItem {
    /// Node kind: "part", "impression" or "relationship"
    kind: String,
    /// Display label, in the user's own words
    label: String,
    /// Impression category (impressions only): "emotion", "thought", "sensation", "behavior", "other" or "self"
    category: Option<String>,
    /// Part type (parts only): "manager", "firefighter", "exile" or "custom"
    part_type: Option<String>,
    /// X position on canvas. Default: auto-grid based on node count.
    x: Option<f64>,
    /// Y position on canvas. Default: auto-grid based on node count.
    y: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddNodesRequest {
    map_id: String,
    nodes: Vec<AddNodeItem>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct UpdateNodeItem {
    /// ID of the node to update (e.g. "node-3"). Omitted fields are left alone;
    /// fields that don't apply to the node's kind are ignored.
    node_id: NodeId,
    label: Option<String>,
    /// Parts only: "manager", "firefighter", "exile" or "custom"
    part_type: Option<String>,
    /// Parts only
    needs: Option<String>,
    /// Parts only
    fears: Option<String>,
    /// Parts only: how the part appears to the user
    image: Option<String>,
    /// Free impressions only: "emotion", "thought", "sensation", "behavior", "other" or "self"
    category: Option<String>,
}

impl UpdateNodeItem {
    fn to_patch(&self) -> Result<NodePatch, String> {
        Ok(NodePatch {
            label: self.label.clone(),
            part_type: self.part_type.as_deref().map(parse_part_type).transpose()?,
            needs: self.needs.clone(),
            fears: self.fears.clone(),
            image: self.image.clone(),
            category: self.category.as_deref().map(parse_category).transpose()?,
        })
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct UpdateNodesRequest {
    map_id: String,
    nodes: Vec<UpdateNodeItem>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct MoveNodeRequest {
    map_id: String,
    node_id: NodeId,
    x: f64,
    y: f64,
    /// Rendered width. Parts need a size to receive dropped impressions.
    width: Option<f64>,
    /// Rendered height
    height: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DeleteNodesRequest {
    map_id: String,
    node_ids: Vec<NodeId>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AttachImpressionRequest {
    map_id: String,
    /// ID of the impression: a canvas node, a sidebar item, or one already filed on another part
    impression_id: NodeId,
    part_id: NodeId,
    /// Category to file under. Default: the impression's current category.
    category: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DetachImpressionRequest {
    map_id: String,
    impression_id: NodeId,
    part_id: NodeId,
    /// Where to place the impression on the canvas. Default: the part's position.
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DropNodeRequest {
    map_id: String,
    node_id: NodeId,
    /// Drop point in canvas coordinates
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ConnectPartsRequest {
    map_id: String,
    relationship_id: NodeId,
    part_ids: Vec<NodeId>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DisconnectPartRequest {
    map_id: String,
    relationship_id: NodeId,
    part_id: NodeId,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct MemberDescriptionRequest {
    map_id: String,
    relationship_id: NodeId,
    part_id: NodeId,
    /// This part's side of the relationship
    description: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SidebarImpressionRequest {
    map_id: String,
    category: String,
    label: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct PlaceSidebarRequest {
    map_id: String,
    impression_id: NodeId,
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ListJournalRequest {
    map_id: Option<String>,
    part_id: Option<NodeId>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct WriteJournalRequest {
    /// Existing entry to update. Omit to create a new entry.
    entry_id: Option<String>,
    map_id: Option<String>,
    /// The part this entry is about
    part_id: Option<NodeId>,
    title: Option<String>,
    /// Entry text. Each line becomes a paragraph. Omit to keep the current text.
    text: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct JournalEntryRequest {
    entry_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct HistoryTurn {
    /// "user" or "assistant"
    role: String,
    content: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AskCompanionRequest {
    map_id: String,
    message: String,
    /// Earlier turns of the conversation, oldest first
    #[serde(default)]
    history: Vec<HistoryTurn>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct PartRequest {
    map_id: String,
    part_id: NodeId,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SuggestImpressionsRequest {
    map_id: String,
    part_id: NodeId,
    /// Put the suggestions in the map's sidebar so the user can drag them onto the part
    #[serde(default)]
    add_to_sidebar: bool,
}

// --- Server ---

#[derive(Clone)]
pub struct PartmapServer {
    tool_router: ToolRouter<Self>,
    store: Store,
    user: UserId,
    settings: AiSettings,
    /// Held across every read-modify-write of the store, so concurrent tool
    /// calls apply one after another instead of overwriting each other.
    writes: Arc<Mutex<()>>,
}

fn ok(text: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text.into())]))
}

fn fail(text: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(text.into())]))
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("Serialization error: {}", e))
}

#[tool_router]
impl PartmapServer {
    pub fn new(store: Store, user: UserId, settings: AiSettings) -> Self {
        Self {
            tool_router: Self::tool_router(),
            store,
            user,
            settings,
            writes: Arc::new(Mutex::new(())),
        }
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data is (), so a panic elsewhere leaves nothing to repair.
        self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load(&self, map_id: &str) -> Result<MapDocument, String> {
        self.store
            .read_map(&self.user, map_id)
            .map_err(|e| format!("Failed to read map '{}': {}", map_id, e))
    }

    /// Read a map, apply `edit` to its graph and save the whole map. Nothing is
    /// written when `edit` fails.
    fn edit_map<F>(&self, map_id: &str, edit: F) -> Result<CallToolResult, McpError>
    where
        F: FnOnce(&mut MapGraph) -> Result<String, String>,
    {
        let _guard = self.write_lock();
        let mut doc = match self.load(map_id) {
            Ok(doc) => doc,
            Err(e) => return fail(e),
        };
        let message = match edit(&mut doc.graph) {
            Ok(message) => message,
            Err(e) => return fail(e),
        };
        match self.store.save_map(&self.user, &mut doc) {
            Ok(()) => ok(message),
            Err(e) => {
                tracing::error!(map = %map_id, error = %e, "save failed");
                fail(format!("Failed to save map '{}': {}", map_id, e))
            }
        }
    }

    #[tool(description = "List all of the user's maps")]
    fn list_maps(&self) -> Result<CallToolResult, McpError> {
        match self.store.list_maps(&self.user) {
            Ok(maps) if maps.is_empty() => ok("No maps found. Use create_map to create one."),
            Ok(maps) => ok(maps
                .iter()
                .map(|m| format!("{}  \"{}\"  ({} nodes, updated {})", m.id, m.name, m.node_count, m.updated_at.to_rfc3339()))
                .collect::<Vec<_>>()
                .join("\n")),
            Err(e) => fail(e.to_string()),
        }
    }

    #[tool(description = "Create a new, empty map. Returns its ID.")]
    fn create_map(
        &self,
        Parameters(req): Parameters<CreateMapRequest>,
    ) -> Result<CallToolResult, McpError> {
        if req.name.trim().is_empty() {
            return fail("Map name is required");
        }
        match self.store.create_map(&self.user, req.name.trim()) {
            Ok(doc) => ok(format!("Created map '{}' with id {}", doc.name, doc.id)),
            Err(e) => fail(e.to_string()),
        }
    }

    #[tool(
        description = "Get the full JSON content of a map: {id, name, nodes: [{id, type: part|impression|relationship, position, measured?, data}], edges: [{id, source, target}], sidebarImpressions}. Part data holds the impression collections emotions/thoughts/sensations/behaviors/others/self plus needs/fears/image. Relationship data holds connectedNodes: [{partId, description}]."
    )]
    fn get_map(&self, Parameters(req): Parameters<MapRequest>) -> Result<CallToolResult, McpError> {
        match self.load(&req.map_id) {
            Ok(doc) => ok(to_json(&doc)),
            Err(e) => fail(e),
        }
    }

    #[tool(description = "Rename a map")]
    fn rename_map(
        &self,
        Parameters(req): Parameters<RenameMapRequest>,
    ) -> Result<CallToolResult, McpError> {
        let _guard = self.write_lock();
        match self.store.rename_map(&self.user, &req.map_id, &req.name) {
            Ok(doc) => ok(format!("Renamed map {} to '{}'", doc.id, doc.name)),
            Err(e) => fail(e.to_string()),
        }
    }

    #[tool(description = "Delete a map permanently")]
    fn delete_map(&self, Parameters(req): Parameters<MapRequest>) -> Result<CallToolResult, McpError> {
        let _guard = self.write_lock();
        match self.store.delete_map(&self.user, &req.map_id) {
            Ok(()) => ok(format!("Deleted map {}", req.map_id)),
            Err(e) => fail(e.to_string()),
        }
    }

    #[tool(
        description = "Add one or more nodes to a map. Parts are inner voices or roles, impressions are observations (emotion, thought, sensation, behavior, other, self), relationships join two or more parts."
    )]
    fn add_nodes(
        &self,
        Parameters(req): Parameters<AddNodesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut specs = Vec::with_capacity(req.nodes.len());
        for item in &req.nodes {
            let kind = match parse_kind(&item.kind, item.category.as_deref()) {
                Ok(k) => k,
                Err(e) => return fail(e),
            };
            let part_type = match item.part_type.as_deref().map(parse_part_type).transpose() {
                Ok(t) => t,
                Err(e) => return fail(e),
            };
            if item.label.trim().is_empty() {
                return fail(format!("Label is required for new {} nodes", kind.as_str()));
            }
            specs.push((kind, part_type, item));
        }

        self.edit_map(&req.map_id, |graph| {
            let mut added = Vec::new();
            for (kind, part_type, item) in specs {
                let count = graph.nodes.len();
                let x = item.x.unwrap_or((count % 4) as f64 * 250.0 + 100.0);
                let y = item.y.unwrap_or((count / 4) as f64 * 220.0 + 100.0);
                let node = graph.create_node(kind, Position::new(x, y), item.label.trim());
                if part_type.is_some() {
                    graph.update_node(
                        &node.id,
                        &NodePatch {
                            part_type,
                            ..Default::default()
                        },
                    );
                }
                added.push(node.id.to_string());
            }
            Ok(format!("Added {} node(s): {}", added.len(), added.join(", ")))
        })
    }

    #[tool(description = "Update fields of one or more existing nodes")]
    fn update_nodes(
        &self,
        Parameters(req): Parameters<UpdateNodesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut patches = Vec::with_capacity(req.nodes.len());
        for item in &req.nodes {
            match item.to_patch() {
                Ok(patch) => patches.push((&item.node_id, patch)),
                Err(e) => return fail(e),
            }
        }
        self.edit_map(&req.map_id, |graph| {
            for (node_id, patch) in &patches {
                if !graph.update_node(node_id, patch) {
                    return Err(format!("Node '{}' not found", node_id));
                }
            }
            Ok(format!("Updated {} node(s)", req.nodes.len()))
        })
    }

    #[tool(description = "Move a node on the canvas and optionally record its rendered size")]
    fn move_node(
        &self,
        Parameters(req): Parameters<MoveNodeRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit_map(&req.map_id, |graph| {
            if !graph.move_node(&req.node_id, Position::new(req.x, req.y)) {
                return Err(format!("Node '{}' not found", req.node_id));
            }
            if let (Some(width), Some(height)) = (req.width, req.height) {
                graph.set_measured(&req.node_id, Dimensions::new(width, height));
            }
            Ok(format!("Moved {}", req.node_id))
        })
    }

    #[tool(
        description = "Delete one or more nodes. Connectors are removed too, and deleted parts leave every relationship they were in. Impressions filed on a deleted part are deleted with it."
    )]
    fn delete_nodes(
        &self,
        Parameters(req): Parameters<DeleteNodesRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit_map(&req.map_id, |graph| {
            let removed = req
                .node_ids
                .iter()
                .filter(|id| graph.remove_node(id).is_some())
                .count();
            Ok(format!("Deleted {} node(s)", removed))
        })
    }

    #[tool(
        description = "File an impression on a part. The impression is taken from wherever it is now (canvas, sidebar or another part)."
    )]
    fn attach_impression(
        &self,
        Parameters(req): Parameters<AttachImpressionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let category = match req.category.as_deref().map(parse_category).transpose() {
            Ok(c) => c,
            Err(e) => return fail(e),
        };
        self.edit_map(&req.map_id, |graph| {
            let impression = graph
                .impression(&req.impression_id)
                .ok_or_else(|| format!("Impression '{}' not found", req.impression_id))?;
            let category = category.unwrap_or(impression.data.category);
            graph
                .insert_impression_to_part(impression, &req.part_id, category)
                .map_err(|e| e.to_string())?;
            Ok(format!(
                "Filed {} under {} on {}",
                req.impression_id,
                category.collection_name(),
                req.part_id
            ))
        })
    }

    #[tool(description = "Take an impression off a part and put it back on the canvas as a free node")]
    fn detach_impression(
        &self,
        Parameters(req): Parameters<DetachImpressionRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit_map(&req.map_id, |graph| {
            let part = graph
                .node(&req.part_id)
                .ok_or_else(|| format!("Part '{}' not found", req.part_id))?;
            let category = part
                .as_part()
                .and_then(|p| p.impressions.iter().find(|(_, i)| i.id == req.impression_id))
                .map(|(c, _)| c)
                .ok_or_else(|| {
                    format!("Impression '{}' is not on part '{}'", req.impression_id, req.part_id)
                })?;
            let at = Position::new(
                req.x.unwrap_or(part.position.x),
                req.y.unwrap_or(part.position.y),
            );
            graph
                .release_impression(&req.impression_id, &req.part_id, category, at)
                .ok_or_else(|| format!("Impression '{}' could not be detached", req.impression_id))?;
            Ok(format!("Detached {} from {}", req.impression_id, req.part_id))
        })
    }

    #[tool(
        description = "Finish dragging a node to a point on the canvas. An impression dropped inside a part's bounds is filed on that part (the part with the nearest centre wins when parts overlap); anything else just moves."
    )]
    fn drop_node(
        &self,
        Parameters(req): Parameters<DropNodeRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit_map(&req.map_id, |graph| {
            let point = Position::new(req.x, req.y);
            if !graph.move_node(&req.node_id, point) {
                return Err(format!("Node '{}' not found", req.node_id));
            }
            match graph.on_node_drag_stop(&req.node_id, point) {
                Ok(outcome) => Ok(describe_drop(&req.node_id, &outcome)),
                Err(e) => Err(e.to_string()),
            }
        })
    }

    #[tool(description = "Join one or more parts to a relationship node")]
    fn connect_parts(
        &self,
        Parameters(req): Parameters<ConnectPartsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit_map(&req.map_id, |graph| {
            for part_id in &req.part_ids {
                graph
                    .add_part_to_relationship(&req.relationship_id, part_id)
                    .map_err(|e| e.to_string())?;
            }
            Ok(format!(
                "Connected {} part(s) to {}",
                req.part_ids.len(),
                req.relationship_id
            ))
        })
    }

    #[tool(description = "Remove a part from a relationship")]
    fn disconnect_part(
        &self,
        Parameters(req): Parameters<DisconnectPartRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit_map(&req.map_id, |graph| {
            if graph.remove_part_from_relationship(&req.relationship_id, &req.part_id) {
                Ok(format!("Disconnected {} from {}", req.part_id, req.relationship_id))
            } else {
                Err(format!(
                    "Part '{}' is not in relationship '{}'",
                    req.part_id, req.relationship_id
                ))
            }
        })
    }

    #[tool(description = "Describe one part's side of a relationship")]
    fn set_member_description(
        &self,
        Parameters(req): Parameters<MemberDescriptionRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit_map(&req.map_id, |graph| {
            if graph.update_member_description(&req.relationship_id, &req.part_id, &req.description) {
                Ok(format!("Updated {}'s side of {}", req.part_id, req.relationship_id))
            } else {
                Err(format!(
                    "Part '{}' is not in relationship '{}'",
                    req.part_id, req.relationship_id
                ))
            }
        })
    }

    #[tool(description = "Add an impression to the map's sidebar palette, ready to be placed later")]
    fn add_sidebar_impression(
        &self,
        Parameters(req): Parameters<SidebarImpressionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let category = match parse_category(&req.category) {
            Ok(c) => c,
            Err(e) => return fail(e),
        };
        self.edit_map(&req.map_id, |graph| {
            let id = graph.add_sidebar_impression(category, req.label.trim());
            Ok(format!("Added sidebar impression {}", id))
        })
    }

    #[tool(
        description = "Drop a sidebar impression onto the canvas. Inside a part's bounds it is filed on that part; elsewhere it becomes a free node."
    )]
    fn place_sidebar_impression(
        &self,
        Parameters(req): Parameters<PlaceSidebarRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit_map(&req.map_id, |graph| {
            graph
                .place_sidebar_impression(&req.impression_id, Position::new(req.x, req.y))
                .map(|outcome| describe_drop(&req.impression_id, &outcome))
                .map_err(|e| e.to_string())
        })
    }

    #[tool(description = "Check a map for broken links between parts, relationships, connectors and impressions")]
    fn check_map(&self, Parameters(req): Parameters<MapRequest>) -> Result<CallToolResult, McpError> {
        match self.load(&req.map_id) {
            Ok(doc) => {
                let violations = doc.graph.violations();
                if violations.is_empty() {
                    ok("No problems found.")
                } else {
                    ok(violations
                        .iter()
                        .map(|v| format!("- {:?}", v))
                        .collect::<Vec<_>>()
                        .join("\n"))
                }
            }
            Err(e) => fail(e),
        }
    }

    #[tool(description = "Get the parts-mapping conventions that govern how maps should be structured")]
    fn get_guide(&self) -> Result<CallToolResult, McpError> {
        ok(partmap_core::guide::GUIDE)
    }

    #[tool(description = "List journal entries, newest first, optionally only those about one map or part")]
    fn list_journal(
        &self,
        Parameters(req): Parameters<ListJournalRequest>,
    ) -> Result<CallToolResult, McpError> {
        let filter = JournalFilter {
            map_id: req.map_id,
            part_id: req.part_id,
        };
        match self.store.list_journal(&self.user, &filter) {
            Ok(entries) if entries.is_empty() => ok("No journal entries."),
            Ok(entries) => ok(entries
                .iter()
                .map(|e| {
                    let about = e
                        .part_id
                        .as_ref()
                        .map(|p| format!(" (about {})", p))
                        .unwrap_or_default();
                    format!("{}  {}  \"{}\"{}", e.id, e.updated_at.to_rfc3339(), e.title, about)
                })
                .collect::<Vec<_>>()
                .join("\n")),
            Err(e) => fail(e.to_string()),
        }
    }

    #[tool(description = "Read one journal entry, including its text")]
    fn read_journal(
        &self,
        Parameters(req): Parameters<JournalEntryRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.store.read_journal_entry(&self.user, &req.entry_id) {
            Ok(entry) => ok(format!(
                "{}\n\n{}",
                entry.title,
                partmap_companion::prompt::document_text(&entry.content)
            )),
            Err(e) => fail(e.to_string()),
        }
    }

    #[tool(description = "Create a journal entry, or update one when entry_id is given")]
    fn write_journal(
        &self,
        Parameters(req): Parameters<WriteJournalRequest>,
    ) -> Result<CallToolResult, McpError> {
        let _guard = self.write_lock();
        let now = chrono::Utc::now();
        let mut entry = match req.entry_id.as_deref() {
            Some(id) => match self.store.read_journal_entry(&self.user, id) {
                Ok(entry) => entry,
                Err(e) => return fail(e.to_string()),
            },
            None => JournalEntry {
                id: String::new(),
                owner: self.user.to_string(),
                map_id: None,
                part_id: None,
                title: String::new(),
                content: text_document(""),
                created_at: now,
                updated_at: now,
            },
        };
        if req.map_id.is_some() {
            entry.map_id = req.map_id;
        }
        if req.part_id.is_some() {
            entry.part_id = req.part_id;
        }
        if let Some(title) = req.title {
            entry.title = title;
        }
        if let Some(text) = req.text {
            entry.content = text_document(&text);
        }
        match self.store.write_journal_entry(&self.user, entry) {
            Ok(saved) => ok(format!("Saved journal entry {}", saved.id)),
            Err(e) => fail(e.to_string()),
        }
    }

    #[tool(description = "Delete a journal entry")]
    fn delete_journal(
        &self,
        Parameters(req): Parameters<JournalEntryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let _guard = self.write_lock();
        match self.store.delete_journal_entry(&self.user, &req.entry_id) {
            Ok(()) => ok(format!("Deleted journal entry {}", req.entry_id)),
            Err(e) => fail(e.to_string()),
        }
    }

    #[tool(description = "Get a brief, gentle reflection on a journal entry from the companion")]
    async fn reflect_on_journal(
        &self,
        Parameters(req): Parameters<JournalEntryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let entry = match self.store.read_journal_entry(&self.user, &req.entry_id) {
            Ok(entry) => entry,
            Err(e) => return fail(e.to_string()),
        };
        let map = entry
            .map_id
            .as_deref()
            .and_then(|id| self.store.read_map(&self.user, id).ok());
        let text = partmap_companion::reflect_on_entry(
            &self.settings,
            &entry,
            map.as_ref().map(|d| &d.graph),
        )
        .await;
        ok(text)
    }

    #[tool(description = "Send a message to the journaling companion, with the map as context")]
    async fn ask_companion(
        &self,
        Parameters(req): Parameters<AskCompanionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let doc = match self.load(&req.map_id) {
            Ok(doc) => doc,
            Err(e) => return fail(e),
        };
        let mut transcript = Vec::with_capacity(req.history.len() + 1);
        for turn in req.history {
            let role = match turn.role.as_str() {
                "user" => Role::User,
                "assistant" => Role::Assistant,
                other => return fail(format!("Unknown role '{}': use \"user\" or \"assistant\"", other)),
            };
            transcript.push(Turn {
                role,
                content: turn.content,
            });
        }
        transcript.push(Turn::user(req.message));

        let text = partmap_companion::reply(&self.settings, &doc.graph, &transcript, |_| {}).await;
        ok(text)
    }

    #[tool(description = "Ask the companion for a short reflection on one part")]
    async fn analyze_part(
        &self,
        Parameters(req): Parameters<PartRequest>,
    ) -> Result<CallToolResult, McpError> {
        let doc = match self.load(&req.map_id) {
            Ok(doc) => doc,
            Err(e) => return fail(e),
        };
        match partmap_companion::analyze_part(&self.settings, &doc.graph, &req.part_id).await {
            Ok(text) => ok(text),
            Err(e) => fail(e.to_string()),
        }
    }

    #[tool(
        description = "Ask the companion which impressions the user might look for in a part. Optionally adds them to the sidebar."
    )]
    async fn suggest_impressions(
        &self,
        Parameters(req): Parameters<SuggestImpressionsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let doc = match self.load(&req.map_id) {
            Ok(doc) => doc,
            Err(e) => return fail(e),
        };
        let suggestions =
            partmap_companion::suggest_impressions(&self.settings, &doc.graph, &req.part_id).await;
        if suggestions.is_empty() {
            return ok("No suggestions.");
        }
        let listing = suggestions
            .iter()
            .map(|s| format!("- {}: {}", s.category, s.label))
            .collect::<Vec<_>>()
            .join("\n");
        if !req.add_to_sidebar {
            return ok(listing);
        }
        self.edit_map(&req.map_id, |graph| {
            for s in &suggestions {
                graph.add_sidebar_impression(s.category, &s.label);
            }
            Ok(format!("Added to sidebar:\n{}", listing))
        })
    }
}

const INSTRUCTIONS: &str = "partmap keeps a user's Internal Family Systems parts maps and journal. \
Every edit is saved immediately. Read a map with get_map before changing it, and prefer the user's \
own words for every label.";

#[tool_handler]
impl ServerHandler for PartmapServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!(
            "{}\n\n## Mapping conventions\n{}",
            INSTRUCTIONS,
            partmap_core::guide::GUIDE
        );
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn parse_category(s: &str) -> Result<ImpressionCategory, String> {
    ImpressionCategory::parse(&s.trim().to_lowercase()).ok_or_else(|| {
        format!(
            "Invalid category '{}'. Must be: emotion, thought, sensation, behavior, other, self",
            s
        )
    })
}

fn parse_part_type(s: &str) -> Result<PartType, String> {
    match s.trim().to_lowercase().as_str() {
        "manager" => Ok(PartType::Manager),
        "firefighter" => Ok(PartType::Firefighter),
        "exile" => Ok(PartType::Exile),
        "custom" => Ok(PartType::Custom),
        _ => Err(format!(
            "Invalid part type '{}'. Must be: manager, firefighter, exile, custom",
            s
        )),
    }
}

fn parse_kind(kind: &str, category: Option<&str>) -> Result<NodeKind, String> {
    match kind.trim().to_lowercase().as_str() {
        "part" => Ok(NodeKind::Part),
        "relationship" | "conflict" => Ok(NodeKind::Relationship),
        "impression" => {
            let category =
                category.ok_or_else(|| "Impressions need a category".to_string())?;
            Ok(NodeKind::Impression(parse_category(category)?))
        }
        _ => Err(format!(
            "Invalid kind '{}'. Must be: part, impression, relationship",
            kind
        )),
    }
}

fn describe_drop(id: &NodeId, outcome: &DropOutcome) -> String {
    match outcome {
        DropOutcome::Moved => format!("Moved {}", id),
        DropOutcome::Attached { part_id } => format!("Filed {} on part {}", id, part_id),
        DropOutcome::Placed { node_id } => format!("Placed {} on the canvas", node_id),
    }
}

/// Wrap plain text in the editor's document shape, one paragraph per line.
fn text_document(text: &str) -> serde_json::Value {
    let paragraphs: Vec<serde_json::Value> = text
        .lines()
        .map(|line| {
            if line.is_empty() {
                serde_json::json!({"type": "paragraph"})
            } else {
                serde_json::json!({"type": "paragraph", "content": [{"type": "text", "text": line}]})
            }
        })
        .collect();
    serde_json::json!({"type": "doc", "content": paragraphs})
}
