pub mod error;
pub mod graph;
pub mod guide;
pub mod model;
pub mod settings;
pub mod store;

pub use error::{GraphError, StoreError, StoreResult};
pub use graph::{DropOutcome, Violation};
pub use model::{
    Dimensions, Edge, EdgeId, Impression, ImpressionCategory, ImpressionCollections,
    ImpressionData, JournalEntry, MapDocument, MapGraph, MapSummary, Node, NodeId, NodeKind,
    NodePatch, NodePayload, PartData, PartType, Position, RelationshipData, RelationshipMember,
};
pub use settings::{read_settings, write_settings, AiSettings};
pub use store::{data_dir, JournalFilter, Store, UserId};
