use std::path::PathBuf;

use crate::model::{NodeId, NodeKind};

/// Rejections from graph commands that cannot degrade to a no-op.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("node '{0}' not found")]
    NodeNotFound(NodeId),
    #[error("part '{0}' not found")]
    PartNotFound(NodeId),
    #[error("node '{id}' is a {kind}, not a part")]
    NotAPart { id: NodeId, kind: &'static str },
    #[error("node '{id}' is a {kind}, not a relationship")]
    NotARelationship { id: NodeId, kind: &'static str },
    #[error("node '{id}' is a {kind}, not an impression")]
    NotAnImpression { id: NodeId, kind: &'static str },
    #[error("impression '{0}' is not in the sidebar")]
    NotInSidebar(NodeId),
    #[error("cannot connect a {source_kind} to a {target_kind}; edges join a part and a relationship")]
    InvalidConnection {
        source_kind: &'static str,
        target_kind: &'static str,
    },
}

impl GraphError {
    pub(crate) fn not_a_part(id: &NodeId, kind: NodeKind) -> Self {
        GraphError::NotAPart {
            id: id.clone(),
            kind: kind.as_str(),
        }
    }

    pub(crate) fn not_a_relationship(id: &NodeId, kind: NodeKind) -> Self {
        GraphError::NotARelationship {
            id: id.clone(),
            kind: kind.as_str(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid {what} '{value}': use 1-64 characters from [A-Za-z0-9_-]")]
    InvalidId { what: &'static str, value: String },
    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;
