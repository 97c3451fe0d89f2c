//! Typed error hierarchy for the prospect pipeline.
//!
//! `CrmError` is what every core operation returns. Store implementations
//! speak `anyhow` internally; the service folds those failures into
//! `StoreWrite`/`StoreRead` so the caller can tell a rejected mutation from
//! a failed query.

use thiserror::Error;
use uuid::Uuid;

use crate::crm::models::Prospect;

#[derive(Debug, Error)]
pub enum CrmError {
    /// The payload failed coercion or a required field is missing.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The store rejected a create or update. Nothing was written.
    #[error("Store rejected write: {0:#}")]
    StoreWrite(#[source] anyhow::Error),

    #[error("Store query failed: {0:#}")]
    StoreRead(#[source] anyhow::Error),

    /// The prospect update landed but its history batch did not.
    /// The update is not rolled back.
    #[error("Prospect {} updated but history was not recorded: {source:#}", .prospect.id)]
    PartialWrite {
        prospect: Box<Prospect>,
        #[source]
        source: anyhow::Error,
    },

    #[error("Prospect {id} not found")]
    NotFound { id: Uuid },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrmError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// The record the store holds after a partial write, if any.
    pub fn persisted_prospect(&self) -> Option<&Prospect> {
        match self {
            Self::PartialWrite { prospect, .. } => Some(prospect.as_ref()),
            _ => None,
        }
    }
}
