//! Change reconciler: field-level diffs and the audited update path.
//!
//! [`diff`] is a pure function over two coerced snapshots. [`reconcile`]
//! applies a proposed snapshot to the store and appends one history entry
//! per changed field, in that order. The two writes are not transactional:
//! when the history append fails after the update landed, the caller gets
//! [`CrmError::PartialWrite`] carrying the updated record.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::models::{Commitment, HistoryEntry, Prospect, ProspectFields, Stage, Temperature};
use super::store::ProspectStore;
use crate::errors::CrmError;

/// Names of every field the history log tracks, in diff order.
pub const TRACKED_FIELDS: [&str; 18] = [
    "name",
    "company",
    "email",
    "phone",
    "source",
    "stage",
    "temperature",
    "commitment",
    "product_interest",
    "estimated_amount",
    "next_action",
    "next_action_date",
    "last_meeting_date",
    "notes",
    "sensitivity",
    "summary",
    "objections",
    "key_quotes",
];

/// One differing field between two snapshots, rendered as history text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: &'static str,
    pub previous: String,
    pub new: String,
}

/// Rendering of a stored value in the history log. `None` renders as `""`.
pub trait HistoryText {
    fn history_text(&self) -> String;
}

impl HistoryText for String {
    fn history_text(&self) -> String {
        self.clone()
    }
}

impl HistoryText for Decimal {
    fn history_text(&self) -> String {
        self.to_string()
    }
}

impl HistoryText for u8 {
    fn history_text(&self) -> String {
        self.to_string()
    }
}

impl HistoryText for NaiveDate {
    fn history_text(&self) -> String {
        self.to_string()
    }
}

impl HistoryText for Stage {
    fn history_text(&self) -> String {
        self.as_str().to_string()
    }
}

impl HistoryText for Temperature {
    fn history_text(&self) -> String {
        self.as_str().to_string()
    }
}

impl HistoryText for Commitment {
    fn history_text(&self) -> String {
        self.as_str().to_string()
    }
}

impl HistoryText for Vec<String> {
    fn history_text(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        serde_json::to_string(self).unwrap_or_else(|_| self.join(", "))
    }
}

impl<T: HistoryText> HistoryText for Option<T> {
    fn history_text(&self) -> String {
        self.as_ref().map(HistoryText::history_text).unwrap_or_default()
    }
}

macro_rules! diff_fields {
    ($old:expr, $new:expr, $out:ident; $($field:ident),+ $(,)?) => {
        $(
            if $old.$field != $new.$field {
                $out.push(FieldChange {
                    field: stringify!($field),
                    previous: $old.$field.history_text(),
                    new: $new.$field.history_text(),
                });
            }
        )+
    };
}

/// Every field where `old` and `new` differ, in [`TRACKED_FIELDS`] order.
pub fn diff(old: &ProspectFields, new: &ProspectFields) -> Vec<FieldChange> {
    // Destructure so a new field on ProspectFields fails to compile here
    // until it is added to the diff below.
    let ProspectFields {
        name: _,
        company: _,
        email: _,
        phone: _,
        source: _,
        stage: _,
        temperature: _,
        commitment: _,
        product_interest: _,
        estimated_amount: _,
        next_action: _,
        next_action_date: _,
        last_meeting_date: _,
        notes: _,
        sensitivity: _,
        summary: _,
        objections: _,
        key_quotes: _,
    } = old;

    let mut changes = Vec::new();
    diff_fields!(old, new, changes;
        name,
        company,
        email,
        phone,
        source,
        stage,
        temperature,
        commitment,
        product_interest,
        estimated_amount,
        next_action,
        next_action_date,
        last_meeting_date,
        notes,
        sensitivity,
        summary,
        objections,
        key_quotes,
    );
    changes
}

/// Result of an audited update.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub prospect: Prospect,
    pub changes: Vec<FieldChange>,
    pub history: Vec<HistoryEntry>,
}

impl Reconciled {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Apply `proposed` over `current` and record what changed.
///
/// `current` is whatever snapshot the caller holds; a stale snapshot yields
/// a stale diff.
pub async fn reconcile(
    store: &dyn ProspectStore,
    current: &Prospect,
    proposed: ProspectFields,
) -> Result<Reconciled, CrmError> {
    let changes = diff(&current.fields, &proposed);
    if changes.is_empty() {
        debug!(prospect_id = %current.id, "No field changes, skipping write");
        return Ok(Reconciled {
            prospect: current.clone(),
            changes,
            history: Vec::new(),
        });
    }

    let prospect = store
        .update_prospect(current.id, proposed)
        .await
        .map_err(CrmError::StoreWrite)?
        .ok_or(CrmError::NotFound { id: current.id })?;

    let history = match store.append_history(prospect.id, changes.clone()).await {
        Ok(history) => history,
        Err(source) => {
            warn!(
                prospect_id = %prospect.id,
                fields = changes.len(),
                error = %source,
                "Prospect updated but history append failed"
            );
            return Err(CrmError::PartialWrite {
                prospect: Box::new(prospect),
                source,
            });
        }
    };

    info!(
        prospect_id = %prospect.id,
        fields = ?changes.iter().map(|c| c.field).collect::<Vec<_>>(),
        "Prospect updated"
    );
    Ok(Reconciled {
        prospect,
        changes,
        history,
    })
}
