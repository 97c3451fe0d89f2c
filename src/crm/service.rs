use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use super::board::{self, BoardView};
use super::dashboard::{self, DashboardStats};
use super::listing::{self, ProspectFilter, ProspectListing, SortKey};
use super::models::{HistoryEntry, Prospect, Stage};
use super::payload::ProspectPayload;
use super::reconciler::{self, Reconciled};
use super::store::ProspectStore;
use crate::errors::CrmError;

/// Core prospect operations over a [`ProspectStore`].
///
/// Every mutation of an existing record goes through the change
/// reconciler, so the history log sees stage moves, edits and the
/// paid/lost shortcuts the same way.
#[derive(Clone)]
pub struct ProspectService {
    store: Arc<dyn ProspectStore>,
}

impl ProspectService {
    pub fn new(store: Arc<dyn ProspectStore>) -> Self {
        Self { store }
    }

    pub async fn create_prospect(&self, payload: ProspectPayload) -> Result<Prospect, CrmError> {
        let fields = payload.coerce()?;
        let prospect = self
            .store
            .insert_prospect(fields)
            .await
            .map_err(CrmError::StoreWrite)?;
        info!(prospect_id = %prospect.id, stage = %prospect.stage(), "Prospect created");
        Ok(prospect)
    }

    pub async fn get_prospect(&self, id: Uuid) -> Result<Prospect, CrmError> {
        self.store
            .get_prospect(id)
            .await
            .map_err(CrmError::StoreRead)?
            .ok_or(CrmError::NotFound { id })
    }

    /// Full-payload edit. Fields absent from the payload become empty,
    /// except stage and temperature, which keep their current values.
    pub async fn update_prospect(
        &self,
        id: Uuid,
        payload: ProspectPayload,
    ) -> Result<Reconciled, CrmError> {
        let current = self.get_prospect(id).await?;
        let proposed = payload.coerce_update(&current.fields)?;
        reconciler::reconcile(self.store.as_ref(), &current, proposed).await
    }

    pub async fn list_prospects(
        &self,
        filter: &ProspectFilter,
        sort: SortKey,
    ) -> Result<ProspectListing, CrmError> {
        let all = self.all_prospects().await?;
        Ok(listing::apply(all, filter, sort))
    }

    /// History newest first. Unknown prospects are `NotFound`.
    pub async fn get_history(&self, prospect_id: Uuid) -> Result<Vec<HistoryEntry>, CrmError> {
        self.get_prospect(prospect_id).await?;
        self.store
            .list_history(prospect_id)
            .await
            .map_err(CrmError::StoreRead)
    }

    /// Write `stage = target`. Moving to the current stage writes nothing.
    pub async fn move_stage(&self, prospect_id: Uuid, target: Stage) -> Result<Reconciled, CrmError> {
        let current = self.get_prospect(prospect_id).await?;
        let mut proposed = current.fields.clone();
        proposed.stage = target;
        reconciler::reconcile(self.store.as_ref(), &current, proposed).await
    }

    pub async fn mark_paid(&self, prospect_id: Uuid) -> Result<Reconciled, CrmError> {
        self.move_stage(prospect_id, Stage::Paid).await
    }

    /// Move to `lost` and append the reason to the notes.
    pub async fn mark_lost(&self, prospect_id: Uuid, reason: &str) -> Result<Reconciled, CrmError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CrmError::validation("loss reason is required"));
        }
        let current = self.get_prospect(prospect_id).await?;
        let mut proposed = current.fields.clone();
        proposed.stage = Stage::Lost;
        proposed.notes = Some(append_loss_reason(proposed.notes.as_deref(), reason));
        reconciler::reconcile(self.store.as_ref(), &current, proposed).await
    }

    pub async fn board(&self, sort: SortKey) -> Result<BoardView, CrmError> {
        let all = self.all_prospects().await?;
        Ok(board::project(&all, sort))
    }

    pub async fn dashboard(&self, today: NaiveDate) -> Result<DashboardStats, CrmError> {
        let all = self.all_prospects().await?;
        Ok(dashboard::summarize(&all, today))
    }

    async fn all_prospects(&self) -> Result<Vec<Prospect>, CrmError> {
        self.store
            .list_prospects()
            .await
            .map_err(CrmError::StoreRead)
    }
}

fn append_loss_reason(notes: Option<&str>, reason: &str) -> String {
    format!("{}\n\nLoss reason: {}", notes.unwrap_or_default(), reason)
        .trim()
        .to_string()
}
