use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::db::DbHandle;
use super::models::{HistoryEntry, Prospect, ProspectFields};
use super::reconciler::FieldChange;

/// Persistence seam for prospects and their history log.
///
/// The two tables are independent: nothing here spans a prospect write and
/// a history write in one transaction.
#[async_trait]
pub trait ProspectStore: Send + Sync {
    async fn insert_prospect(&self, fields: ProspectFields) -> Result<Prospect>;

    async fn get_prospect(&self, id: Uuid) -> Result<Option<Prospect>>;

    /// Replace every editable field. `Ok(None)` when the id is unknown.
    async fn update_prospect(&self, id: Uuid, fields: ProspectFields) -> Result<Option<Prospect>>;

    /// Every prospect, newest first.
    async fn list_prospects(&self) -> Result<Vec<Prospect>>;

    /// Append one entry per change as a single batch.
    async fn append_history(
        &self,
        prospect_id: Uuid,
        changes: Vec<FieldChange>,
    ) -> Result<Vec<HistoryEntry>>;

    /// History for one prospect, newest first.
    async fn list_history(&self, prospect_id: Uuid) -> Result<Vec<HistoryEntry>>;
}

#[async_trait]
impl ProspectStore for DbHandle {
    async fn insert_prospect(&self, fields: ProspectFields) -> Result<Prospect> {
        self.call(move |db| db.insert_prospect(&fields)).await
    }

    async fn get_prospect(&self, id: Uuid) -> Result<Option<Prospect>> {
        self.call(move |db| db.get_prospect(id)).await
    }

    async fn update_prospect(&self, id: Uuid, fields: ProspectFields) -> Result<Option<Prospect>> {
        self.call(move |db| db.update_prospect(id, &fields)).await
    }

    async fn list_prospects(&self) -> Result<Vec<Prospect>> {
        self.call(|db| db.list_prospects()).await
    }

    async fn append_history(
        &self,
        prospect_id: Uuid,
        changes: Vec<FieldChange>,
    ) -> Result<Vec<HistoryEntry>> {
        self.call(move |db| db.insert_history(prospect_id, &changes))
            .await
    }

    async fn list_history(&self, prospect_id: Uuid) -> Result<Vec<HistoryEntry>> {
        self.call(move |db| db.list_history(prospect_id)).await
    }
}
