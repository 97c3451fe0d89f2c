//! Board projection: one column per stage, plus the optimistic drag flow.
//!
//! [`project`] is the read side. [`BoardSession`] holds a local copy of the
//! collection and tracks each dragged card through
//! `PendingLocal -> Confirmed | Reverted`.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::listing::{SortKey, sort_prospects};
use super::models::{Prospect, Stage};
use super::reconciler::Reconciled;
use super::service::ProspectService;
use crate::errors::CrmError;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnView {
    pub stage: Stage,
    pub label: &'static str,
    pub color: &'static str,
    /// Paid and lost columns close the funnel.
    pub terminal: bool,
    pub count: usize,
    pub prospects: Vec<Prospect>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub sort: SortKey,
    pub columns: Vec<ColumnView>,
}

impl BoardView {
    pub fn column(&self, stage: Stage) -> Option<&ColumnView> {
        self.columns.iter().find(|c| c.stage == stage)
    }

    pub fn total(&self) -> usize {
        self.columns.iter().map(|c| c.count).sum()
    }
}

/// Partition `prospects` into columns in funnel order.
///
/// Every prospect lands in exactly one column and every stage has a
/// column, empty or not.
pub fn project(prospects: &[Prospect], sort: SortKey) -> BoardView {
    let mut buckets: HashMap<Stage, Vec<Prospect>> = HashMap::new();
    for prospect in prospects {
        buckets
            .entry(prospect.stage())
            .or_default()
            .push(prospect.clone());
    }

    let columns = Stage::ALL
        .into_iter()
        .map(|stage| {
            let mut cards = buckets.remove(&stage).unwrap_or_default();
            sort_prospects(&mut cards, sort);
            ColumnView {
                stage,
                label: stage.label(),
                color: stage.color(),
                terminal: stage.is_terminal(),
                count: cards.len(),
                prospects: cards,
            }
        })
        .collect();

    BoardView { sort, columns }
}

/// Sync state of a card that has been dragged at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardSync {
    /// Moved locally, write in flight.
    PendingLocal,
    /// The store accepted the move; the card shows the stored record.
    Confirmed,
    /// The write failed; the card is back in its original column.
    Reverted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMove {
    pub prospect_id: Uuid,
    pub from: Stage,
    pub to: Stage,
}

/// Local board state for one viewer.
pub struct BoardSession {
    prospects: Vec<Prospect>,
    sort: SortKey,
    sync: HashMap<Uuid, CardSync>,
    last_error: Option<String>,
}

impl BoardSession {
    pub fn new(prospects: Vec<Prospect>, sort: SortKey) -> Self {
        Self {
            prospects,
            sort,
            sync: HashMap::new(),
            last_error: None,
        }
    }

    pub fn view(&self) -> BoardView {
        project(&self.prospects, self.sort)
    }

    pub fn sync_state(&self, prospect_id: Uuid) -> Option<CardSync> {
        self.sync.get(&prospect_id).copied()
    }

    /// Message of the most recent failed move, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn card_mut(&mut self, prospect_id: Uuid) -> Option<&mut Prospect> {
        self.prospects.iter_mut().find(|p| p.id == prospect_id)
    }

    /// Move the card locally. `None` when the card is unknown or already
    /// in `target`, in which case nothing should be written.
    pub fn begin_move(&mut self, prospect_id: Uuid, target: Stage) -> Option<PendingMove> {
        let card = self.card_mut(prospect_id)?;
        let from = card.fields.stage;
        if from == target {
            debug!(prospect_id = %prospect_id, stage = %target, "Dropped on own column, ignoring");
            return None;
        }
        card.fields.stage = target;
        self.sync.insert(prospect_id, CardSync::PendingLocal);
        Some(PendingMove {
            prospect_id,
            from,
            to: target,
        })
    }

    /// Replace the local card with the record the store confirmed.
    pub fn confirm(&mut self, pending: &PendingMove, confirmed: Prospect) {
        if let Some(card) = self.card_mut(pending.prospect_id) {
            *card = confirmed;
        }
        self.sync.insert(pending.prospect_id, CardSync::Confirmed);
    }

    /// Put the card back in its original column and keep the error.
    pub fn revert(&mut self, pending: &PendingMove, error: &CrmError) {
        warn!(
            prospect_id = %pending.prospect_id,
            from = %pending.from,
            to = %pending.to,
            error = %error,
            "Stage move failed, reverting card"
        );
        if let Some(card) = self.card_mut(pending.prospect_id) {
            card.fields.stage = pending.from;
        }
        self.sync.insert(pending.prospect_id, CardSync::Reverted);
        self.last_error = Some(error.to_string());
    }

    /// Full drag: local move, store write, then confirm or revert.
    ///
    /// A partial write still confirms the card, since the stage did land,
    /// but the error is returned so the caller can surface it.
    pub async fn drag(
        &mut self,
        service: &ProspectService,
        prospect_id: Uuid,
        target: Stage,
    ) -> Result<Option<Reconciled>, CrmError> {
        let Some(pending) = self.begin_move(prospect_id, target) else {
            return Ok(None);
        };

        match service.move_stage(prospect_id, target).await {
            Ok(result) => {
                self.confirm(&pending, result.prospect.clone());
                Ok(Some(result))
            }
            Err(err) => {
                match err.persisted_prospect() {
                    Some(persisted) => {
                        let persisted = persisted.clone();
                        self.confirm(&pending, persisted);
                        self.last_error = Some(err.to_string());
                    }
                    None => self.revert(&pending, &err),
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::db::{CrmDb, DbHandle};
    use crate::crm::models::ProspectFields;
    use crate::crm::store::ProspectStore;
    use crate::crm::store::testing::{FailingHistoryStore, RejectingStore};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn prospect(name: &str, stage: Stage, minutes: i64) -> Prospect {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes);
        let mut fields = ProspectFields::named(name);
        fields.stage = stage;
        Prospect {
            id: Uuid::new_v4(),
            fields,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_projection_partitions_every_prospect() {
        let prospects = vec![
            prospect("A", Stage::New, 0),
            prospect("B", Stage::Paid, 1),
            prospect("C", Stage::New, 2),
            prospect("D", Stage::Lost, 3),
            prospect("E", Stage::Negotiating, 4),
        ];
        let board = project(&prospects, SortKey::default());

        assert_eq!(board.columns.len(), Stage::ALL.len());
        assert_eq!(board.total(), prospects.len());

        let mut seen = HashSet::new();
        for column in &board.columns {
            assert_eq!(column.count, column.prospects.len());
            for card in &column.prospects {
                assert_eq!(card.stage(), column.stage);
                assert!(seen.insert(card.id), "card appears in two columns");
            }
        }
        assert_eq!(seen.len(), prospects.len());
    }

    #[test]
    fn test_columns_follow_funnel_order_with_labels() {
        let board = project(&[], SortKey::default());
        let stages: Vec<Stage> = board.columns.iter().map(|c| c.stage).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
        let scheduled = board.column(Stage::MeetingScheduled).unwrap();
        assert_eq!(scheduled.label, "Meeting Scheduled");
        assert_eq!(scheduled.color, "status-meeting-scheduled");
        assert_eq!(scheduled.count, 0);
        assert!(!scheduled.terminal);
    }

    #[test]
    fn test_only_paid_and_lost_columns_are_terminal() {
        let board = project(&[], SortKey::default());
        let terminal: Vec<Stage> = board
            .columns
            .iter()
            .filter(|c| c.terminal)
            .map(|c| c.stage)
            .collect();
        assert_eq!(terminal, vec![Stage::Paid, Stage::Lost]);
    }

    #[test]
    fn test_within_column_order_uses_sort_key() {
        let prospects = vec![
            prospect("Old", Stage::New, 0),
            prospect("Young", Stage::New, 10),
        ];
        let newest_first = project(&prospects, SortKey::CreatedDesc);
        let names: Vec<&str> = newest_first.columns[0]
            .prospects
            .iter()
            .map(|p| p.fields.name.as_str())
            .collect();
        assert_eq!(names, vec!["Young", "Old"]);

        let oldest_first = project(&prospects, SortKey::CreatedAsc);
        assert_eq!(oldest_first.columns[0].prospects[0].fields.name, "Old");
    }

    #[test]
    fn test_begin_move_to_same_column_is_noop() {
        let card = prospect("Ana", Stage::New, 0);
        let id = card.id;
        let mut session = BoardSession::new(vec![card], SortKey::default());
        assert!(session.begin_move(id, Stage::New).is_none());
        assert!(session.sync_state(id).is_none());
        assert!(session.begin_move(Uuid::new_v4(), Stage::Paid).is_none());
    }

    #[test]
    fn test_begin_move_then_revert_restores_column() {
        let card = prospect("Ana", Stage::New, 0);
        let id = card.id;
        let mut session = BoardSession::new(vec![card], SortKey::default());

        let pending = session.begin_move(id, Stage::Contacted).unwrap();
        assert_eq!(session.sync_state(id), Some(CardSync::PendingLocal));
        assert_eq!(session.view().column(Stage::Contacted).unwrap().count, 1);

        session.revert(&pending, &CrmError::StoreWrite(anyhow::anyhow!("offline")));
        assert_eq!(session.sync_state(id), Some(CardSync::Reverted));
        assert_eq!(session.view().column(Stage::New).unwrap().count, 1);
        assert_eq!(session.view().column(Stage::Contacted).unwrap().count, 0);
        assert!(session.last_error().unwrap().contains("offline"));
    }

    async fn seeded(store: &DbHandle) -> Prospect {
        store
            .insert_prospect(ProspectFields::named("Ana"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_drag_confirms_with_stored_record() {
        let db = DbHandle::new(CrmDb::new_in_memory().unwrap());
        let created = seeded(&db).await;
        let service = ProspectService::new(Arc::new(db.clone()));
        let mut session = BoardSession::new(vec![created.clone()], SortKey::default());

        let result = session
            .drag(&service, created.id, Stage::Contacted)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.changes.len(), 1);
        assert_eq!(session.sync_state(created.id), Some(CardSync::Confirmed));

        let column = session.view();
        let card = &column.column(Stage::Contacted).unwrap().prospects[0];
        assert_eq!(card.updated_at, result.prospect.updated_at);

        let history = db.list_history(created.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].field_changed, "stage");
        assert_eq!(history[0].previous_value, "new");
        assert_eq!(history[0].new_value, "contacted");
    }

    #[tokio::test]
    async fn test_drag_reverts_when_store_rejects() {
        let db = DbHandle::new(CrmDb::new_in_memory().unwrap());
        let created = seeded(&db).await;
        let service = ProspectService::new(Arc::new(RejectingStore::new(db.clone())));
        let mut session = BoardSession::new(vec![created.clone()], SortKey::default());

        let err = session
            .drag(&service, created.id, Stage::Paid)
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::StoreWrite(_)));
        assert_eq!(session.sync_state(created.id), Some(CardSync::Reverted));
        assert_eq!(session.view().column(Stage::New).unwrap().count, 1);
        assert!(db.list_history(created.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drag_partial_write_keeps_card_moved() {
        let db = DbHandle::new(CrmDb::new_in_memory().unwrap());
        let created = seeded(&db).await;
        let service = ProspectService::new(Arc::new(FailingHistoryStore::new(db.clone())));
        let mut session = BoardSession::new(vec![created.clone()], SortKey::default());

        let err = session
            .drag(&service, created.id, Stage::Lost)
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::PartialWrite { .. }));
        assert_eq!(session.sync_state(created.id), Some(CardSync::Confirmed));
        assert_eq!(session.view().column(Stage::Lost).unwrap().count, 1);
        assert!(session.last_error().is_some());
    }

    #[tokio::test]
    async fn test_drag_to_own_column_writes_nothing() {
        let db = DbHandle::new(CrmDb::new_in_memory().unwrap());
        let created = seeded(&db).await;
        let service = ProspectService::new(Arc::new(db.clone()));
        let mut session = BoardSession::new(vec![created.clone()], SortKey::default());

        let result = session.drag(&service, created.id, Stage::New).await.unwrap();
        assert!(result.is_none());
        let stored = db.get_prospect(created.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, created.updated_at);
        assert!(db.list_history(created.id).await.unwrap().is_empty());
    }
}
