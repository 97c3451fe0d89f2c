use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::error;
use uuid::Uuid;

use super::commands::{CommandBus, UiCommand};
use super::listing::{ProspectFilter, SortKey};
use super::models::{Prospect, Stage};
use super::payload::ProspectPayload;
use super::reconciler::Reconciled;
use super::service::ProspectService;
use super::ws::{WsMessage, broadcast_message};
use crate::errors::CrmError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub service: ProspectService,
    pub ws_tx: broadcast::Sender<String>,
    pub commands: CommandBus,
    pub default_sort: SortKey,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub stage: Option<String>,
    pub temperature: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BoardQuery {
    pub sort: Option<String>,
}

#[derive(Deserialize)]
pub struct MoveStageRequest {
    pub stage: String,
}

#[derive(Deserialize)]
pub struct MarkLostRequest {
    pub reason: String,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
    /// The record changed but its history did not; reported as 207.
    PartialWrite {
        message: String,
        prospect: Box<Prospect>,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::PartialWrite { message, prospect } => {
                return (
                    StatusCode::MULTI_STATUS,
                    Json(serde_json::json!({"error": message, "prospect": prospect})),
                )
                    .into_response();
            }
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<CrmError> for ApiError {
    fn from(err: CrmError) -> Self {
        let message = err.to_string();
        match err {
            CrmError::Validation(_) => ApiError::BadRequest(message),
            CrmError::NotFound { .. } => ApiError::NotFound(message),
            CrmError::PartialWrite { prospect, .. } => ApiError::PartialWrite { message, prospect },
            CrmError::StoreWrite(_) | CrmError::StoreRead(_) | CrmError::Other(_) => {
                error!(error = %message, "Request failed");
                ApiError::Internal(message)
            }
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/prospects", get(list_prospects).post(create_prospect))
        .route("/api/prospects/{id}", get(get_prospect).put(update_prospect))
        .route("/api/prospects/{id}/stage", patch(move_stage))
        .route("/api/prospects/{id}/paid", post(mark_paid))
        .route("/api/prospects/{id}/lost", post(mark_lost))
        .route("/api/prospects/{id}/history", get(get_history))
        .route("/api/board", get(get_board))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/commands", post(publish_command))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn parse_sort(raw: Option<&str>, default: SortKey) -> Result<SortKey, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => s.parse().map_err(ApiError::BadRequest),
    }
}

/// Broadcast the outcome of an audited mutation and shape the response.
fn finish_mutation(
    state: &SharedState,
    result: Result<Reconciled, CrmError>,
) -> Result<Json<Prospect>, ApiError> {
    match result {
        Ok(reconciled) => {
            if !reconciled.is_noop() {
                broadcast_message(
                    &state.ws_tx,
                    &WsMessage::ProspectUpdated {
                        prospect: reconciled.prospect.clone(),
                    },
                );
                if let Some(change) = reconciled.changes.iter().find(|c| c.field == "stage") {
                    broadcast_message(
                        &state.ws_tx,
                        &WsMessage::ProspectMoved {
                            prospect_id: reconciled.prospect.id,
                            from_stage: change.previous.clone(),
                            to_stage: change.new.clone(),
                        },
                    );
                }
            }
            Ok(Json(reconciled.prospect))
        }
        Err(err) => {
            if let Some(prospect) = err.persisted_prospect() {
                broadcast_message(
                    &state.ws_tx,
                    &WsMessage::ProspectUpdated {
                        prospect: prospect.clone(),
                    },
                );
                broadcast_message(
                    &state.ws_tx,
                    &WsMessage::HistoryWriteFailed {
                        prospect_id: prospect.id,
                        error: err.to_string(),
                    },
                );
            }
            Err(err.into())
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_prospects(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = ProspectFilter::from_raw(
        query.stage.as_deref(),
        query.temperature.as_deref(),
        query.search.as_deref(),
    )
    .map_err(ApiError::BadRequest)?;
    let sort = parse_sort(query.sort.as_deref(), SortKey::default())?;
    let listing = state.service.list_prospects(&filter, sort).await?;
    Ok(Json(listing))
}

async fn create_prospect(
    State(state): State<SharedState>,
    Json(payload): Json<ProspectPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let prospect = state.service.create_prospect(payload).await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ProspectCreated {
            prospect: prospect.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(prospect)))
}

async fn get_prospect(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let prospect = state.service.get_prospect(id).await?;
    Ok(Json(prospect))
}

async fn update_prospect(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProspectPayload>,
) -> Result<Json<Prospect>, ApiError> {
    let result = state.service.update_prospect(id, payload).await;
    finish_mutation(&state, result)
}

async fn move_stage(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(req): Json<MoveStageRequest>,
) -> Result<Json<Prospect>, ApiError> {
    let stage: Stage = req
        .stage
        .trim()
        .to_lowercase()
        .parse()
        .map_err(ApiError::BadRequest)?;
    let result = state.service.move_stage(id, stage).await;
    finish_mutation(&state, result)
}

async fn mark_paid(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Prospect>, ApiError> {
    let result = state.service.mark_paid(id).await;
    finish_mutation(&state, result)
}

async fn mark_lost(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(req): Json<MarkLostRequest>,
) -> Result<Json<Prospect>, ApiError> {
    let result = state.service.mark_lost(id, &req.reason).await;
    finish_mutation(&state, result)
}

async fn get_history(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state.service.get_history(id).await?;
    Ok(Json(history))
}

async fn get_board(
    State(state): State<SharedState>,
    Query(query): Query<BoardQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let sort = parse_sort(query.sort.as_deref(), state.default_sort)?;
    let board = state.service.board(sort).await?;
    Ok(Json(board))
}

async fn get_dashboard(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let today = chrono::Local::now().date_naive();
    let stats = state.service.dashboard(today).await?;
    Ok(Json(stats))
}

async fn publish_command(
    State(state): State<SharedState>,
    Json(command): Json<UiCommand>,
) -> impl IntoResponse {
    let delivered = state.commands.publish(command);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"delivered": delivered})),
    )
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::db::{CrmDb, DbHandle};
    use crate::crm::store::testing::FailingHistoryStore;
    use crate::crm::store::ProspectStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn state_with(store: Arc<dyn ProspectStore>) -> SharedState {
        let (ws_tx, _) = broadcast::channel(16);
        Arc::new(AppState {
            service: ProspectService::new(store),
            ws_tx,
            commands: CommandBus::new(),
            default_sort: SortKey::default(),
        })
    }

    fn test_state() -> SharedState {
        state_with(Arc::new(DbHandle::new(CrmDb::new_in_memory().unwrap())))
    }

    fn test_app() -> Router {
        api_router().with_state(test_state())
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn create(app: &Router, body: serde_json::Value) -> serde_json::Value {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/prospects", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response.into_body()).await
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = test_app().oneshot(get_req("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_list_prospects_empty_reports_store_empty() {
        let response = test_app().oneshot(get_req("/api/prospects")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listing: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(listing["prospects"].as_array().unwrap().len(), 0);
        assert_eq!(listing["store_empty"], true);
    }

    #[tokio::test]
    async fn test_create_prospect_applies_defaults() {
        let app = test_app();
        let prospect = create(&app, serde_json::json!({"name": "Ana", "company": ""})).await;
        assert_eq!(prospect["name"], "Ana");
        assert_eq!(prospect["stage"], "new");
        assert_eq!(prospect["temperature"], "warm");
        assert!(prospect["company"].is_null());
    }

    #[tokio::test]
    async fn test_create_without_name_is_bad_request() {
        let response = test_app()
            .oneshot(json_request("POST", "/api/prospects", serde_json::json!({"company": "Acme"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("name is required"));
    }

    #[tokio::test]
    async fn test_get_prospect_not_found() {
        let uri = format!("/api/prospects/{}", Uuid::new_v4());
        let response = test_app().oneshot(get_req(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_filters_and_search() {
        let app = test_app();
        create(&app, serde_json::json!({"name": "Ana", "company": "ACME"})).await;
        create(&app, serde_json::json!({"name": "Bruno", "temperature": "hot"})).await;
        create(&app, serde_json::json!({"name": "Carla", "email": "c@acme.io", "temperature": "hot"})).await;

        let response = app
            .clone()
            .oneshot(get_req("/api/prospects?search=acme&temperature=hot&stage=all"))
            .await
            .unwrap();
        let listing: serde_json::Value = body_json(response.into_body()).await;
        let names: Vec<&str> = listing["prospects"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Carla"]);
        assert_eq!(listing["store_empty"], false);

        let bad = app.oneshot(get_req("/api/prospects?sort=sideways")).await.unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_move_stage_and_history() {
        let app = test_app();
        let prospect = create(&app, serde_json::json!({"name": "Ana"})).await;
        let id = prospect["id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                &format!("/api/prospects/{}/stage", id),
                serde_json::json!({"stage": "contacted"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let moved: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(moved["stage"], "contacted");

        let response = app
            .oneshot(get_req(&format!("/api/prospects/{}/history", id)))
            .await
            .unwrap();
        let history: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["field_changed"], "stage");
        assert_eq!(history[0]["previous_value"], "new");
        assert_eq!(history[0]["new_value"], "contacted");
    }

    #[tokio::test]
    async fn test_move_stage_rejects_unknown_stage() {
        let app = test_app();
        let prospect = create(&app, serde_json::json!({"name": "Ana"})).await;
        let response = app
            .oneshot(json_request(
                "PATCH",
                &format!("/api/prospects/{}/stage", prospect["id"].as_str().unwrap()),
                serde_json::json!({"stage": "won"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_broadcasts_changes() {
        let state = test_state();
        let mut rx = state.ws_tx.subscribe();
        let app = api_router().with_state(state);
        let prospect = create(&app, serde_json::json!({"name": "Ana"})).await;
        let created_event = rx.recv().await.unwrap();
        assert!(created_event.contains("ProspectCreated"));

        let response = app
            .oneshot(json_request(
                "PUT",
                &format!("/api/prospects/{}", prospect["id"].as_str().unwrap()),
                serde_json::json!({"name": "Ana", "stage": "paid", "notes": "Wired"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let updated: serde_json::Value =
            serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(updated["type"], "ProspectUpdated");
        let moved: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(moved["type"], "ProspectMoved");
        assert_eq!(moved["data"]["from_stage"], "new");
        assert_eq!(moved["data"]["to_stage"], "paid");
    }

    #[tokio::test]
    async fn test_mark_lost_requires_reason() {
        let app = test_app();
        let prospect = create(&app, serde_json::json!({"name": "Ana"})).await;
        let uri = format!("/api/prospects/{}/lost", prospect["id"].as_str().unwrap());

        let response = app
            .clone()
            .oneshot(json_request("POST", &uri, serde_json::json!({"reason": ""})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request("POST", &uri, serde_json::json!({"reason": "No budget"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let lost: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(lost["stage"], "lost");
        assert_eq!(lost["notes"], "Loss reason: No budget");
    }

    #[tokio::test]
    async fn test_mark_paid() {
        let app = test_app();
        let prospect = create(&app, serde_json::json!({"name": "Ana"})).await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/prospects/{}/paid", prospect["id"].as_str().unwrap()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let paid: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(paid["stage"], "paid");
    }

    #[tokio::test]
    async fn test_partial_write_is_multi_status() {
        let db = DbHandle::new(CrmDb::new_in_memory().unwrap());
        let created = db
            .insert_prospect(crate::crm::models::ProspectFields::named("Ana"))
            .await
            .unwrap();
        let app = api_router().with_state(state_with(Arc::new(FailingHistoryStore::new(db))));

        let response = app
            .oneshot(json_request(
                "PATCH",
                &format!("/api/prospects/{}/stage", created.id),
                serde_json::json!({"stage": "negotiating"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::MULTI_STATUS);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["prospect"]["stage"], "negotiating");
        assert!(body["error"].as_str().unwrap().contains("history"));
    }

    #[tokio::test]
    async fn test_board_has_every_column() {
        let app = test_app();
        create(&app, serde_json::json!({"name": "Ana", "stage": "proposal_sent"})).await;
        let response = app.oneshot(get_req("/api/board?sort=name_asc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let board: serde_json::Value = body_json(response.into_body()).await;
        let columns = board["columns"].as_array().unwrap();
        assert_eq!(columns.len(), 8);
        assert_eq!(columns[4]["stage"], "proposal_sent");
        assert_eq!(columns[4]["count"], 1);
        assert_eq!(board["sort"], "name_asc");
    }

    #[tokio::test]
    async fn test_dashboard() {
        let app = test_app();
        create(&app, serde_json::json!({"name": "Ana", "estimated_amount": "1000", "temperature": "hot"})).await;
        create(&app, serde_json::json!({"name": "Bruno", "estimated_amount": 500, "stage": "lost"})).await;
        let response = app.oneshot(get_req("/api/dashboard")).await.unwrap();
        let stats: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(stats["active"], 1);
        assert_eq!(stats["pipeline_value"], "1000");
        assert_eq!(stats["hot"], 1);
    }

    #[tokio::test]
    async fn test_publish_command_reaches_bus() {
        let state = test_state();
        let mut rx = state.commands.subscribe();
        let app = api_router().with_state(state);
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/commands",
                serde_json::json!({"command": "open_create_form"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["delivered"], 1);
        assert_eq!(rx.recv().await.unwrap(), UiCommand::OpenCreateForm);
    }
}
