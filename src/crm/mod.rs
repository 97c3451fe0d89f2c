//! Prospect pipeline: storage, change tracking, and the board/list/dashboard
//! projections, plus the HTTP and WebSocket surface over them.
//!
//! | Module        | Role                                                   |
//! |---------------|--------------------------------------------------------|
//! | `models`      | Prospect, stages, temperatures, history entries        |
//! | `payload`     | Raw form payloads and their coercion                   |
//! | `db`          | SQLite tables behind `DbHandle`                        |
//! | `store`       | `ProspectStore` seam                                   |
//! | `reconciler`  | Field diffs and the audited update path                |
//! | `listing`     | Filters, search and sort keys                          |
//! | `board`       | Stage columns and the optimistic drag state machine    |
//! | `dashboard`   | Pipeline statistics                                    |
//! | `commands`    | UI command bus                                         |
//! | `service`     | `ProspectService`, the operation facade                |
//! | `api`/`ws`    | REST handlers and the event stream                     |
//! | `server`      | Router assembly and startup                            |

pub mod api;
pub mod board;
pub mod commands;
pub mod dashboard;
pub mod db;
pub mod listing;
pub mod models;
pub mod payload;
pub mod reconciler;
pub mod server;
pub mod service;
pub mod store;
pub mod ws;

pub use models::{Commitment, HistoryEntry, Prospect, ProspectFields, Stage, Temperature};
pub use service::ProspectService;
