//! UI command bus.
//!
//! Views subscribe to a broadcast channel of [`UiCommand`]s instead of
//! listening for ad hoc global events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const COMMAND_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum UiCommand {
    OpenCreateForm,
    OpenEditForm { prospect_id: Uuid },
    RefreshViews,
}

#[derive(Clone)]
pub struct CommandBus {
    tx: broadcast::Sender<UiCommand>,
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(COMMAND_CAPACITY);
        Self { tx }
    }

    /// Publish to every current subscriber. Returns how many received it;
    /// zero subscribers is not an error.
    pub fn publish(&self, command: UiCommand) -> usize {
        match self.tx.send(command) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(command)) => {
                debug!(?command, "No subscribers for UI command");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiCommand> {
        self.tx.subscribe()
    }
}
