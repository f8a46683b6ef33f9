//! Update handlers: dispatch by update shape into the message and
//! callback paths.

#[path = "handlers/callbacks.rs"]
mod callbacks;
#[path = "handlers/flows.rs"]
mod flows;
#[path = "handlers/format.rs"]
mod format;
#[path = "handlers/messages.rs"]
mod messages;
#[path = "handlers/shared.rs"]
mod shared;
#[path = "handlers/state.rs"]
mod state;

pub use state::AppState;

use shared::HandlerResult;
use teloxide::types::{Update, UpdateKind};

pub async fn dispatch(state: &AppState, update: Update) -> HandlerResult {
    match update.kind {
        UpdateKind::Message(msg) | UpdateKind::EditedMessage(msg) => {
            messages::handle_message(state, &msg).await
        }
        UpdateKind::CallbackQuery(q) => callbacks::handle_callback(state, &q).await,
        other => {
            tracing::debug!(kind = ?other, "Ignoring update with no handler");
            Ok(())
        }
    }
}
