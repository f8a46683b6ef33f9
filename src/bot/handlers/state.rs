use crate::admin::Sessions;
use crate::config::Config;
use crate::db::Db;
use crate::telegram::Client;
use std::sync::Arc;
use teloxide::types::Message;

/// Shared handler state. The store and the client are optional on
/// purpose: when startup fails to bring one of them up, the process keeps
/// serving health endpoints and handlers degrade to a busy reply.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Option<Arc<Db>>,
    pub client: Option<Arc<Client>>,
    pub sessions: Arc<Sessions>,
    pub bot_id: Option<i64>,
    pub bot_username: Option<String>,
}

impl AppState {
    pub fn db(&self) -> Option<&Db> {
        self.db.as_deref()
    }

    pub fn client(&self) -> Option<&Client> {
        self.client.as_deref()
    }
}

pub fn sender_user_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().map(|user| user.id.0 as i64)
}

pub fn sender_is_bot(msg: &Message, own_bot_id: Option<i64>) -> bool {
    let Some(user) = msg.from.as_ref() else {
        return false;
    };
    user.is_bot || own_bot_id == Some(user.id.0 as i64)
}
