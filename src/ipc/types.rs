use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::notify::Notifier;
use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub notifier: Box<dyn Notifier>,
    pub retry: RetryPolicy,
}
