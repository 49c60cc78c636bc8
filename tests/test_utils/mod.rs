//! Test utilities shared by the integration suites.
//!
//! Provides an in-memory SQLite database with migrations applied, a scripted
//! provider caller that replays canned responses, and JSON builders for
//! provider pages.
#![allow(dead_code)]

use anyhow::Result;
use bytes::Bytes;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use drivesync::provider::{AuthenticatedCaller, ProviderResponse};
use drivesync::runner::JobRunner;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Tick the runner until no pending or running jobs remain.
pub async fn run_until_settled(runner: &JobRunner) {
    for _ in 0..200 {
        runner.tick_once().await.expect("tick failed");
        runner.drain().await;
        let stats = runner.get_stats().await.expect("stats failed");
        if stats.jobs.pending == 0 && stats.jobs.running == 0 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("jobs never settled");
}

/// A caller that replays a scripted sequence of responses and records the
/// URLs it was asked for.
pub struct ScriptedCaller {
    responses: Mutex<VecDeque<drivesync::Result<ProviderResponse>>>,
    requested_urls: Mutex<Vec<String>>,
}

impl ScriptedCaller {
    /// Build a caller over an ordered response script.
    pub fn new(responses: Vec<drivesync::Result<ProviderResponse>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requested_urls: Mutex::new(Vec::new()),
        })
    }

    /// URLs requested so far, in order.
    #[allow(dead_code)]
    pub fn requested_urls(&self) -> Vec<String> {
        self.requested_urls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AuthenticatedCaller for ScriptedCaller {
    async fn get(&self, url: &str) -> drivesync::Result<ProviderResponse> {
        self.requested_urls.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted caller ran out of responses")
    }
}

/// A 200 response with the given JSON body.
pub fn ok_json(body: &Value) -> drivesync::Result<ProviderResponse> {
    Ok(ProviderResponse::new(
        200,
        HashMap::new(),
        Bytes::from(body.to_string()),
    ))
}

/// A bare response with the given status and a short text body.
#[allow(dead_code)]
pub fn status_response(status: u16) -> drivesync::Result<ProviderResponse> {
    Ok(ProviderResponse::new(
        status,
        HashMap::new(),
        Bytes::from_static(b"scripted failure"),
    ))
}

/// A minimal descriptor JSON object.
pub fn file_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "mimeType": "text/plain",
        "size": "64",
        "parents": ["root"]
    })
}

/// A descriptor listing page.
pub fn list_page(files: Vec<Value>, next_page_token: Option<&str>) -> Value {
    let mut page = json!({ "files": files });
    if let Some(token) = next_page_token {
        page["nextPageToken"] = json!(token);
    }
    page
}

/// A change listing page. `new_start` is only present on the final page.
#[allow(dead_code)]
pub fn change_page(
    changes: Vec<Value>,
    next_page_token: Option<&str>,
    new_start: Option<&str>,
) -> Value {
    let mut page = json!({ "changes": changes });
    if let Some(token) = next_page_token {
        page["nextPageToken"] = json!(token);
    }
    if let Some(token) = new_start {
        page["newStartPageToken"] = json!(token);
    }
    page
}

/// A change record carrying an updated descriptor.
#[allow(dead_code)]
pub fn change_with_file(file: Value) -> Value {
    json!({ "removed": false, "file": file })
}

/// A change record marking a file as removed.
#[allow(dead_code)]
pub fn removed_change(file_id: &str) -> Value {
    json!({ "removed": true, "fileId": file_id })
}
