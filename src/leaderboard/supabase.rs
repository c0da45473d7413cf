//! Supabase leaderboard store over the PostgREST HTTP interface.
//!
//! - insert: `POST {url}/rest/v1/{table}` with `Prefer: return=minimal`
//! - window: `POST {url}/rest/v1/rpc/{procedure}` with named arguments

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LeaderboardConfig;
use crate::leaderboard::{LeaderboardRow, LeaderboardStore, StoreError, WindowRow};

#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: reqwest::Client,
    rest_base: String,
    key: String,
    table: String,
    procedure: String,
}

#[derive(Serialize)]
struct WindowArgs<'a> {
    p_initials: &'a str,
    p_score: i64,
    p_window_size: i64,
}

/// PostgREST error body.
#[derive(Deserialize)]
struct PostgrestError {
    message: String,
    #[serde(default)]
    details: Option<String>,
}

impl SupabaseStore {
    pub fn new(url: &str, key: &str, config: &LeaderboardConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            rest_base: format!("{}/rest/v1", url.trim_end_matches('/')),
            key: key.to_string(),
            table: config.table.clone(),
            procedure: config.window_procedure.clone(),
        })
    }

    pub fn rest_base(&self) -> &str {
        &self.rest_base
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/{}", self.rest_base, path))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }
}

#[async_trait]
impl LeaderboardStore for SupabaseStore {
    async fn insert(&self, row: &LeaderboardRow) -> Result<(), StoreError> {
        let response = self
            .post(&self.table)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;
        check_status(response).await?;

        debug!(table = self.table, initials = row.initials, "Leaderboard row inserted");
        Ok(())
    }

    async fn window(
        &self,
        initials: &str,
        score: i64,
        window_size: i64,
    ) -> Result<Vec<WindowRow>, StoreError> {
        let args = WindowArgs {
            p_initials: initials,
            p_score: score,
            p_window_size: window_size,
        };
        let response = self
            .post(&format!("rpc/{}", self.procedure))
            .json(&args)
            .send()
            .await?;
        let response = check_status(response).await?;

        let text = response.text().await?;
        parse_rows(&text)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status,
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<PostgrestError>(body) {
        Ok(PostgrestError {
            message,
            details: Some(details),
        }) => format!("{message} ({details})"),
        Ok(err) => err.message,
        Err(_) => body.trim().to_string(),
    }
}

/// Procedure output: an array of rows, or `null`/empty body when nothing matched.
fn parse_rows(body: &str) -> Result<Vec<WindowRow>, StoreError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<WindowRow>(body) {
        Ok(WindowRow::Array(rows)) => Ok(rows),
        Ok(WindowRow::Null) => Ok(Vec::new()),
        Ok(other) => Err(StoreError::Decode(format!("expected an array, got {other}"))),
        Err(e) => Err(StoreError::Decode(e.to_string())),
    }
}
