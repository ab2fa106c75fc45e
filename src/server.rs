use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::database::Database;
use crate::feed::render_rss;
use crate::imap_client::ImapClient;
use crate::ollama_client::OllamaClient;

/// Timeout of the generation call made by `/status?test_llm=true`
pub const LLM_TEST_TIMEOUT: Duration = Duration::from_secs(5);
const LIGHTWEIGHT_NOTE: &str = "Lightweight check - add ?test_llm=true for full test";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub database: Arc<Database>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rss", get(rss_feed))
        .route("/status", get(status_check))
        .with_state(state)
}

pub async fn run_server(state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .with_context(|| format!("Invalid server address {}", state.config.server.host))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Unable to bind {}", addr))?;
    info!("🌐 Web server listening on http://{}", addr);

    axum::serve(listener, router(state)).await.context("Web server failed")?;
    Ok(())
}

async fn rss_feed(State(state): State<AppState>) -> Response {
    let rendered = match state.database.fetch_all().await {
        Ok(records) => render_rss(&records, Utc::now(), &state.config.server.public_url),
        Err(e) => Err(e.into()),
    };

    match rendered {
        Ok(xml) => ([(header::CONTENT_TYPE, "application/rss+xml")], xml).into_response(),
        Err(e) => {
            error!("Unable to render feed: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "feed unavailable").into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    test_llm: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImapStatus {
    pub status: String,
    pub email_count: Option<usize>,
    pub folders: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OllamaStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_response: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SqliteStatus {
    pub status: String,
    pub summary_count: Option<i64>,
}

/// Body of `/status`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusReport {
    pub imap: ImapStatus,
    pub ollama: OllamaStatus,
    pub sqlite: SqliteStatus,
    pub overall: String,
}

impl StatusReport {
    pub fn new(imap: ImapStatus, ollama: OllamaStatus, sqlite: SqliteStatus) -> Self {
        let healthy = [&imap.status, &ollama.status, &sqlite.status]
            .iter()
            .all(|status| status.as_str() == "ok");
        Self {
            imap,
            ollama,
            sqlite,
            overall: if healthy { "ok" } else { "error" }.to_string(),
        }
    }
}

async fn status_check(State(state): State<AppState>, Query(params): Query<StatusParams>) -> Json<StatusReport> {
    let test_llm = params
        .test_llm
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let report = StatusReport::new(
        probe_imap(&state.config).await,
        probe_ollama(&state.config, test_llm).await,
        probe_sqlite(&state.database).await,
    );
    Json(report)
}

pub async fn probe_imap(config: &Config) -> ImapStatus {
    info!("Checking IMAP connection...");

    let result: std::result::Result<(usize, Vec<String>), crate::error::MailboxError> = async {
        let mut client = ImapClient::connect(&config.imap).await?;
        let folders = client.list_folders().await?;
        let count = client.message_count().await?;
        client.logout().await?;
        Ok((count, folders))
    }
    .await;

    match result {
        Ok((count, folders)) => {
            info!("IMAP connection OK. Email count: {}. Folders: {:?}", count, folders);
            ImapStatus {
                status: "ok".to_string(),
                email_count: Some(count),
                folders: Some(folders),
            }
        }
        Err(e) => {
            error!("IMAP check failed: {}", e);
            ImapStatus {
                status: format!("error: {}", e),
                email_count: None,
                folders: None,
            }
        }
    }
}

pub async fn probe_ollama(config: &Config, test_llm: bool) -> OllamaStatus {
    info!("Checking Ollama connection...");

    let result = if test_llm {
        match OllamaClient::with_timeout(&config.ollama, LLM_TEST_TIMEOUT) {
            Ok(client) => client.generate("Test").await.map(|response| OllamaStatus {
                status: "ok".to_string(),
                note: None,
                test_response: Some(response.chars().take(100).collect()),
            }),
            Err(e) => Err(e),
        }
    } else {
        match OllamaClient::with_timeout(&config.ollama, LLM_TEST_TIMEOUT) {
            Ok(client) => client.ping().await.map(|()| OllamaStatus {
                status: "ok".to_string(),
                note: Some(LIGHTWEIGHT_NOTE.to_string()),
                test_response: None,
            }),
            Err(e) => Err(e),
        }
    };

    result.unwrap_or_else(|e| {
        error!("Ollama check failed: {}", e);
        OllamaStatus {
            status: format!("error: {}", e),
            note: None,
            test_response: None,
        }
    })
}

pub async fn probe_sqlite(database: &Database) -> SqliteStatus {
    match database.count().await {
        Ok(count) => SqliteStatus {
            status: "ok".to_string(),
            summary_count: Some(count),
        },
        Err(e) => {
            error!("SQLite check failed: {}", e);
            SqliteStatus {
                status: format!("error: {}", e),
                summary_count: None,
            }
        }
    }
}
