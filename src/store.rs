//! Persistence collaborators: record sink client and record store service.
//!
//! The monitor hands each finalized measurement to a [`RecordSink`],
//! which posts it to the record store over HTTP. Saving is best effort:
//! the measurement pipeline reports results whether or not the save
//! lands, and failures are logged where the call is made.
//!
//! The store itself is a small axum service keeping records in a JSON
//! array file under the data directory.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

/// One saved measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Who was measured.
    pub name: String,
    /// Aggregated pulse (BPM).
    pub pulse: u16,
    /// Aggregated oxygen saturation (%).
    pub spo2: u16,
    /// Derived stress score.
    pub stress_score: u8,
    /// When the measurement finalized.
    pub recorded_at: DateTime<Utc>,
}

/// Record store client/server error types.
#[derive(Debug)]
pub enum StoreError {
    /// Network/HTTP error
    Network(String),
    /// Store returned an error response
    Server { status: u16, message: String },
    /// JSON serialization error
    Serialization(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Network(msg) => write!(f, "Store network error: {msg}"),
            StoreError::Server { status, message } => {
                write!(f, "Store server error ({status}): {message}")
            }
            StoreError::Serialization(msg) => write!(f, "Store serialization error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Client for posting finalized measurements to the record store.
#[derive(Clone)]
pub struct RecordSink {
    base_url: String,
    client: reqwest::Client,
    device_id: String,
}

impl RecordSink {
    /// Create a sink pointed at the store's base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        // Device ID from hostname + instance
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let device_id = format!(
            "oximeter-{}-{}",
            host,
            &uuid::Uuid::new_v4().to_string()[..8]
        );

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            device_id,
        }
    }

    /// Get the device ID.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The records endpoint URL.
    pub fn records_url(&self) -> String {
        format!("{}/api/records", self.base_url)
    }

    /// The health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    /// Probe whether the store is reachable.
    pub async fn health_check(&self) -> Result<bool, StoreError> {
        let response = self
            .client
            .get(self.health_url())
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Save one record.
    ///
    /// Callers treat this as fire-and-forget: log the error and move on.
    pub async fn save(&self, record: &HealthRecord) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.records_url())
            .header("X-Device-Id", &self.device_id)
            .json(record)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StoreError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Record store service
// ---------------------------------------------------------------------------

/// Store service configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Directory holding the records file
    pub data_path: PathBuf,
}

impl StoreConfig {
    /// Create a new store configuration.
    pub fn new(port: u16, data_path: PathBuf) -> Self {
        Self { port, data_path }
    }

    fn records_path(&self) -> PathBuf {
        self.data_path.join("health_records.json")
    }
}

/// Shared store state.
struct StoreState {
    records_path: PathBuf,
    /// Serializes the read-modify-write of the records file.
    write_lock: Mutex<()>,
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response from the save endpoint.
#[derive(Serialize)]
pub struct SaveResponse {
    pub status: String,
    pub saved: usize,
}

/// Error response.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Read the records file, treating a missing or unreadable file as empty.
fn load_records(path: &Path) -> Vec<HealthRecord> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "records file unreadable, starting empty");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    }
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/records
async fn list_records(State(state): State<Arc<StoreState>>) -> Json<Vec<HealthRecord>> {
    Json(load_records(&state.records_path))
}

/// POST /api/records
async fn save_record(
    State(state): State<Arc<StoreState>>,
    Json(record): Json<HealthRecord>,
) -> Result<Json<SaveResponse>, (StatusCode, Json<ErrorResponse>)> {
    let _guard = state.write_lock.lock().await;

    let mut records = load_records(&state.records_path);
    records.push(record);

    let json = serde_json::to_string_pretty(&records).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to serialize records: {e}"),
                code: "STORE_ERROR".to_string(),
            }),
        )
    })?;

    std::fs::write(&state.records_path, json).map_err(|e| {
        tracing::error!(error = %e, "failed to write records file");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to write records: {e}"),
                code: "STORE_ERROR".to_string(),
            }),
        )
    })?;

    Ok(Json(SaveResponse {
        status: "ok".to_string(),
        saved: records.len(),
    }))
}

/// Run the record store service.
pub async fn run(config: StoreConfig) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    std::fs::create_dir_all(&config.data_path)?;

    let state = Arc::new(StoreState {
        records_path: config.records_path(),
        write_lock: Mutex::new(()),
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/records", get(list_records).post(save_record))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("record store listening on http://{actual_addr}");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("record store shutdown signal received");
            })
            .await
        {
            tracing::error!("record store error: {e}");
        }
    });

    Ok((actual_addr, shutdown_tx))
}
