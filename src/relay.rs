// src/relay.rs
//
// The intermediary deployment variant: the client ships a stored-object
// name instead of inline image data, and this process performs the vision
// call with a credential the capturing device never sees.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::analyze::VisionClient;
use crate::config::Config;
use crate::error::ScanError;
use crate::parse::MedicationRecord;
use crate::store::ObjectStore;

pub const DEFAULT_RELAY_ADDR: &str = "0.0.0.0:8787";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub file_name: String,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
struct RelayErrorBody {
    error: Option<String>,
}

fn relay_error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<RelayErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string())
        })
}

/// Client side: ask a relay to analyze a previously uploaded object.
pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(relay_url: &str) -> Self {
        info!(url = %relay_url, "Using relay vision backend");
        Self {
            client: Client::new(),
            base_url: relay_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn analyze(
        &self,
        file_name: &str,
        prompt: &str,
    ) -> Result<MedicationRecord, ScanError> {
        if file_name.trim().is_empty() {
            return Err(ScanError::MissingInput("no stored image name".to_string()));
        }
        if prompt.trim().is_empty() {
            return Err(ScanError::MissingInput(
                "analysis instruction is empty".to_string(),
            ));
        }

        let url = format!("{}/analyze", self.base_url);
        let request = RelayRequest {
            file_name: file_name.to_string(),
            prompt: prompt.to_string(),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::Upstream(relay_error_message(status, &body)));
        }

        // The relay returns the already-parsed six-field record.
        Ok(response.json().await?)
    }
}

struct RelayState {
    store: ObjectStore,
    vision: VisionClient,
}

/// Run the relay server until the process is stopped.
pub async fn serve(cfg: &Config, addr: &str) -> Result<(), ScanError> {
    let storage = cfg.storage.as_ref().ok_or_else(|| {
        ScanError::Config("[storage] section is required to run the relay".to_string())
    })?;

    let state = Arc::new(RelayState {
        store: ObjectStore::new(storage)?,
        vision: VisionClient::new(&cfg.vision)?,
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Relay listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn analyze(
    State(state): State<Arc<RelayState>>,
    Json(request): Json<RelayRequest>,
) -> Response {
    if request.file_name.trim().is_empty() || request.prompt.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "fileName and prompt are required"})),
        )
            .into_response();
    }

    info!(
        file_name = %request.file_name,
        prompt_len = request.prompt.len(),
        "Relay analysis requested"
    );

    let image = match state.store.download(&request.file_name).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, file_name = %request.file_name, "Image download failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("failed to download image: {e}")})),
            )
                .into_response();
        }
    };

    match state.vision.analyze(&request.prompt, &image).await {
        Ok(record) => {
            let (filled, total) = record.coverage();
            info!(filled, total, "Relay analysis complete");
            (StatusCode::OK, Json(record)).into_response()
        }
        Err(e) => {
            error!(error = %e, "Relay analysis failed");
            let status = match &e {
                ScanError::Upstream(_) | ScanError::EmptyResponse => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_request_wire_shape() {
        let request = RelayRequest {
            file_name: "abc123.jpg".to_string(),
            prompt: "instrução".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["fileName"], "abc123.jpg");
        assert_eq!(json["prompt"], "instrução");

        let parsed: RelayRequest =
            serde_json::from_str(r#"{"fileName":"x.jpg","prompt":"p"}"#).unwrap();
        assert_eq!(parsed.file_name, "x.jpg");
    }

    #[test]
    fn test_relay_error_message() {
        let msg = relay_error_message(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"failed to download image: gone"}"#,
        );
        assert_eq!(msg, "failed to download image: gone");

        let msg = relay_error_message(reqwest::StatusCode::BAD_GATEWAY, "");
        assert_eq!(msg, "Bad Gateway");
    }

    #[tokio::test]
    async fn test_missing_file_name_short_circuits() {
        let client = RelayClient::new("http://unreachable.invalid");
        let err = client.analyze("", "instrução").await.unwrap_err();
        assert!(matches!(err, ScanError::MissingInput(_)));

        let err = client.analyze("x.jpg", " ").await.unwrap_err();
        assert!(matches!(err, ScanError::MissingInput(_)));
    }
}
