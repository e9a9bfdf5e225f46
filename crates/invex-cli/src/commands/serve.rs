//! Serve command - HTTP upload service.
//!
//! `POST /upload` takes one PDF as the multipart field `file`, runs it
//! through the single-document pipeline and answers with the extracted
//! record. `GET /health` reports liveness.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use console::style;
use serde::Serialize;
use tempfile::TempDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use invex_core::pipeline::is_pdf_path;
use invex_core::{InvoicePipeline, InvoiceRecord};

use super::{load_config, prepare_output_dir};

/// Largest accepted request body.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on (default: 0.0.0.0:5000)
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory holding uploads while they are processed
    #[arg(long)]
    upload_dir: Option<PathBuf>,

    /// Output directory for the XML documents and summary workbook
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

/// Shared handler state.
pub struct AppState {
    pipeline: Arc<InvoicePipeline>,
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct UploadResponse {
    message: ProcessOutcome,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ProcessOutcome {
    Success {
        message: &'static str,
        data: InvoiceRecord,
    },
    Failure {
        error: String,
    },
}

pub async fn run(args: ServeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let pipeline = InvoicePipeline::from_config(&config)?;
    let output_dir = prepare_output_dir(args.output_dir, &config)?;
    let upload_dir = args.upload_dir.unwrap_or_else(|| config.server.upload_dir.clone());
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

    let state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
        upload_dir,
        output_dir,
    });

    let listener = tokio::net::TcpListener::bind(bind.as_str()).await?;
    let addr = listener.local_addr()?;
    info!("Starting invex on http://{}", addr);
    println!("{} Listening on http://{}", style("✓").green(), addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Routes of the upload service.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/upload", post(handle_upload))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: "Application is running!",
    })
}

fn reject(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

async fn handle_upload(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let mut files: Vec<(String, Bytes)> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return reject(e.status(), e.body_text()),
        };
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(bytes) => files.push((file_name, bytes)),
            Err(e) => {
                warn!("Failed to read upload bytes: {}", e);
                return reject(e.status(), e.body_text());
            }
        }
    }

    let (file_name, bytes) = match validate_upload(files) {
        Ok(upload) => upload,
        Err(message) => return reject(StatusCode::BAD_REQUEST, message),
    };

    let (upload_dir, file_path) = match store_upload(&state.upload_dir, &file_name, &bytes).await {
        Ok(stored) => stored,
        Err(e) => {
            error!("Failed to store upload {}: {}", file_name, e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store uploaded file");
        }
    };
    info!("File saved to: {}", file_path.display());

    let outcome = match state
        .pipeline
        .process_document(&file_path, &state.output_dir)
        .await
    {
        Ok(processed) => ProcessOutcome::Success {
            message: "Processing successful",
            data: processed.record,
        },
        Err(e) => {
            warn!("{} ({})", e, e.stage());
            ProcessOutcome::Failure {
                error: e.to_string(),
            }
        }
    };

    let upload_path = upload_dir.path().to_path_buf();
    if let Err(e) = upload_dir.close() {
        warn!("Failed to remove upload {}: {}", upload_path.display(), e);
    }

    (StatusCode::OK, Json(UploadResponse { message: outcome })).into_response()
}

/// Check the `file` parts of an upload and return the single PDF with a
/// file name safe to use inside the upload directory.
fn validate_upload<T>(mut files: Vec<(String, T)>) -> Result<(String, T), &'static str> {
    if files.is_empty() {
        return Err("Missing file input");
    }
    if files.len() > 1 {
        let names: Vec<&str> = files.iter().map(|(name, _)| name.as_str()).collect();
        error!("Multiple files uploaded: {:?}", names);
        return Err("Only one pdf file is allowed as input");
    }

    let (name, content) = files.remove(0);
    let file_name = match Path::new(&name).file_name() {
        Some(n) if !n.is_empty() => n.to_string_lossy().into_owned(),
        _ => return Err("No file selected"),
    };
    if !is_pdf_path(Path::new(&file_name)) {
        return Err("Input type is not recognised");
    }

    Ok((file_name, content))
}

async fn store_upload(
    upload_dir: &Path,
    file_name: &str,
    bytes: &[u8],
) -> std::io::Result<(TempDir, PathBuf)> {
    tokio::fs::create_dir_all(upload_dir).await?;
    let dir = tempfile::Builder::new()
        .prefix("upload-")
        .tempdir_in(upload_dir)?;
    let path = dir.path().join(file_name);
    tokio::fs::write(&path, bytes).await?;
    Ok((dir, path))
}
