//! Render endpoints: the remote side of the delivery protocol.
//!
//! Both take the seven worksheet fields as multipart text and answer with a
//! PDF body. Errors use the `{"error": {...}}` envelope with a 4xx/5xx status,
//! so clients never have to sniff a 200.

use std::collections::HashMap;

use axum::{
    extract::{Multipart, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use crate::delivery::Operation;
use crate::errors::AppError;
use crate::state::AppState;
use crate::worksheet::WorksheetOptions;

/// POST /api/generate-pdf
pub async fn generate_pdf_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let options = read_options(multipart).await?;
    render(state, Operation::Generate, options).await
}

/// POST /api/preview
/// Renders only the first lines of the text.
pub async fn preview_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let options = read_options(multipart).await?.preview_excerpt();
    render(state, Operation::Preview, options).await
}

async fn read_options(mut multipart: Multipart) -> Result<WorksheetOptions, AppError> {
    let mut fields = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field
            .text()
            .await
            .map_err(|e| AppError::Validation(format!("field '{name}' is not text: {e}")))?;
        fields.insert(name, value);
    }
    WorksheetOptions::from_fields(&fields).map_err(|e| {
        warn!(field = e.field(), "rejected worksheet options: {e}");
        AppError::from(e)
    })
}

async fn render(
    state: AppState,
    op: Operation,
    options: WorksheetOptions,
) -> Result<Response, AppError> {
    info!(
        operation = %op,
        layout = %options.layout,
        fill_type = %options.fill_mode,
        font_type = %options.stroke_style,
        orientation = %options.orientation,
        text_chars = options.text.chars().count(),
        "render request"
    );

    // CPU-bound composition, kept off the async executor.
    let composer = state.composer.clone();
    let pdf = tokio::task::spawn_blocking(move || composer.render_pdf(&options, false))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("spawn_blocking failed in render: {e}")))??;

    info!(operation = %op, size = pdf.len(), "render complete");

    let disposition = match op {
        Operation::Generate => "attachment; filename=propisi.pdf",
        Operation::Preview => "inline; filename=preview.pdf",
    };
    Ok((
        [(CONTENT_TYPE, "application/pdf"), (CONTENT_DISPOSITION, disposition)],
        pdf,
    )
        .into_response())
}
