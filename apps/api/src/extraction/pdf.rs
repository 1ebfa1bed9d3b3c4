use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("could not read PDF: {0}")]
    Unreadable(String),

    #[error("PDF text extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Extracts the raw text layer of a PDF.
/// Parsing is CPU-bound, so it runs on the blocking pool.
pub async fn extract_pdf_text(data: Bytes) -> Result<String, PdfError> {
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem(&data).map_err(|e| PdfError::Unreadable(e.to_string()))
    })
    .await?
}
