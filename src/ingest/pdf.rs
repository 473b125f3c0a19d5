//! PDF discovery and text extraction

use std::path::{Path, PathBuf};

use crate::error::{Error, Result, StatusCode};

/// `*.pdf` files directly under `folder`, sorted by path
pub async fn list_pdfs(folder: &Path) -> Result<Vec<PathBuf>> {
    if !tokio::fs::metadata(folder).await.is_ok_and(|m| m.is_dir()) {
        return Err(Error::other(
            StatusCode::PDF_FOLDER_MISSING,
            format!("Path of PDF files does NOT exist: {}", folder.display()),
        ));
    }

    let mut entries = tokio::fs::read_dir(folder).await?;
    let mut pdfs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && entry.file_type().await?.is_file() {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

/// Text of a PDF, pages in order
pub async fn read_pdf(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| Error::Pdf {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| Error::Pdf {
            path: display.clone(),
            reason: e.to_string(),
        })?
        .map_err(|e| Error::Pdf {
            path: display,
            reason: e.to_string(),
        })
}
