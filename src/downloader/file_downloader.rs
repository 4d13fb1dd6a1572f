use crate::config::Config;
use crate::constants::REPORT_DIR_DATE_FORMAT;
use crate::errors::{AppError, AppResult};
use crate::models::{ReportCatalogEntry, WriteMode};
use crate::session::Session;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Name of the dated directory reports are written to, e.g. `2024_05_01`.
pub fn report_dir_name(date: NaiveDate) -> String {
    date.format(REPORT_DIR_DATE_FORMAT).to_string()
}

/// Creates `{root}/{YYYY_MM_DD}` if it does not exist and returns its path.
pub async fn create_report_dir(root: &Path, date: NaiveDate) -> AppResult<PathBuf> {
    let report_dir = root.join(report_dir_name(date));
    fs::create_dir_all(&report_dir).await.map_err(|e| {
        AppError::IoError(format!(
            "Failed to create directory {}: {e}",
            report_dir.display()
        ))
    })?;
    debug!(dir = %report_dir.display(), "Report directory ready");
    Ok(report_dir)
}

/// Downloads a single report into `dest_dir` and returns the written path.
///
/// The request carries the session headers. The response status is not
/// checked: a non-success status is logged and its body is still written.
/// [`WriteMode::Binary`] writes the raw bytes; [`WriteMode::Text`] decodes the
/// body (charset from `Content-Type`, lossy) and writes it as UTF-8.
///
/// # Errors
///
/// Returns `NetworkError` if the request or body read fails and `IoError` if
/// the file cannot be written.
pub async fn fetch_one(
    session: &Session,
    config: &Config,
    entry: &ReportCatalogEntry,
    dest_dir: &Path,
) -> AppResult<PathBuf> {
    let url = config.report_download_url(&entry.id);
    download_report(session, &url, entry, 0, dest_dir).await
}

/// Downloads every report in catalog order.
///
/// With `concurrent_downloads == 1` downloads run one after another and the
/// first failure stops the rest. With a larger value, downloads are spawned as
/// tasks gated by a semaphore; all of them run to completion and the first
/// failure in catalog order is returned.
///
/// # Returns
///
/// The written file paths, in catalog order.
pub async fn fetch_all(
    session: &Session,
    config: &Config,
    entries: &[ReportCatalogEntry],
    dest_dir: &Path,
) -> AppResult<Vec<PathBuf>> {
    if entries.is_empty() {
        info!("No reports listed in the catalog");
        return Ok(Vec::new());
    }

    let concurrent_downloads = config.settings.concurrent_downloads.max(1);
    info!(
        total = entries.len(),
        concurrency = concurrent_downloads,
        "Starting report downloads"
    );

    let paths = if concurrent_downloads == 1 {
        let mut paths = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let url = config.report_download_url(&entry.id);
            paths.push(download_report(session, &url, entry, index, dest_dir).await?);
        }
        paths
    } else {
        fetch_bounded(session, config, entries, dest_dir, concurrent_downloads).await?
    };

    info!(downloaded = paths.len(), "Download completed");
    Ok(paths)
}

async fn fetch_bounded(
    session: &Session,
    config: &Config,
    entries: &[ReportCatalogEntry],
    dest_dir: &Path,
    concurrent_downloads: usize,
) -> AppResult<Vec<PathBuf>> {
    let semaphore = Arc::new(Semaphore::new(concurrent_downloads));
    let dest_dir = Arc::new(dest_dir.to_path_buf());
    let mut handles: Vec<JoinHandle<AppResult<PathBuf>>> = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        // Owned values for the task
        let semaphore = semaphore.clone();
        let session = session.clone();
        let dest_dir = dest_dir.clone();
        let url = config.report_download_url(&entry.id);
        let entry = entry.clone();

        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire().await.map_err(|e| {
                AppError::IoError(format!("Failed to acquire semaphore permit: {e}"))
            })?;
            download_report(&session, &url, &entry, index, &dest_dir).await
        });
        handles.push(handle);
    }

    let mut paths = Vec::with_capacity(handles.len());
    let mut first_error: Option<AppError> = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(path)) => paths.push(path),
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(e) => {
                first_error.get_or_insert(AppError::IoError(format!("Task join error: {e}")));
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(paths),
    }
}

async fn download_report(
    session: &Session,
    url: &str,
    entry: &ReportCatalogEntry,
    index: usize,
    dest_dir: &Path,
) -> AppResult<PathBuf> {
    let file_name = entry.file_name();
    let file_path = dest_dir.join(&file_name);
    // Catalog position keeps temp files distinct when file names collide.
    let tmp_path = dest_dir.join(format!("{file_name}.{index}.part"));

    let response = session.get(url).await.map_err(|e| {
        AppError::NetworkError(format!("Failed to download report {}: {e}", entry.id))
    })?;

    let status = response.status();
    if !status.is_success() {
        warn!(
            report_id = %entry.id,
            status = status.as_u16(),
            "Report download returned a non-success status, writing body as received"
        );
    }

    let write_mode = entry.write_mode();
    let contents = match write_mode {
        WriteMode::Binary => response.bytes().await?.to_vec(),
        WriteMode::Text => response.text().await?.into_bytes(),
    };

    write_file(&tmp_path, &file_path, &contents).await?;

    info!(
        report_id = %entry.id,
        file = %file_path.display(),
        mode = ?write_mode,
        bytes = contents.len(),
        "Report saved"
    );
    Ok(file_path)
}

/// Writes `contents` to `tmp_path`, then renames it onto `file_path`.
async fn write_file(tmp_path: &Path, file_path: &Path, contents: &[u8]) -> AppResult<()> {
    let mut file = File::create(tmp_path).await.map_err(|e| {
        AppError::IoError(format!(
            "Failed to create temp file {}: {}",
            tmp_path.display(),
            e
        ))
    })?;

    file.write_all(contents).await.map_err(|e| {
        AppError::IoError(format!(
            "Failed to write to temp file {}: {}",
            tmp_path.display(),
            e
        ))
    })?;
    file.flush().await?;

    // Ensure the file is closed before renaming
    drop(file);

    fs::rename(tmp_path, file_path).await.map_err(|e| {
        AppError::IoError(format!(
            "Failed to rename temp file {} to {}: {}",
            tmp_path.display(),
            file_path.display(),
            e
        ))
    })?;

    Ok(())
}
