//! Report download operations.
//!
//! This module creates the dated output directory and downloads the reports
//! listed in a validated catalog. The main entry points are [`fetch_all`] and
//! [`fetch_one`].

mod file_downloader;

// Re-export public API
pub use file_downloader::{create_report_dir, fetch_all, fetch_one, report_dir_name};
