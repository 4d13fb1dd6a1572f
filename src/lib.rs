//! qualys-report-fetch library
//!
//! This crate provides the core functionality for the `qualys-report-fetch`
//! binary: log in to a Qualys-style vulnerability management API, list the
//! available scan reports, validate that listing against the DTD it declares,
//! and download every listed report into a dated directory.
//!
//! ## Overview
//!
//! - [`session`] - Cookie-carrying HTTP session and the login/listing calls
//! - [`catalog`] - XML parsing, DTD fetching and DTD validation of the report listing
//! - [`downloader`] - Dated output directory and report downloads
//! - [`cli`] - Command-line interface and the end-to-end workflow
//! - [`config`] - Environment credentials and TOML settings
//! - [`models`] - Report catalog entries and write modes
//! - [`errors`] - Error types used throughout the application
//!
//! ## Example Usage
//!
//! ```no_run
//! use qualys_report_fetch::cli::{run_workflow, RunOutcome};
//! use qualys_report_fetch::config::{Config, Settings};
//! use qualys_report_fetch::errors::AppResult;
//!
//! # async fn example() -> AppResult<()> {
//! let config = Config::from_env(Settings::default())?;
//! let today = chrono::Local::now().date_naive();
//! let mut stdout = std::io::stdout();
//! if let RunOutcome::Completed { reports } = run_workflow(&config, today, &mut stdout).await? {
//!     println!("{} reports saved", reports.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod constants;
pub mod downloader;
pub mod errors;
pub mod logging;
pub mod models;
pub mod session;
