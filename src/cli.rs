use crate::catalog::{validate_and_extract, ValidationError};
use crate::config::{Config, Settings};
use crate::downloader::{create_report_dir, fetch_all};
use crate::errors::AppResult;
use crate::session::Session;
use chrono::{Local, NaiveDate};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

// CLI metadata constants
const APP_NAME: &str = env!("CARGO_PKG_NAME");
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const APP_AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
const APP_ABOUT: &str = env!("CARGO_PKG_DESCRIPTION");

// Console status lines
pub const AUTH_SUCCESS: &str = "Authentication successful";
pub const AUTH_FAILURE: &str = "Authentication failed";
pub const VALIDATION_SUCCESS: &str = "XML validation successful";
pub const VALIDATION_FAILURE: &str = "XML validation failed";

/// How a run ended when no fatal error occurred.
#[derive(Debug)]
pub enum RunOutcome {
    /// The login endpoint did not answer 200; nothing was listed.
    AuthenticationFailed,
    /// The catalog was not trusted; nothing was downloaded.
    ValidationFailed(ValidationError),
    /// Every listed report was written, in catalog order.
    Completed { reports: Vec<PathBuf> },
}

fn build_command() -> Command<'static> {
    Command::new(APP_NAME)
        .version(APP_VERSION)
        .author(APP_AUTHOR)
        .about(APP_ABOUT)
        .after_help(
            "Credentials are read from QUALYS_USER, QUALYS_PASS and BASE_API_URL.\nExample:\n  qualys-report-fetch --output-dir /srv/reports --concurrency 4",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to a TOML settings file")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("output_dir")
                .short('o')
                .long("output-dir")
                .help("Directory under which the dated report directory is created")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("concurrency")
                .short('j')
                .long("concurrency")
                .help("Number of reports downloaded in parallel (default 1)")
                .value_parser(clap::value_parser!(usize))
                .action(ArgAction::Set),
        )
}

/// Resolves settings: the TOML file if given, otherwise defaults, with
/// command-line flags taking precedence.
fn resolve_settings(matches: &ArgMatches) -> AppResult<Settings> {
    let mut settings = match matches.get_one::<PathBuf>("config") {
        Some(path) => Settings::from_toml_file(path)?,
        None => Settings::default(),
    };
    if let Some(dir) = matches.get_one::<PathBuf>("output_dir") {
        settings.output_root = dir.clone();
    }
    if let Some(&concurrency) = matches.get_one::<usize>("concurrency") {
        settings.concurrent_downloads = concurrency;
    }
    settings.validate()?;
    Ok(settings)
}

/// Parses command-line arguments, resolves the configuration and runs one
/// authenticate → list → validate → download pass.
///
/// Authentication and validation failures are reported on stdout and end the
/// run normally. Configuration, transport and filesystem errors are returned.
pub async fn cli() -> AppResult<()> {
    let matches = build_command().get_matches();
    let settings = resolve_settings(&matches)?;
    let config = Config::from_env(settings)?;
    debug!(config = ?config, "Configuration resolved");
    if let Some(asset_url) = &config.base_asset_url {
        debug!(asset_url = %asset_url, "Asset API base URL configured");
    }

    let today = Local::now().date_naive();
    let mut stdout = std::io::stdout();
    let outcome = run_workflow(&config, today, &mut stdout).await?;
    debug!(outcome = ?outcome, "Run finished");
    Ok(())
}

/// Runs the report workflow against the configured API.
///
/// Order is fixed: the `{output_root}/{YYYY_MM_DD}` directory is created, the
/// session logs in, the catalog is listed and validated, and only then are
/// reports downloaded. Status lines are written to `out`.
///
/// # Errors
///
/// Returns an error if the directory cannot be created, the login or listing
/// request fails at the transport level, a report entry is missing required
/// fields, or any download or file write fails.
pub async fn run_workflow<W: Write>(
    config: &Config,
    date: NaiveDate,
    out: &mut W,
) -> AppResult<RunOutcome> {
    let report_dir = create_report_dir(&config.settings.output_root, date).await?;
    let session = Session::new(config)?;

    if !session.authenticate(config).await? {
        warn!("Login was rejected");
        writeln!(out, "{AUTH_FAILURE}")?;
        return Ok(RunOutcome::AuthenticationFailed);
    }
    writeln!(out, "{AUTH_SUCCESS}")?;
    info!("Authenticated");

    let body = session.list_reports(config).await?;
    let catalog = match validate_and_extract(&session, &body).await {
        Ok(catalog) => catalog,
        Err(e) => {
            writeln!(out, "{VALIDATION_FAILURE}")?;
            return Ok(RunOutcome::ValidationFailed(e));
        }
    };
    writeln!(out, "{VALIDATION_SUCCESS}")?;

    let entries = catalog.entries()?;
    let reports = fetch_all(&session, config, &entries, &report_dir).await?;

    info!(
        reports = reports.len(),
        dir = %report_dir.display(),
        "All operations completed successfully"
    );
    Ok(RunOutcome::Completed { reports })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;

    #[test]
    fn cli_defaults_without_flags() {
        let matches = build_command()
            .try_get_matches_from(vec!["qualys-report-fetch"])
            .unwrap();
        let settings = resolve_settings(&matches).unwrap();
        assert_eq!(settings.concurrent_downloads, 1);
        assert_eq!(settings.output_root, PathBuf::from("."));
    }

    #[test]
    fn cli_flags_override_settings() {
        let matches = build_command()
            .try_get_matches_from(vec![
                "qualys-report-fetch",
                "--output-dir",
                "/tmp/reports",
                "-j",
                "3",
            ])
            .unwrap();
        let settings = resolve_settings(&matches).unwrap();
        assert_eq!(settings.output_root, PathBuf::from("/tmp/reports"));
        assert_eq!(settings.concurrent_downloads, 3);
    }

    #[test]
    fn cli_rejects_zero_concurrency() {
        let matches = build_command()
            .try_get_matches_from(vec!["qualys-report-fetch", "--concurrency", "0"])
            .unwrap();
        assert!(resolve_settings(&matches).is_err());
    }

    #[test]
    fn cli_rejects_non_numeric_concurrency() {
        let result =
            build_command().try_get_matches_from(vec!["qualys-report-fetch", "-j", "many"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_missing_config_file_errors() {
        let matches = build_command()
            .try_get_matches_from(vec!["qualys-report-fetch", "-c", "/nonexistent/qrf.toml"])
            .unwrap();
        assert!(matches!(resolve_settings(&matches), Err(AppError::IoError(_))));
    }
}
