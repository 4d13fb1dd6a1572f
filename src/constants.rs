// Environment variables
pub const ENV_USER: &str = "QUALYS_USER";
pub const ENV_PASS: &str = "QUALYS_PASS";
pub const ENV_BASE_API_URL: &str = "BASE_API_URL";
pub const ENV_BASE_ASSET_URL: &str = "BASE_ASSET_URL";

// API paths, relative to BASE_API_URL
pub const SESSION_PATH: &str = "api/2.0/fo/session/";
pub const REPORT_LIST_PATH: &str = "api/2.0/fo/report/?action=list";
pub const REPORT_FETCH_PATH: &str = "api/2.0/fo/report/?action=fetch&id=";

// Session headers
pub const REQUESTED_WITH_HEADER: &str = "X-Requested-With";
pub const ACCEPT_JSON: &str = "application/json";
pub const DEFAULT_REQUESTED_WITH: &str = "qualys-report-fetch";

// Catalog element names
pub const REPORT_ELEMENT: &str = "REPORT";
pub const ID_ELEMENT: &str = "ID";
pub const TITLE_ELEMENT: &str = "TITLE";
pub const OUTPUT_FORMAT_ELEMENT: &str = "OUTPUT_FORMAT";
pub const LAUNCH_DATETIME_ELEMENT: &str = "LAUNCH_DATETIME";

// Output files
pub const REPORT_FILE_PREFIX: &str = "Scan_Report";
pub const REPORT_DIR_DATE_FORMAT: &str = "%Y_%m_%d";
pub const LAUNCH_DATE_LEN: usize = 10;

/// Output formats whose bodies are written byte-for-byte. Matched case-sensitively.
pub const BINARY_FORMATS: &[&str] = &["PDF"];
