//! Common test utilities for integration tests

use qualys_report_fetch::config::{Config, Settings};
use std::collections::HashMap;
use std::path::Path;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[allow(dead_code)]
pub const SESSION_PATH: &str = "/api/2.0/fo/session/";
#[allow(dead_code)]
pub const REPORT_PATH: &str = "/api/2.0/fo/report/";
#[allow(dead_code)]
pub const DTD_PATH: &str = "/report_list_output.dtd";

/// DTD for the report listing, in the shape the vendor publishes it
#[allow(dead_code)]
pub const CATALOG_DTD: &str = r#"<!-- report list output -->
<!ELEMENT REPORT_LIST_OUTPUT (RESPONSE)>
<!ELEMENT RESPONSE (DATETIME, REPORT_LIST?)>
<!ELEMENT DATETIME (#PCDATA)>
<!ELEMENT REPORT_LIST (REPORT+)>
<!ELEMENT REPORT (ID, TITLE?, TYPE?, OUTPUT_FORMAT, LAUNCH_DATETIME, STATUS?)>
<!ELEMENT ID (#PCDATA)>
<!ELEMENT TITLE (#PCDATA)>
<!ELEMENT TYPE (#PCDATA)>
<!ELEMENT OUTPUT_FORMAT (#PCDATA)>
<!ELEMENT LAUNCH_DATETIME (#PCDATA)>
<!ELEMENT STATUS (STATE)>
<!ELEMENT STATE (#PCDATA)>
"#;

/// A report listed in a test catalog: (id, title, format, launch datetime)
#[allow(dead_code)]
pub type ReportRow<'a> = (&'a str, Option<&'a str>, &'a str, &'a str);

/// Builds a catalog body that declares `dtd_url` as its system identifier.
#[allow(dead_code)]
pub fn catalog_xml(dtd_url: &str, reports: &[ReportRow<'_>]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<!DOCTYPE REPORT_LIST_OUTPUT SYSTEM \"{dtd_url}\">\n<REPORT_LIST_OUTPUT>\n  <RESPONSE>\n    <DATETIME>2024-05-01T12:00:00Z</DATETIME>\n"
    );
    if !reports.is_empty() {
        xml.push_str("    <REPORT_LIST>\n");
        for (id, title, format, launched) in reports {
            xml.push_str("      <REPORT>\n");
            xml.push_str(&format!("        <ID>{id}</ID>\n"));
            if let Some(title) = title {
                xml.push_str(&format!("        <TITLE><![CDATA[{title}]]></TITLE>\n"));
            }
            xml.push_str("        <TYPE>Scan</TYPE>\n");
            xml.push_str(&format!("        <OUTPUT_FORMAT>{format}</OUTPUT_FORMAT>\n"));
            xml.push_str(&format!(
                "        <LAUNCH_DATETIME>{launched}</LAUNCH_DATETIME>\n"
            ));
            xml.push_str("        <STATUS><STATE>Finished</STATE></STATUS>\n");
            xml.push_str("      </REPORT>\n");
        }
        xml.push_str("    </REPORT_LIST>\n");
    }
    xml.push_str("  </RESPONSE>\n</REPORT_LIST_OUTPUT>\n");
    xml
}

/// Configuration pointing at the mock server, writing under `output_root`.
#[allow(dead_code)]
pub fn test_config(server: &MockServer, output_root: &Path, concurrency: usize) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("QUALYS_USER", "alice".to_string()),
        ("QUALYS_PASS", "s3cret".to_string()),
        ("BASE_API_URL", server.uri()),
    ]);
    let settings = Settings {
        output_root: output_root.to_path_buf(),
        concurrent_downloads: concurrency,
        ..Settings::default()
    };
    Config::from_lookup(|key| vars.get(key).cloned(), settings).unwrap()
}

/// Login endpoint answering with `status`.
#[allow(dead_code)]
pub async fn mount_login(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Listing endpoint returning `body`.
#[allow(dead_code)]
pub async fn mount_listing(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path(REPORT_PATH))
        .and(query_param("action", "list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// DTD served at [`DTD_PATH`].
#[allow(dead_code)]
pub async fn mount_dtd(server: &MockServer, dtd: &str) {
    Mock::given(method("GET"))
        .and(path(DTD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(dtd))
        .mount(server)
        .await;
}

/// Report download for `id` returning `body` as raw bytes.
#[allow(dead_code)]
pub async fn mount_report(server: &MockServer, id: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(REPORT_PATH))
        .and(query_param("action", "fetch"))
        .and(query_param("id", id))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

/// A URL on localhost where nothing is listening.
#[allow(dead_code)]
pub fn unreachable_url(suffix: &str) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}{suffix}")
}
