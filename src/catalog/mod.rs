//! Report catalog validation.
//!
//! The catalog returned by the listing endpoint is only trusted after it has
//! been parsed, its declared DTD has been fetched, and the document has been
//! validated against that DTD. The main entry point is [`validate_and_extract`].

mod doctype;
mod document;
mod dtd;
mod error;
mod validator;

// Re-export public API
pub use doctype::find_dtd_url;
pub use document::{parse_document, Document, Element, Node};
pub use dtd::{
    AttributeDecl, AttributeDefault, AttributeType, ContentModel, ContentSpec, Dtd, Occurrence,
    Particle,
};
pub use error::ValidationError;
pub use validator::validate;

use crate::constants::REPORT_ELEMENT;
use crate::errors::AppResult;
use crate::models::ReportCatalogEntry;
use crate::session::Session;
use tracing::{debug, info, warn};

/// The `<REPORT>` elements of a catalog that passed DTD validation, in
/// document order. May be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCatalog {
    reports: Vec<Element>,
}

impl ValidatedCatalog {
    /// Validates a parsed document against the given DTD text and collects
    /// every `REPORT` descendant of the root.
    pub fn from_document(document: &Document, dtd_text: &str) -> Result<Self, ValidationError> {
        let dtd = Dtd::parse(dtd_text)?;
        validate(&dtd, &document.root)?;

        let reports = document
            .root
            .descendants(REPORT_ELEMENT)
            .into_iter()
            .cloned()
            .collect();
        Ok(Self { reports })
    }

    pub fn reports(&self) -> &[Element] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Reads the metadata of every report.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` for the first report missing a required field.
    pub fn entries(&self) -> AppResult<Vec<ReportCatalogEntry>> {
        self.reports
            .iter()
            .map(ReportCatalogEntry::from_element)
            .collect()
    }
}

/// Validates a catalog response body against the DTD it declares.
///
/// Steps, any of which can fail with its own [`ValidationError`] variant:
/// 1. parse the body as XML,
/// 2. find `<!DOCTYPE ... SYSTEM "url">` in the body text,
/// 3. fetch the DTD from that URL through the session's client,
/// 4. parse the DTD and validate the document tree against it.
///
/// Failures are logged here; callers only need to branch on the result.
pub async fn validate_and_extract(
    session: &Session,
    body: &[u8],
) -> Result<ValidatedCatalog, ValidationError> {
    let result = fetch_and_validate(session, body).await;
    match &result {
        Ok(catalog) => info!(reports = catalog.len(), "Catalog validated against its DTD"),
        Err(e) => warn!(error = %e, "Error in XML validation"),
    }
    result
}

async fn fetch_and_validate(
    session: &Session,
    body: &[u8],
) -> Result<ValidatedCatalog, ValidationError> {
    let document = parse_document(body)?;
    let dtd_url = find_dtd_url(&String::from_utf8_lossy(body))?;

    debug!(dtd_url = %dtd_url, "Fetching DTD");
    let dtd_text = session
        .fetch_dtd(&dtd_url)
        .await
        .map_err(|e| ValidationError::Network {
            url: dtd_url.clone(),
            reason: e.to_string(),
        })?;

    ValidatedCatalog::from_document(&document, &dtd_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DTD: &str = r#"<!ELEMENT REPORT_LIST_OUTPUT (RESPONSE)>
<!ELEMENT RESPONSE (DATETIME, REPORT_LIST?)>
<!ELEMENT DATETIME (#PCDATA)>
<!ELEMENT REPORT_LIST (REPORT+)>
<!ELEMENT REPORT (ID, TITLE?, OUTPUT_FORMAT, LAUNCH_DATETIME)>
<!ELEMENT ID (#PCDATA)>
<!ELEMENT TITLE (#PCDATA)>
<!ELEMENT OUTPUT_FORMAT (#PCDATA)>
<!ELEMENT LAUNCH_DATETIME (#PCDATA)>"#;

    const CATALOG: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<!DOCTYPE REPORT_LIST_OUTPUT SYSTEM "https://qualysapi.example.com/report_list_output.dtd">
<REPORT_LIST_OUTPUT>
  <RESPONSE>
    <DATETIME>2024-05-01T12:00:00Z</DATETIME>
    <REPORT_LIST>
      <REPORT>
        <ID>11</ID>
        <TITLE><![CDATA[Weekly-Scan Report]]></TITLE>
        <OUTPUT_FORMAT>PDF</OUTPUT_FORMAT>
        <LAUNCH_DATETIME>2024-05-01T10:00:00Z</LAUNCH_DATETIME>
      </REPORT>
      <REPORT>
        <ID>12</ID>
        <OUTPUT_FORMAT>CSV</OUTPUT_FORMAT>
        <LAUNCH_DATETIME>2024-04-30T08:00:00Z</LAUNCH_DATETIME>
      </REPORT>
    </REPORT_LIST>
  </RESPONSE>
</REPORT_LIST_OUTPUT>"#;

    #[test]
    fn test_valid_catalog_yields_reports_in_order() {
        let document = parse_document(CATALOG.as_bytes()).unwrap();
        let catalog = ValidatedCatalog::from_document(&document, DTD).unwrap();
        assert_eq!(catalog.len(), 2);

        let entries = catalog.entries().unwrap();
        assert_eq!(entries[0].id, "11");
        assert_eq!(entries[0].title, "Weekly-Scan Report");
        assert_eq!(entries[1].id, "12");
        assert_eq!(entries[1].title, "");
    }

    #[test]
    fn test_valid_catalog_without_reports_is_empty_success() {
        let xml = r#"<!DOCTYPE REPORT_LIST_OUTPUT SYSTEM "x.dtd">
<REPORT_LIST_OUTPUT><RESPONSE><DATETIME>now</DATETIME></RESPONSE></REPORT_LIST_OUTPUT>"#;
        let document = parse_document(xml.as_bytes()).unwrap();
        let catalog = ValidatedCatalog::from_document(&document, DTD).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.entries().unwrap().is_empty());
    }

    #[test]
    fn test_nonconforming_catalog_is_rejected() {
        let xml = r#"<REPORT_LIST_OUTPUT><RESPONSE><REPORT_LIST/></RESPONSE></REPORT_LIST_OUTPUT>"#;
        let document = parse_document(xml.as_bytes()).unwrap();
        let err = ValidatedCatalog::from_document(&document, DTD).unwrap_err();
        assert!(matches!(err, ValidationError::Invalid(_)));
    }

    #[test]
    fn test_malformed_dtd_is_rejected() {
        let document = parse_document(CATALOG.as_bytes()).unwrap();
        let err = ValidatedCatalog::from_document(&document, "<html>404</html>").unwrap_err();
        assert!(matches!(err, ValidationError::Dtd(_)));
    }
}
