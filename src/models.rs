use crate::catalog::Element;
use crate::constants::*;
use crate::errors::{AppError, AppResult};

/// How a downloaded report body is written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Raw response bytes are written unchanged.
    Binary,
    /// The body is decoded as text and written as UTF-8.
    Text,
}

impl WriteMode {
    /// Classifies an output format. Only the formats in [`BINARY_FORMATS`] are
    /// binary; the comparison is case-sensitive, so `"pdf"` is text.
    ///
    /// Any other binary format (a hypothetical `"ZIP"`) is classified as text and
    /// will not survive the text decode.
    pub fn for_format(output_format: &str) -> Self {
        if BINARY_FORMATS.contains(&output_format) {
            Self::Binary
        } else {
            Self::Text
        }
    }
}

/// One `<REPORT>` entry of a validated report catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportCatalogEntry {
    pub id: String,
    pub title: String,
    pub output_format: String,
    pub launch_datetime: String,
}

impl ReportCatalogEntry {
    /// Reads the entry from the direct children of a `<REPORT>` element.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if `ID`, `OUTPUT_FORMAT` or `LAUNCH_DATETIME` is
    /// missing or empty. A missing `TITLE` yields an empty title.
    pub fn from_element(report: &Element) -> AppResult<Self> {
        let required = |name: &str| -> AppResult<String> {
            report
                .child(name)
                .and_then(Element::text)
                .filter(|text| !text.is_empty())
                .ok_or_else(|| {
                    AppError::ParseError(format!("<{REPORT_ELEMENT}> is missing <{name}>"))
                })
        };

        Ok(Self {
            id: required(ID_ELEMENT)?,
            title: report
                .child(TITLE_ELEMENT)
                .and_then(Element::text)
                .unwrap_or_default(),
            output_format: required(OUTPUT_FORMAT_ELEMENT)?,
            launch_datetime: required(LAUNCH_DATETIME_ELEMENT)?,
        })
    }

    /// Date portion of the launch timestamp (its first 10 characters).
    pub fn launch_date(&self) -> &str {
        match self.launch_datetime.char_indices().nth(LAUNCH_DATE_LEN) {
            Some((end, _)) => &self.launch_datetime[..end],
            None => &self.launch_datetime,
        }
    }

    /// File name the report is saved under.
    ///
    /// Hyphens in the title and date become underscores, the extension is the
    /// lowercased output format, and every space in the assembled name becomes
    /// an underscore.
    pub fn file_name(&self) -> String {
        let title = self.title.replace('-', "_");
        let date = self.launch_date().replace('-', "_");
        let extension = self.output_format.to_lowercase();
        format!("{REPORT_FILE_PREFIX}_{title}_{date}.{extension}").replace(' ', "_")
    }

    pub fn write_mode(&self) -> WriteMode {
        WriteMode::for_format(&self.output_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::parse_document;

    fn entry(title: &str, format: &str, launched: &str) -> ReportCatalogEntry {
        ReportCatalogEntry {
            id: "1".to_string(),
            title: title.to_string(),
            output_format: format.to_string(),
            launch_datetime: launched.to_string(),
        }
    }

    #[test]
    fn test_file_name_sanitizes_title_and_date() {
        let e = entry("Weekly-Scan Report", "PDF", "2024-05-01T10:00:00Z");
        assert_eq!(e.file_name(), "Scan_Report_Weekly_Scan_Report_2024_05_01.pdf");
    }

    #[test]
    fn test_file_name_lowercases_extension() {
        let e = entry("Hosts", "CSV", "2023-12-31T23:59:59Z");
        assert_eq!(e.file_name(), "Scan_Report_Hosts_2023_12_31.csv");
    }

    #[test]
    fn test_file_name_with_empty_title() {
        let e = entry("", "XML", "2024-01-02T00:00:00Z");
        assert_eq!(e.file_name(), "Scan_Report__2024_01_02.xml");
    }

    #[test]
    fn test_launch_date_short_value_is_kept_whole() {
        let e = entry("t", "PDF", "2024-05");
        assert_eq!(e.launch_date(), "2024-05");
    }

    #[test]
    fn test_write_mode_pdf_is_binary() {
        assert_eq!(WriteMode::for_format("PDF"), WriteMode::Binary);
    }

    #[test]
    fn test_write_mode_is_case_sensitive() {
        assert_eq!(WriteMode::for_format("pdf"), WriteMode::Text);
    }

    #[test]
    fn test_write_mode_other_formats_are_text() {
        for format in ["CSV", "XML", "HTML", "ZIP"] {
            assert_eq!(WriteMode::for_format(format), WriteMode::Text);
        }
    }

    #[test]
    fn test_from_element_reads_direct_children() {
        let doc = parse_document(
            br#"<REPORT>
                  <ID>123</ID>
                  <TITLE>Weekly-Scan Report</TITLE>
                  <OUTPUT_FORMAT>PDF</OUTPUT_FORMAT>
                  <LAUNCH_DATETIME>2024-05-01T10:00:00Z</LAUNCH_DATETIME>
                </REPORT>"#,
        )
        .unwrap();

        let e = ReportCatalogEntry::from_element(&doc.root).unwrap();
        assert_eq!(e.id, "123");
        assert_eq!(e.title, "Weekly-Scan Report");
        assert_eq!(e.write_mode(), WriteMode::Binary);
    }

    #[test]
    fn test_from_element_missing_title_is_empty() {
        let doc = parse_document(
            br#"<REPORT><ID>7</ID><OUTPUT_FORMAT>CSV</OUTPUT_FORMAT><LAUNCH_DATETIME>2024-05-01T10:00:00Z</LAUNCH_DATETIME></REPORT>"#,
        )
        .unwrap();

        let e = ReportCatalogEntry::from_element(&doc.root).unwrap();
        assert_eq!(e.title, "");
    }

    #[test]
    fn test_from_element_missing_id_errors() {
        let doc = parse_document(
            br#"<REPORT><TITLE>x</TITLE><OUTPUT_FORMAT>CSV</OUTPUT_FORMAT><LAUNCH_DATETIME>2024-05-01</LAUNCH_DATETIME></REPORT>"#,
        )
        .unwrap();

        let err = ReportCatalogEntry::from_element(&doc.root).unwrap_err();
        assert!(err.to_string().contains("<ID>"));
    }
}
