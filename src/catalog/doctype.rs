use super::error::ValidationError;
use regex::Regex;
use std::sync::OnceLock;

// `.` does not cross newlines, so the declaration must sit on a single line.
const DOCTYPE_PATTERN: &str = r"<!DOCTYPE.*?>";
const SYSTEM_ID_PATTERN: &str = r#"SYSTEM\s+"([^"]+)""#;

/// Cached regex for the doctype declaration.
static DOCTYPE_REGEX: OnceLock<Regex> = OnceLock::new();

/// Cached regex for the SYSTEM identifier inside a doctype.
static SYSTEM_ID_REGEX: OnceLock<Regex> = OnceLock::new();

/// Finds the DTD URL a document declares through `<!DOCTYPE name SYSTEM "url">`.
///
/// The scan is textual: the first `<!DOCTYPE ...>` in `text` is taken and the
/// first double-quoted `SYSTEM` identifier inside it is returned.
///
/// # Errors
///
/// `MissingDoctype` if no declaration is found, `MissingSystemId` if the
/// declaration carries no `SYSTEM "..."` identifier.
pub fn find_dtd_url(text: &str) -> Result<String, ValidationError> {
    let doctype_regex = DOCTYPE_REGEX.get_or_init(|| {
        Regex::new(DOCTYPE_PATTERN).expect("DOCTYPE_PATTERN is a valid regex pattern")
    });
    let system_regex = SYSTEM_ID_REGEX.get_or_init(|| {
        Regex::new(SYSTEM_ID_PATTERN).expect("SYSTEM_ID_PATTERN is a valid regex pattern")
    });

    let declaration = doctype_regex
        .find(text)
        .ok_or(ValidationError::MissingDoctype)?
        .as_str();

    system_regex
        .captures(declaration)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ValidationError::MissingSystemId(declaration.to_string()))
}
