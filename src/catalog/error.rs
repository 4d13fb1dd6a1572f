use thiserror::Error;

/// Why a catalog response was not trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The response body is not well-formed XML
    #[error("malformed XML: {0}")]
    Parse(String),
    /// No `<!DOCTYPE ...>` declaration in the response
    #[error("no <!DOCTYPE> declaration found")]
    MissingDoctype,
    /// The doctype has no `SYSTEM "<url>"` identifier
    #[error("doctype has no SYSTEM identifier: {0}")]
    MissingSystemId(String),
    /// The DTD could not be retrieved
    #[error("failed to fetch DTD from {url}: {reason}")]
    Network { url: String, reason: String },
    /// The DTD itself could not be parsed
    #[error("malformed DTD: {0}")]
    Dtd(String),
    /// The document does not conform to its DTD
    #[error("document does not conform to DTD: {0}")]
    Invalid(String),
}
