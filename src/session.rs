use crate::config::Config;
use crate::constants::{ACCEPT_JSON, REQUESTED_WITH_HEADER};
use crate::errors::{AppError, AppResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{redirect, Response, StatusCode};
use tracing::{debug, info};

/// Authenticated HTTP session against the vendor API.
///
/// Wraps a `reqwest::Client` with a cookie store, so the session cookie set at
/// login is replayed on every later call, plus the base headers sent with each
/// API request. Redirects are not followed: the login contract is "status 200
/// or failure", and a redirect is a failure.
#[derive(Debug, Clone)]
pub struct Session {
    client: reqwest::Client,
    headers: HeaderMap,
}

impl Session {
    /// Builds the HTTP client and base headers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the configured `X-Requested-With` value is not a
    /// valid header value, or `NetworkError` if the client cannot be built.
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            headers: session_headers(&config.settings.requested_with)?,
        })
    }

    /// Logs in with the configured credentials.
    ///
    /// Returns `Ok(true)` if and only if the login endpoint answers with status
    /// 200. Any other status yields `Ok(false)`; nothing is retried.
    ///
    /// # Errors
    ///
    /// Transport failures (connection refused, TLS errors) are returned as
    /// `NetworkError` rather than folded into `false`.
    pub async fn authenticate(&self, config: &Config) -> AppResult<bool> {
        let form = [
            ("action", "login"),
            ("username", config.username.as_str()),
            ("password", config.password.as_str()),
        ];

        let response = self
            .client
            .post(config.session_url())
            .headers(self.headers.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "Login response received");
        Ok(status == StatusCode::OK)
    }

    /// Retrieves the raw report catalog. The status code is not checked; the
    /// body is handed to validation as-is.
    pub async fn list_reports(&self, config: &Config) -> AppResult<Vec<u8>> {
        info!("Fetching report catalog");
        let body = self.get(&config.report_list_url()).await?.bytes().await?;
        debug!(bytes = body.len(), "Report catalog received");
        Ok(body.to_vec())
    }

    /// GET with the session headers.
    pub async fn get(&self, url: &str) -> AppResult<Response> {
        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await?;
        Ok(response)
    }

    /// Downloads a DTD by its system identifier. No session headers are sent.
    pub async fn fetch_dtd(&self, url: &str) -> AppResult<String> {
        let text = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }
}

fn session_headers(requested_with: &str) -> AppResult<HeaderMap> {
    let value = HeaderValue::from_str(requested_with).map_err(|e| {
        AppError::InvalidInput(format!("Invalid {REQUESTED_WITH_HEADER} value: {e}"))
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("x-requested-with"), value);
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
    Ok(headers)
}
