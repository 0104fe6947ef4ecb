//! Client configuration and base URL normalization.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ApiError;

pub const DEFAULT_LIMIT: usize = 100;

/// Connection and paging settings for a `DSpaceClient`.
///
/// Deserializable so callers can keep it in a config file; the CLI builds it
/// from flags and environment variables.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Login e-mail of the DSpace account.
    pub user: String,
    pub password: String,
    /// REST root, e.g. `https://demo.dspace.org/rest`.
    pub rest_url: String,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    /// Issue a metadata request for every hydrated item.
    #[serde(default)]
    pub load_item_metadata: bool,
    /// Default page size for paginated fetches.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Default starting offset for paginated fetches.
    #[serde(default)]
    pub offset: usize,
    /// Rewrite the REST URL scheme to `https`.
    #[serde(default = "default_true")]
    pub force_https: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Enables retry of failed `GET` transports for up to this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_max_elapsed_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("rest_url", &self.rest_url)
            .field("verify_ssl", &self.verify_ssl)
            .field("load_item_metadata", &self.load_item_metadata)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("force_https", &self.force_https)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry_max_elapsed_secs", &self.retry_max_elapsed_secs)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        rest_url: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            rest_url: rest_url.into(),
            verify_ssl: true,
            load_item_metadata: false,
            limit: DEFAULT_LIMIT,
            offset: 0,
            force_https: true,
            timeout_secs: None,
            retry_max_elapsed_secs: None,
        }
    }

    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    pub fn load_item_metadata(mut self, load: bool) -> Self {
        self.load_item_metadata = load;
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn force_https(mut self, force: bool) -> Self {
        self.force_https = force;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn retry_max_elapsed_secs(mut self, secs: u64) -> Self {
        self.retry_max_elapsed_secs = Some(secs);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_max_elapsed(&self) -> Option<Duration> {
        self.retry_max_elapsed_secs.map(Duration::from_secs)
    }

    /// The normalized REST root every resource path is appended to.
    pub fn base_url(&self) -> Result<String, ApiError> {
        normalize_base_url(&self.rest_url, self.force_https)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.limit == 0 {
            return Err(ApiError::InvalidConfig(
                "page limit must be greater than zero".to_string(),
            ));
        }
        if self.user.is_empty() {
            return Err(ApiError::InvalidConfig("user must not be empty".to_string()));
        }
        self.base_url().map(|_| ())
    }
}

/// Clean up a REST root URL.
///
/// Query and fragment are dropped and trailing slashes trimmed. With
/// `force_https` an `http` URL is rewritten to `https`. Default ports stay
/// implicit, so `https://host/rest` and `https://host:443/rest` normalize to
/// the same string.
pub fn normalize_base_url(raw: &str, force_https: bool) -> Result<String, ApiError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ApiError::InvalidConfig(format!("invalid rest_url {raw:?}: {e}")))?;

    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ApiError::InvalidConfig(format!(
            "rest_url {raw:?} has no host"
        )));
    }
    if force_https && url.scheme() != "https" {
        url.set_scheme("https").map_err(|()| {
            ApiError::InvalidConfig(format!("cannot switch {raw:?} to https"))
        })?;
    }
    url.set_query(None);
    url.set_fragment(None);

    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_is_upgraded_when_forced() {
        let url = normalize_base_url("http://demo.dspace.org/rest", true).unwrap();
        assert_eq!(url, "https://demo.dspace.org/rest");
    }

    #[test]
    fn scheme_is_kept_when_not_forced() {
        let url = normalize_base_url("http://127.0.0.1:8080/rest/", false).unwrap();
        assert_eq!(url, "http://127.0.0.1:8080/rest");
    }

    #[test]
    fn explicit_default_port_is_equivalent() {
        let a = normalize_base_url("https://demo.dspace.org:443/rest", true).unwrap();
        let b = normalize_base_url("https://demo.dspace.org/rest", true).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn custom_port_survives_upgrade() {
        let url = normalize_base_url("http://repo.example.org:8443/rest?x=1", true).unwrap();
        assert_eq!(url, "https://repo.example.org:8443/rest");
    }

    #[test]
    fn garbage_url_is_rejected() {
        let err = normalize_base_url("not a url", true).unwrap_err();
        assert!(matches!(err, ApiError::InvalidConfig(_)));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let config = ClientConfig::new("a@b.c", "pw", "https://x.org/rest").page(0, 0);
        assert!(matches!(config.validate(), Err(ApiError::InvalidConfig(_))));
    }

    #[test]
    fn defaults_apply_when_deserializing() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"user":"a@b.c","password":"pw","rest_url":"https://x.org/rest"}"#,
        )
        .unwrap();
        assert!(config.verify_ssl);
        assert!(config.force_https);
        assert!(!config.load_item_metadata);
        assert_eq!(config.limit, DEFAULT_LIMIT);
        assert_eq!(config.offset, 0);
        assert!(config.retry_max_elapsed().is_none());
    }

    #[test]
    fn debug_output_hides_password() {
        let config = ClientConfig::new("a@b.c", "hunter2", "https://x.org/rest");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
