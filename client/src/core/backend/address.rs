//! Backend Address Resolution
//!
//! Validated API root plus the helpers that derive it from a page origin and
//! resolve media links the backend hands back.

use reqwest::Url;

use crate::core::{CoreError, CoreResult};

/// Path prefix the backend serves its API under
const API_PREFIX: &str = "/api";

/// Validated http(s) API root without a trailing slash
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiBase {
    url: String,
}

impl ApiBase {
    pub fn parse(value: &str) -> CoreResult<Self> {
        let trimmed = value.trim();
        let parsed = Url::parse(trimmed).map_err(|e| {
            CoreError::ValidationError(format!("Invalid API base URL '{}': {}", trimmed, e))
        })?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(CoreError::ValidationError(format!(
                    "Unsupported API base URL scheme '{}'. Only http/https are allowed.",
                    scheme
                )))
            }
        }
        if parsed.host_str().is_none() {
            return Err(CoreError::ValidationError(format!(
                "API base URL '{}' has no host",
                trimmed
            )));
        }

        Ok(Self {
            url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Derives the API root from the origin a page was served from.
    ///
    /// Local development talks to `{origin}/api` on the same port; deployed
    /// hosts drop a leading `www.` and the port.
    pub fn from_origin(origin: &str) -> CoreResult<Self> {
        let parsed = Url::parse(origin.trim()).map_err(|e| {
            CoreError::ValidationError(format!("Invalid origin '{}': {}", origin, e))
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| CoreError::ValidationError(format!("Origin '{}' has no host", origin)))?;

        let root = if host == "localhost" || host == "127.0.0.1" {
            match parsed.port() {
                Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
                None => format!("{}://{}", parsed.scheme(), host),
            }
        } else {
            let host = host.strip_prefix("www.").unwrap_or(host);
            format!("{}://{}", parsed.scheme(), host)
        };

        Self::parse(&format!("{}{}", root, API_PREFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Joins an API path such as `/parser/tasks`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }

    /// Scheme, host and port of the API root
    pub fn origin(&self) -> String {
        match Url::parse(&self.url) {
            Ok(url) => url.origin().ascii_serialization(),
            Err(_) => self.url.clone(),
        }
    }

    /// Resolves a media link: absolute links pass through, relative ones
    /// (e.g. `/downloads/V1/video.mp4`) are joined onto the API origin.
    pub fn resolve(&self, link: &str) -> CoreResult<String> {
        let link = link.trim();
        if link.is_empty() {
            return Err(CoreError::DataError("Empty media URL".to_string()));
        }
        if let Ok(absolute) = Url::parse(link) {
            return Ok(absolute.to_string());
        }

        let origin = Url::parse(&self.origin())
            .map_err(|e| CoreError::Internal(format!("Invalid API origin: {}", e)))?;
        origin
            .join(link)
            .map(|url| url.to_string())
            .map_err(|e| CoreError::DataError(format!("Invalid media URL '{}': {}", link, e)))
    }

    /// Direct download link for a processed video
    pub fn download_url(&self, video_id: &str) -> String {
        self.endpoint(&format!("course/{}/download", video_id))
    }
}

impl std::fmt::Display for ApiBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

impl std::str::FromStr for ApiBase {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
