use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain HTTP to a non-local host would leak the API token.
    #[error("Insecure API base URL: HTTPS required (except localhost)")]
    InsecureBaseUrl,
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates the backend base URL.
///
/// - Only `http` and `https` schemes are accepted.
/// - Plain `http` is only allowed for loopback hosts (the default
///   development backend listens on `localhost:8000`).
/// - A trailing slash is appended so relative joins keep the last path
///   segment (`/api` + `videos` → `/api/videos`).
///
/// # Examples
///
/// ```
/// use vodview::util::validate_api_base;
///
/// let base = validate_api_base("http://localhost:8000/api").unwrap();
/// assert_eq!(base.join("videos").unwrap().path(), "/api/videos");
///
/// assert!(validate_api_base("http://example.com/api").is_err());
/// assert!(validate_api_base("https://example.com/api").is_ok());
/// ```
pub fn validate_api_base(url_str: &str) -> Result<Url, UrlValidationError> {
    let mut url = Url::parse(url_str)?;

    match url.scheme() {
        "https" => {}
        "http" => {
            if !is_loopback_host(&url) {
                return Err(UrlValidationError::InsecureBaseUrl);
            }
        }
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().is_none() {
        return Err(UrlValidationError::MissingHost);
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Resolves a manifest reference from a video payload.
///
/// Absolute `http(s)` URLs are used as-is; relative references
/// (`/videos/123/playlist.m3u8`) resolve against the API base's origin.
pub fn resolve_manifest_url(base: &Url, src: &str) -> Result<Url, UrlValidationError> {
    let url = match Url::parse(src) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base.join(src)?,
        Err(e) => return Err(e.into()),
    };

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
    if url.host_str().is_none() {
        return Err(UrlValidationError::MissingHost);
    }
    Ok(url)
}

/// True when the URL's host is `localhost` or a loopback address.
pub fn is_loopback_host(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    if host == "localhost" {
        return true;
    }
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host_for_parse
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_base_accepted() {
        let url = validate_api_base("https://vod.example.com/api").unwrap();
        assert_eq!(url.as_str(), "https://vod.example.com/api/");
    }

    #[test]
    fn test_http_localhost_base_accepted() {
        assert!(validate_api_base("http://localhost:8000/api").is_ok());
        assert!(validate_api_base("http://127.0.0.1:8000").is_ok());
        assert!(validate_api_base("http://[::1]:8000").is_ok());
    }

    #[test]
    fn test_http_remote_base_rejected() {
        let result = validate_api_base("http://vod.example.com/api");
        assert!(matches!(result, Err(UrlValidationError::InsecureBaseUrl)));
    }

    #[test]
    fn test_unsupported_scheme_rejected() {
        assert!(matches!(
            validate_api_base("ftp://example.com"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_api_base("not a url").is_err());
    }

    #[test]
    fn test_base_join_keeps_prefix() {
        let base = validate_api_base("http://localhost:8000/api/").unwrap();
        assert_eq!(
            base.join("videos/42").unwrap().as_str(),
            "http://localhost:8000/api/videos/42"
        );
    }

    #[test]
    fn test_absolute_manifest_used_as_is() {
        let base = validate_api_base("http://localhost:8000/api").unwrap();
        let url =
            resolve_manifest_url(&base, "http://localhost:8000/videos/123/playlist.m3u8").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/videos/123/playlist.m3u8");
    }

    #[test]
    fn test_relative_manifest_resolves_against_origin() {
        let base = validate_api_base("http://localhost:8000/api").unwrap();
        let url = resolve_manifest_url(&base, "/videos/123/playlist.m3u8").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/videos/123/playlist.m3u8");
    }

    #[test]
    fn test_manifest_scheme_checked() {
        let base = validate_api_base("http://localhost:8000/api").unwrap();
        assert!(resolve_manifest_url(&base, "file:///etc/passwd").is_err());
    }
}
