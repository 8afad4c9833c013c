use super::surface::PlaybackSurface;
use super::PlaybackError;
use crate::api::{read_limited_bytes, ApiError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Playlists are small text files; anything past this is not a manifest.
const MAX_MANIFEST_SIZE: usize = 1024 * 1024;

// ============================================================================
// Manifest Types
// ============================================================================

/// One `#EXT-X-STREAM-INF` entry of a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub bandwidth: Option<u64>,
    /// `WIDTHxHEIGHT` as written in the playlist.
    pub resolution: Option<String>,
    pub uri: String,
}

/// What the engine learned from a successfully parsed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestSummary {
    /// Variants of a master playlist, in playlist order.
    pub variants: Vec<Variant>,
    /// Segment count when the source is a media playlist.
    pub segments: usize,
}

impl ManifestSummary {
    pub fn is_master(&self) -> bool {
        !self.variants.is_empty()
    }

    /// Highest-bandwidth variant, the one an engine starts from on a fast link.
    pub fn best_variant(&self) -> Option<&Variant> {
        self.variants.iter().max_by_key(|v| v.bandwidth.unwrap_or(0))
    }
}

// ============================================================================
// Engine Contract
// ============================================================================

/// An adaptive-streaming engine that feeds a [`PlaybackSurface`].
///
/// Call order for one session: `load_source`, `attach_media`, await the
/// load future, and `destroy` exactly once when the session ends.
pub trait StreamingEngine: Send {
    /// Begin loading `source`. The future resolves once the manifest is
    /// parsed; dropping it cancels the fetch.
    fn load_source(
        &mut self,
        source: &Url,
    ) -> BoxFuture<'static, Result<ManifestSummary, PlaybackError>>;

    fn attach_media(&mut self, surface: Arc<dyn PlaybackSurface>) -> Result<(), PlaybackError>;

    /// Release the surface and any engine resources. Must be idempotent.
    fn destroy(&mut self);
}

/// Creates engines and reports whether this environment supports them.
pub trait EngineFactory: Send + Sync {
    fn is_supported(&self) -> bool;

    fn create(&self) -> Box<dyn StreamingEngine>;
}

// ============================================================================
// HLS Engine
// ============================================================================

/// Engine that fetches and validates HLS playlists over HTTP.
pub struct HlsEngine {
    http: reqwest::Client,
    timeout: Duration,
    source: Option<Url>,
    surface: Option<Arc<dyn PlaybackSurface>>,
}

impl HlsEngine {
    pub fn new(http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            timeout,
            source: None,
            surface: None,
        }
    }
}

impl StreamingEngine for HlsEngine {
    fn load_source(
        &mut self,
        source: &Url,
    ) -> BoxFuture<'static, Result<ManifestSummary, PlaybackError>> {
        self.source = Some(source.clone());
        let http = self.http.clone();
        let timeout = self.timeout;
        let url = source.clone();
        async move { fetch_manifest(&http, url, timeout).await }.boxed()
    }

    fn attach_media(&mut self, surface: Arc<dyn PlaybackSurface>) -> Result<(), PlaybackError> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| PlaybackError::InvalidManifest("no source loaded".into()))?;
        surface.bind_engine(source)?;
        self.surface = Some(surface);
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(surface) = self.surface.take() {
            surface.unbind_engine();
        }
        self.source = None;
    }
}

impl Drop for HlsEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Hands out [`HlsEngine`]s sharing one HTTP client.
pub struct HlsEngineFactory {
    http: reqwest::Client,
    timeout: Duration,
}

impl HlsEngineFactory {
    pub fn new(http: reqwest::Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

impl EngineFactory for HlsEngineFactory {
    fn is_supported(&self) -> bool {
        true
    }

    fn create(&self) -> Box<dyn StreamingEngine> {
        Box::new(HlsEngine::new(self.http.clone(), self.timeout))
    }
}

async fn fetch_manifest(
    http: &reqwest::Client,
    url: Url,
    timeout: Duration,
) -> Result<ManifestSummary, PlaybackError> {
    tracing::debug!(url = %url, "Fetching manifest");

    let response = tokio::time::timeout(timeout, http.get(url.clone()).send())
        .await
        .map_err(|_| PlaybackError::ManifestLoadFailed(ApiError::Timeout))?
        .map_err(|e| PlaybackError::ManifestLoadFailed(ApiError::Network(e)))?;

    if !response.status().is_success() {
        return Err(PlaybackError::ManifestLoadFailed(ApiError::HttpStatus(
            response.status().as_u16(),
        )));
    }

    let bytes = read_limited_bytes(response, MAX_MANIFEST_SIZE)
        .await
        .map_err(PlaybackError::ManifestLoadFailed)?;
    let text = std::str::from_utf8(&bytes)
        .map_err(|_| PlaybackError::InvalidManifest("playlist is not UTF-8".into()))?;

    let summary = parse_manifest(text)?;
    tracing::debug!(
        url = %url,
        variants = summary.variants.len(),
        segments = summary.segments,
        "Manifest parsed"
    );
    Ok(summary)
}

// ============================================================================
// Playlist Parsing
// ============================================================================

/// Parse an M3U8 playlist far enough to know it is playable.
///
/// Master playlists yield their variants; media playlists their segment
/// count. A playlist with neither is rejected.
pub fn parse_manifest(text: &str) -> Result<ManifestSummary, PlaybackError> {
    let mut lines = text
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty());

    if lines.next() != Some("#EXTM3U") {
        return Err(PlaybackError::InvalidManifest("missing #EXTM3U header".into()));
    }

    let mut summary = ManifestSummary::default();
    let mut pending: Option<(Option<u64>, Option<String>)> = None;

    for line in lines {
        if let Some(attrs) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            let mut bandwidth = None;
            let mut resolution = None;
            for (key, value) in split_attributes(attrs) {
                match key {
                    "BANDWIDTH" => bandwidth = value.parse().ok(),
                    "RESOLUTION" => resolution = Some(value.to_string()),
                    _ => {}
                }
            }
            pending = Some((bandwidth, resolution));
        } else if line.starts_with("#EXTINF:") {
            summary.segments += 1;
        } else if line.starts_with('#') {
            continue;
        } else if let Some((bandwidth, resolution)) = pending.take() {
            summary.variants.push(Variant {
                bandwidth,
                resolution,
                uri: line.to_string(),
            });
        }
    }

    if pending.is_some() {
        return Err(PlaybackError::InvalidManifest(
            "#EXT-X-STREAM-INF without a variant URI".into(),
        ));
    }
    if summary.variants.is_empty() && summary.segments == 0 {
        return Err(PlaybackError::InvalidManifest(
            "playlist has no variants or segments".into(),
        ));
    }
    Ok(summary)
}

/// Split an attribute list on commas outside quoted strings.
fn split_attributes(attrs: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut quoted = false;

    for (i, c) in attrs.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                push_attribute(&attrs[start..i], &mut out);
                start = i + 1;
            }
            _ => {}
        }
    }
    push_attribute(&attrs[start..], &mut out);
    out
}

fn push_attribute<'a>(pair: &'a str, out: &mut Vec<(&'a str, &'a str)>) {
    if let Some((key, value)) = pair.split_once('=') {
        out.push((key.trim(), value.trim().trim_matches('"')));
    }
}
