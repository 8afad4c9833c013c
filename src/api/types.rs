use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Feed Types
// ============================================================================

/// One card in the video feed. Identity is `id`; values are never mutated
/// after they arrive.
///
/// PERF: string fields are `Arc<str>` so rows can be cloned into render state
/// without copying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDescriptor {
    pub id: Arc<str>,
    pub title: Arc<str>,
    #[serde(alias = "thumbnail", alias = "thumbnail_url")]
    pub thumbnail_url: Arc<str>,
    #[serde(alias = "channel_avatar", alias = "channel_avatar_url")]
    pub channel_avatar_url: Arc<str>,
    #[serde(alias = "channel_name")]
    pub channel_name: Arc<str>,
}

/// Position in the paginated feed.
///
/// The backend may hand out integer offsets or opaque tokens; both are sent
/// back verbatim as the `cursor` query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cursor {
    Offset(u64),
    Token(String),
}

impl Cursor {
    /// Cursor for the first page.
    pub const START: Cursor = Cursor::Offset(0);
}

impl Default for Cursor {
    fn default() -> Self {
        Self::START
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Offset(n) => write!(f, "{}", n),
            Cursor::Token(t) => f.write_str(t),
        }
    }
}

/// One page of the feed as returned by `GET /videos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub items: Vec<VideoDescriptor>,
    /// Cursor for the following page; absent on the last page for some
    /// backends.
    #[serde(default)]
    pub cursor: Option<Cursor>,
    #[serde(alias = "has_more")]
    pub has_more: bool,
}

// ============================================================================
// Watch Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub avatar: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub text: String,
    /// `None` when absent or unparseable; a bad timestamp never fails the
    /// enclosing `VideoDetail`.
    #[serde(default, deserialize_with = "deserialize_lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Accept RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS[.f]` taken as UTC.
/// Anything else becomes `None`.
fn deserialize_lenient_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    let Some(text) = raw.as_ref().and_then(|v| v.as_str()) else {
        return Ok(None);
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Some(naive.and_utc()));
    }
    tracing::debug!(value = text, "Ignoring unparseable comment timestamp");
    Ok(None)
}

/// Payload of `GET /videos/<id>`. `src` is the manifest URL handed to the
/// playback controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDetail {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail: String,
    pub src: String,
    pub channel: Channel,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub likes_count: Option<u64>,
    #[serde(default)]
    pub views_count: Option<u64>,
    /// Variant labels the backend transcoded ("360p", "720p", ...).
    #[serde(default)]
    pub resolutions: Vec<String>,
}
