//! Catalog API request and response models

use serde::{Deserialize, Serialize};

/// A candidate recording returned by a catalog search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Recording identifier (ISRC)
    pub isrc: String,
    /// Track title as listed by the catalog
    pub title: String,
    /// Release (album) name
    pub release_name: Option<String>,
    /// Record label
    pub label: Option<String>,
    /// Display artist string
    pub artist_name: Option<String>,
    /// Release date, usually `YYYY-MM-DD`
    pub release_date: Option<String>,
    /// Parent release identifier (UPC)
    pub upc: Option<String>,
}

/// Minimal metadata about a recording, used to search the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingQuery {
    pub title: String,
    pub album: Option<String>,
    pub label: Option<String>,
    pub release_date: Option<String>,
    /// Expected artist names, primary artist first
    #[serde(default)]
    pub artists: Vec<String>,
}

impl RecordingQuery {
    /// Create a query for a title with no other metadata
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_release_date(mut self, date: impl Into<String>) -> Self {
        self.release_date = Some(date.into());
        self
    }

    pub fn with_artists<I, S>(mut self, artists: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.artists = artists.into_iter().map(Into::into).collect();
        self
    }

    /// First non-blank artist name, used to qualify searches
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists
            .iter()
            .map(|a| a.trim())
            .find(|a| !a.is_empty())
    }
}

// Wire types

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchRequest {
    pub result_limit: u32,
    pub offset: u32,
    pub search_fields: SearchFields,
    pub include_releases: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isrc: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub results: Vec<RawCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawCandidate {
    #[serde(default)]
    pub isrc: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub release_name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub upc: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl RawCandidate {
    /// Convert into a candidate, dropping rows without an identifier
    pub fn into_candidate(self) -> Option<CandidateRecord> {
        let isrc = non_blank(self.isrc)?;
        Some(CandidateRecord {
            isrc: isrc.trim().to_string(),
            title: self.title.unwrap_or_default(),
            release_name: non_blank(self.release_name),
            label: non_blank(self.label),
            artist_name: non_blank(self.artist_name),
            release_date: non_blank(self.release_date),
            upc: non_blank(self.upc),
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: String,
}
