//! Ordered search strategies
//!
//! Strategies run in this order:
//!
//! 1. [`SearchStrategy::FullInfo`]: title and album query, filtered on title,
//!    album, label and release date.
//! 2. [`SearchStrategy::Relaxed`]: same query, filtered on title and album.
//!    Only tried when full-info found nothing.
//! 3. [`SearchStrategy::ArtistQualified`]: adds the primary artist to the
//!    query. A non-empty result replaces whatever 1 or 2 found.
//! 4. [`SearchStrategy::TitleOnly`]: title query with the widest window, only
//!    tried when nothing else matched.

use serde::Serialize;

use crate::matching::FieldChecks;
use crate::models::{RecordingQuery, SearchFields, SearchRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    FullInfo,
    Relaxed,
    ArtistQualified,
    TitleOnly,
}

impl SearchStrategy {
    /// Result window requested from the catalog
    pub fn result_limit(self) -> u32 {
        match self {
            SearchStrategy::FullInfo => 50,
            SearchStrategy::Relaxed => 20,
            SearchStrategy::ArtistQualified => 20,
            SearchStrategy::TitleOnly => 100,
        }
    }

    /// Fields a candidate must match to survive this strategy
    pub fn checks(self) -> FieldChecks {
        match self {
            SearchStrategy::FullInfo => FieldChecks::Full,
            SearchStrategy::Relaxed => FieldChecks::TitleAndAlbum,
            SearchStrategy::ArtistQualified | SearchStrategy::TitleOnly => FieldChecks::TitleOnly,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchStrategy::FullInfo => "full_info",
            SearchStrategy::Relaxed => "relaxed",
            SearchStrategy::ArtistQualified => "artist_qualified",
            SearchStrategy::TitleOnly => "title_only",
        }
    }

    /// Whether this strategy can add anything for the given query
    ///
    /// Relaxed only differs from full-info when label or date were supplied,
    /// and artist-qualified needs an artist.
    pub fn applies_to(self, query: &RecordingQuery) -> bool {
        match self {
            SearchStrategy::FullInfo | SearchStrategy::TitleOnly => true,
            SearchStrategy::Relaxed => {
                has_value(query.label.as_deref()) || has_value(query.release_date.as_deref())
            }
            SearchStrategy::ArtistQualified => query.primary_artist().is_some(),
        }
    }

    pub(crate) fn build_request(self, query: &RecordingQuery) -> SearchRequest {
        let title = Some(query.title.trim().to_string());
        let release_name = query
            .album
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);

        let search_fields = match self {
            SearchStrategy::FullInfo | SearchStrategy::Relaxed => SearchFields {
                title,
                release_name,
                ..SearchFields::default()
            },
            SearchStrategy::ArtistQualified => SearchFields {
                artist: query.primary_artist().map(str::to_string),
                title,
                release_name,
                ..SearchFields::default()
            },
            SearchStrategy::TitleOnly => SearchFields {
                title,
                ..SearchFields::default()
            },
        };

        SearchRequest {
            result_limit: self.result_limit(),
            offset: 0,
            search_fields,
            include_releases: true,
        }
    }
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn has_value(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}
