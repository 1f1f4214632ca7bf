//! Movie catalogue records.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::filters::{Filters, Metadata};
use crate::domain::Validator;
use crate::error::{Error, StoreError};
use crate::store::{ResourceId, Version, VersionedResource};

const MAX_TITLE_BYTES: usize = 500;

/// Columns a movie list may be sorted by; the first is the default.
pub const SORT_SAFELIST: &[&str] = &["id", "title", "runtime", "year"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movie {
    pub id: ResourceId,
    #[serde(flatten)]
    pub fields: MovieFields,
    pub version: Version,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MovieFields {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", with = "runtime")]
    pub runtime: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
}

impl VersionedResource for Movie {
    type Fields = MovieFields;

    const KIND: &'static str = "movie";

    fn assemble(id: ResourceId, version: Version, fields: MovieFields) -> Self {
        Self { id, fields, version }
    }

    fn id(&self) -> ResourceId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn fields(&self) -> MovieFields {
        self.fields.clone()
    }
}

/// Request body for create and partial update. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovieInput {
    pub title: Option<String>,
    pub year: Option<i32>,
    #[serde(default, with = "runtime")]
    pub runtime: Option<u32>,
    pub genres: Option<Vec<String>>,
}

impl MovieInput {
    /// Build a full record for creation.
    pub fn into_fields(self) -> Result<MovieFields, Error> {
        let mut fields = MovieFields::default();
        self.apply(&mut fields)?;
        Ok(fields)
    }

    /// Overlay the provided fields onto `fields`, then validate the result.
    pub fn apply(self, fields: &mut MovieFields) -> Result<(), Error> {
        if let Some(title) = self.title {
            fields.title = title;
        }
        if let Some(year) = self.year {
            fields.year = Some(year);
        }
        if let Some(runtime) = self.runtime {
            fields.runtime = Some(runtime);
        }
        if let Some(genres) = self.genres {
            fields.genres = genres;
        }
        fields.validate()
    }
}

impl MovieFields {
    pub fn validate(&self) -> Result<(), Error> {
        let mut v = Validator::new();
        v.check(!self.title.trim().is_empty(), "title", "must be provided");
        v.check(
            self.title.len() <= MAX_TITLE_BYTES,
            "title",
            "must not be more than 500 bytes long",
        );
        v.check(self.runtime != Some(0), "runtime", "must be a positive integer");
        v.finish()
    }
}

/// Raw query string of `GET /v1/movies`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovieListParams {
    pub title: Option<String>,
    /// Comma-separated.
    pub genres: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub sort: Option<String>,
}

impl MovieListParams {
    pub fn parse(self) -> Result<MovieQuery, Error> {
        let mut v = Validator::new();
        let filters = Filters::parse(
            &mut v,
            self.page.as_deref(),
            self.page_size.as_deref(),
            self.sort.as_deref(),
            SORT_SAFELIST,
        );
        v.finish()?;

        let title = self
            .title
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        let genres = self
            .genres
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();

        Ok(MovieQuery {
            title,
            genres,
            filters,
        })
    }
}

/// A validated movie search.
#[derive(Debug, Clone, Default)]
pub struct MovieQuery {
    /// Lowercased words that must all appear in the title.
    pub title: Vec<String>,
    /// Genres the movie must carry, all of them.
    pub genres: Vec<String>,
    pub filters: Filters,
}

impl MovieQuery {
    pub fn matches(&self, movie: &Movie) -> bool {
        let words: Vec<String> = movie
            .fields
            .title
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        self.title.iter().all(|w| words.contains(w))
            && self.genres.iter().all(|g| movie.fields.genres.contains(g))
    }

    /// Order by the sort column. Ties keep their relative order.
    pub fn compare(&self, a: &Movie, b: &Movie) -> Ordering {
        let ordering = match self.filters.sort {
            "title" => a.fields.title.to_lowercase().cmp(&b.fields.title.to_lowercase()),
            "runtime" => a.fields.runtime.cmp(&b.fields.runtime),
            "year" => a.fields.year.cmp(&b.fields.year),
            _ => a.id.cmp(&b.id),
        };
        self.filters.direction.apply(ordering)
    }

    /// Filter, sort and page `movies`, which must be in id order.
    pub fn select(&self, movies: Vec<Movie>) -> MoviePage {
        let mut matched: Vec<Movie> = movies.into_iter().filter(|m| self.matches(m)).collect();
        matched.sort_by(|a, b| self.compare(a, b));
        let (movies, metadata) = self.filters.paginate(matched);
        MoviePage { movies, metadata }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MoviePage {
    pub movies: Vec<Movie>,
    pub metadata: Metadata,
}

/// Read side of the movie store.
#[async_trait]
pub trait MovieCatalogue: Send + Sync {
    async fn list(&self, query: &MovieQuery) -> Result<MoviePage, StoreError>;
}

/// Runtime travels as `"<n> mins"` on the wire.
mod runtime {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(minutes) => serializer.serialize_str(&format!("{minutes} mins")),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        raw.strip_suffix(" mins")
            .and_then(|n| n.parse::<u32>().ok())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("invalid runtime format"))
    }
}
