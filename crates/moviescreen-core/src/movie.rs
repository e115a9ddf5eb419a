//! # Movie Records
//!
//! [`Movie`] is the versioned catalog entry. Requests arrive as a
//! [`MoviePatch`] (every field optional); creation additionally requires all
//! fields and turns the patch into a [`MovieDraft`].

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::validation::{char_len, not_blank, unique, Validator};
use crate::version::{Version, Versioned};

pub const FIELD_TITLE: &str = "title";
pub const FIELD_YEAR: &str = "year";
pub const FIELD_RUNTIME: &str = "runtime";
pub const FIELD_GENRES: &str = "genres";

/// First year a movie can have been released in.
pub const EARLIEST_YEAR: i32 = 1888;
pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_GENRES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieId(pub i64);

impl fmt::Display for MovieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Running time in minutes, rendered in JSON as `"108 mins"` (or `"1 min"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(pub i32);

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 1 {
            write!(f, "1 min")
        } else {
            write!(f, "{} mins", self.0)
        }
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let mut parts = raw.split_whitespace();
        let (Some(amount), Some("min" | "mins"), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(de::Error::custom("invalid runtime format"));
        };
        amount
            .parse()
            .map(Runtime)
            .map_err(|_| de::Error::custom("invalid runtime format"))
    }
}

/// A stored catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: Version,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

impl Versioned for Movie {
    type Id = MovieId;

    fn id(&self) -> MovieId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

/// A fully-specified movie awaiting insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieDraft {
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
}

impl MovieDraft {
    /// Materialize the draft as a stored record.
    pub fn into_movie(self, id: MovieId, created_at: DateTime<Utc>) -> Movie {
        Movie {
            id,
            title: self.title,
            year: self.year,
            runtime: self.runtime,
            genres: self.genres,
            version: Version::INITIAL,
            created_at,
        }
    }
}

impl TryFrom<MoviePatch> for MovieDraft {
    type Error = Validator;

    /// Every field must be supplied and valid.
    fn try_from(patch: MoviePatch) -> Result<Self, Validator> {
        let mut v = Validator::new("movie");
        v.check(patch.title.is_some(), FIELD_TITLE, "must be provided");
        v.check(patch.year.is_some(), FIELD_YEAR, "must be provided");
        v.check(patch.runtime.is_some(), FIELD_RUNTIME, "must be provided");
        v.check(patch.genres.is_some(), FIELD_GENRES, "must be provided");
        patch.check(&mut v);

        match patch {
            MoviePatch {
                title: Some(title),
                year: Some(year),
                runtime: Some(runtime),
                genres: Some(genres),
            } if v.is_valid() => Ok(MovieDraft {
                title,
                year,
                runtime,
                genres,
            }),
            _ => Err(v),
        }
    }
}

/// Partial movie fields from a request body; only supplied fields apply.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoviePatch {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

impl MoviePatch {
    /// Validate whichever fields are present.
    pub fn check(&self, v: &mut Validator) {
        if let Some(title) = &self.title {
            v.check(not_blank(title), FIELD_TITLE, "must not be blank");
            v.check(
                char_len(title) <= MAX_TITLE_CHARS,
                FIELD_TITLE,
                "must not have more than 500 characters",
            );
        }

        if let Some(year) = self.year {
            v.check(year >= EARLIEST_YEAR, FIELD_YEAR, "must not be before 1888");
            v.check(year <= Utc::now().year(), FIELD_YEAR, "must not be in the future");
        }

        if let Some(runtime) = self.runtime {
            v.check(runtime.0 > 0, FIELD_RUNTIME, "must be a positive integer");
        }

        if let Some(genres) = &self.genres {
            v.check(!genres.is_empty(), FIELD_GENRES, "must have at least 1 genre");
            v.check(
                genres.len() <= MAX_GENRES,
                FIELD_GENRES,
                "must not have more than 5 genres",
            );
            v.check(
                genres.iter().all(|g| not_blank(g)),
                FIELD_GENRES,
                "must not have any blank genres",
            );
            v.check(unique(genres), FIELD_GENRES, "must have unique genres");
        }
    }

    /// Validate as a partial update.
    pub fn validate(&self) -> Result<(), Validator> {
        let mut v = Validator::new("movie");
        self.check(&mut v);
        v.finish()
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.year.is_none() && self.runtime.is_none() && self.genres.is_none()
    }

    /// Overwrite the supplied fields of `movie`. The version is untouched.
    pub fn apply(self, movie: &mut Movie) {
        if let Some(title) = self.title {
            movie.title = title;
        }
        if let Some(year) = self.year {
            movie.year = year;
        }
        if let Some(runtime) = self.runtime {
            movie.runtime = runtime;
        }
        if let Some(genres) = self.genres {
            movie.genres = genres;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn casablanca() -> Movie {
        MovieDraft {
            title: "Casablanca".into(),
            year: 1942,
            runtime: Runtime(102),
            genres: vec!["drama".into(), "romance".into()],
        }
        .into_movie(MovieId(1), Utc::now())
    }

    #[test]
    fn runtime_json_format() {
        assert_eq!(serde_json::to_value(Runtime(108)).unwrap(), json!("108 mins"));
        assert_eq!(serde_json::to_value(Runtime(1)).unwrap(), json!("1 min"));

        let parsed: Runtime = serde_json::from_value(json!("95 mins")).unwrap();
        assert_eq!(parsed, Runtime(95));
        let parsed: Runtime = serde_json::from_value(json!("1 min")).unwrap();
        assert_eq!(parsed, Runtime(1));
    }

    #[test]
    fn runtime_rejects_other_shapes() {
        for bad in [json!("95"), json!("95 minutes"), json!("ninety mins"), json!(95)] {
            assert!(serde_json::from_value::<Runtime>(bad.clone()).is_err(), "{bad}");
        }
    }

    #[test]
    fn movie_serializes_without_created_at() {
        let value = serde_json::to_value(casablanca()).unwrap();
        assert_eq!(value["runtime"], "102 mins");
        assert_eq!(value["version"], 1);
        assert!(value.get("created_at").is_none());
    }

    #[test]
    fn draft_requires_every_field() {
        let err = MovieDraft::try_from(MoviePatch::default()).unwrap_err();
        assert_eq!(err.kind(), "movie");
        for field in [FIELD_TITLE, FIELD_YEAR, FIELD_RUNTIME, FIELD_GENRES] {
            assert_eq!(err.errors()[field], "must be provided");
        }
    }

    #[test]
    fn draft_from_complete_patch() {
        let patch: MoviePatch = serde_json::from_value(json!({
            "title": "Moana",
            "year": 2016,
            "runtime": "107 mins",
            "genres": ["animation", "adventure"]
        }))
        .unwrap();
        let draft = MovieDraft::try_from(patch).unwrap();
        assert_eq!(draft.runtime, Runtime(107));
    }

    #[test]
    fn patch_field_rules() {
        let patch = MoviePatch {
            title: Some("  ".into()),
            year: Some(1800),
            runtime: Some(Runtime(0)),
            genres: Some(vec!["drama".into(), "drama".into()]),
        };
        let err = patch.validate().unwrap_err();
        assert_eq!(err.errors()[FIELD_TITLE], "must not be blank");
        assert_eq!(err.errors()[FIELD_YEAR], "must not be before 1888");
        assert_eq!(err.errors()[FIELD_RUNTIME], "must be a positive integer");
        assert_eq!(err.errors()[FIELD_GENRES], "must have unique genres");
    }

    #[test]
    fn future_year_and_genre_limits() {
        let patch = MoviePatch {
            year: Some(Utc::now().year() + 1),
            genres: Some(vec![]),
            ..Default::default()
        };
        let err = patch.validate().unwrap_err();
        assert_eq!(err.errors()[FIELD_YEAR], "must not be in the future");
        assert_eq!(err.errors()[FIELD_GENRES], "must have at least 1 genre");

        let six: Vec<String> = (0..6).map(|i| format!("g{i}")).collect();
        let err = MoviePatch {
            genres: Some(six),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.errors()[FIELD_GENRES], "must not have more than 5 genres");
    }

    #[test]
    fn title_length_counts_characters() {
        let ok = MoviePatch {
            title: Some("é".repeat(500)),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
        let long = MoviePatch {
            title: Some("a".repeat(501)),
            ..Default::default()
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn apply_overwrites_only_supplied_fields() {
        let mut movie = casablanca();
        MoviePatch {
            year: Some(1943),
            ..Default::default()
        }
        .apply(&mut movie);
        assert_eq!(movie.year, 1943);
        assert_eq!(movie.title, "Casablanca");
        assert_eq!(movie.version, Version::INITIAL);
    }

    #[test]
    fn patch_rejects_unknown_fields() {
        let result = serde_json::from_value::<MoviePatch>(json!({"title": "x", "rating": 5}));
        assert!(result.is_err());
    }
}
