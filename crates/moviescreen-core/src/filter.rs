//! # Movie Listing Filters
//!
//! Parses the `title`, `genres`, `page`, `limit` and `sort` query parameters
//! into a [`MovieQuery`], and derives pagination [`Metadata`] from a total
//! record count.
//!
//! Sorting is restricted to a fixed safelist of columns so the value can be
//! interpolated into SQL. Ties are always broken by ascending id.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::movie::Movie;
use crate::validation::Validator;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_LIMIT: i64 = 100;

/// Columns a listing may be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Title,
    Year,
    Runtime,
}

impl SortColumn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::Year => "year",
            Self::Runtime => "runtime",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "id" => Some(Self::Id),
            "title" => Some(Self::Title),
            "year" => Some(Self::Year),
            "runtime" => Some(Self::Runtime),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl Sort {
    /// Parse `column` or `-column`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (direction, name) = match raw.strip_prefix('-') {
            Some(rest) => (SortDirection::Descending, rest),
            None => (SortDirection::Ascending, raw),
        };
        SortColumn::parse(name).map(|column| Sort { column, direction })
    }
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            column: SortColumn::Id,
            direction: SortDirection::Ascending,
        }
    }
}

/// A validated movie listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieQuery {
    pub title: String,
    pub genres: Vec<String>,
    pub page: i64,
    pub limit: i64,
    pub sort: Sort,
}

impl Default for MovieQuery {
    fn default() -> Self {
        Self {
            title: String::new(),
            genres: Vec::new(),
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            sort: Sort::default(),
        }
    }
}

impl MovieQuery {
    /// Build a query from raw URL parameters, collecting every problem.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, Validator> {
        let mut v = Validator::new("filters");
        let mut query = MovieQuery::default();

        if let Some(title) = params.get("title") {
            query.title = title.trim().to_string();
        }

        if let Some(genres) = params.get("genres") {
            query.genres = genres
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(page) = read_int(params, "page", &mut v) {
            query.page = page;
        }
        if let Some(limit) = read_int(params, "limit", &mut v) {
            query.limit = limit;
        }

        v.check(query.page > 0, "page", "must be greater than zero");
        v.check(query.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(query.limit > 0, "limit", "must be greater than zero");
        v.check(query.limit <= MAX_LIMIT, "limit", "must be a maximum of 100");

        if let Some(raw) = params.get("sort") {
            match Sort::parse(raw) {
                Some(sort) => query.sort = sort,
                None => v.add_error("sort", "invalid sort value"),
            }
        }

        v.finish().map(|()| query)
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    /// Whether `movie` satisfies the title and genre filters.
    ///
    /// Title matching requires every query word to appear as a title word,
    /// case-insensitively. Genre matching is containment.
    pub fn matches(&self, movie: &Movie) -> bool {
        let title_words: Vec<String> = movie
            .title
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        let title_ok = self
            .title
            .split_whitespace()
            .all(|w| title_words.contains(&w.to_lowercase()));
        let genres_ok = self.genres.iter().all(|g| movie.genres.contains(g));
        title_ok && genres_ok
    }

    /// Order two movies by the requested sort, then by ascending id.
    pub fn compare(&self, a: &Movie, b: &Movie) -> Ordering {
        let primary = match self.sort.column {
            SortColumn::Id => a.id.cmp(&b.id),
            SortColumn::Title => a.title.cmp(&b.title),
            SortColumn::Year => a.year.cmp(&b.year),
            SortColumn::Runtime => a.runtime.cmp(&b.runtime),
        };
        let primary = match self.sort.direction {
            SortDirection::Ascending => primary,
            SortDirection::Descending => primary.reverse(),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

fn read_int(params: &HashMap<String, String>, key: &str, v: &mut Validator) -> Option<i64> {
    let raw = params.get(key)?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            v.add_error(key, "must be an integer value");
            None
        }
    }
}

/// Pagination details returned alongside a listing.
///
/// Empty (every field omitted) when no records matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_records: Option<i64>,
}

impl Metadata {
    pub fn calculate(page: i64, limit: i64, total_records: i64) -> Self {
        if total_records == 0 || limit <= 0 {
            return Self::default();
        }
        Self {
            current_page: Some(page),
            page_limit: Some(limit),
            last_page: Some((total_records + limit - 1) / limit),
            total_records: Some(total_records),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movie::{MovieDraft, MovieId, Runtime};
    use chrono::Utc;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn movie(id: i64, title: &str, year: i32, genres: &[&str]) -> Movie {
        MovieDraft {
            title: title.into(),
            year,
            runtime: Runtime(100),
            genres: genres.iter().map(|g| g.to_string()).collect(),
        }
        .into_movie(MovieId(id), Utc::now())
    }

    #[test]
    fn defaults_when_no_params() {
        let q = MovieQuery::from_params(&HashMap::new()).unwrap();
        assert_eq!(q, MovieQuery::default());
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn parses_every_param() {
        let q = MovieQuery::from_params(&params(&[
            ("title", "black panther"),
            ("genres", "action, adventure"),
            ("page", "3"),
            ("limit", "10"),
            ("sort", "-year"),
        ]))
        .unwrap();
        assert_eq!(q.title, "black panther");
        assert_eq!(q.genres, vec!["action", "adventure"]);
        assert_eq!(q.offset(), 20);
        assert_eq!(q.sort.column, SortColumn::Year);
        assert_eq!(q.sort.direction, SortDirection::Descending);
    }

    #[test]
    fn rejects_out_of_range_and_unknown_sort() {
        let err = MovieQuery::from_params(&params(&[
            ("page", "0"),
            ("limit", "101"),
            ("sort", "rating"),
        ]))
        .unwrap_err();
        assert_eq!(err.kind(), "filters");
        assert_eq!(err.errors()["page"], "must be greater than zero");
        assert_eq!(err.errors()["limit"], "must be a maximum of 100");
        assert_eq!(err.errors()["sort"], "invalid sort value");
    }

    #[test]
    fn non_integer_page_is_reported_once() {
        let err = MovieQuery::from_params(&params(&[("page", "two")])).unwrap_err();
        assert_eq!(err.errors()["page"], "must be an integer value");
    }

    #[test]
    fn sort_safelist() {
        for ok in ["id", "title", "year", "runtime", "-id", "-runtime"] {
            assert!(Sort::parse(ok).is_some(), "{ok}");
        }
        for bad in ["", "-", "--id", "created_at", "id; DROP TABLE movies"] {
            assert!(Sort::parse(bad).is_none(), "{bad}");
        }
    }

    #[test]
    fn title_and_genre_matching() {
        let q = MovieQuery {
            title: "the club".into(),
            genres: vec!["drama".into()],
            ..Default::default()
        };
        assert!(q.matches(&movie(1, "The Breakfast Club", 1985, &["comedy", "drama"])));
        assert!(!q.matches(&movie(2, "The Breakfast Club", 1985, &["comedy"])));
        assert!(!q.matches(&movie(3, "Fight Clubs", 1999, &["drama"])));
    }

    #[test]
    fn descending_sort_breaks_ties_by_ascending_id() {
        let q = MovieQuery {
            sort: Sort::parse("-year").unwrap(),
            ..Default::default()
        };
        let mut movies = vec![
            movie(1, "A", 2000, &["x"]),
            movie(2, "B", 2010, &["x"]),
            movie(3, "C", 2010, &["x"]),
        ];
        movies.sort_by(|a, b| q.compare(a, b));
        let ids: Vec<i64> = movies.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn metadata_calculation() {
        assert_eq!(Metadata::calculate(1, 20, 0), Metadata::default());
        let m = Metadata::calculate(2, 20, 41);
        assert_eq!(m.last_page, Some(3));
        assert_eq!(m.total_records, Some(41));
        assert_eq!(serde_json::to_value(Metadata::default()).unwrap(), serde_json::json!({}));
    }
}
