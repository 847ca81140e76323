//! Legacy record shapes and canonical catalog entities for the movie migration.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "movies-core";

/// Values the legacy store uses in place of a missing field.
pub const EMPTY_SENTINELS: [&str; 2] = ["N/A", ""];

/// Separator used by the legacy `genre` and `director` columns.
pub const JOINED_SEPARATOR: &str = ", ";

pub type LegacyMovieId = String;
pub type LegacyActorId = i64;
pub type LegacyWriterId = String;

pub fn is_empty_sentinel(value: &str) -> bool {
    EMPTY_SENTINELS.contains(&value)
}

/// Keep the first occurrence of every item, preserving input order.
pub fn dedup_preserving_order<T>(items: impl IntoIterator<Item = T>) -> Vec<T>
where
    T: Eq + std::hash::Hash + Clone,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Split a legacy comma-joined list on `", "` and deduplicate it.
///
/// Only the literal comma-plus-space separator is recognized; `"A,B"` stays a
/// single name.
pub fn split_joined(value: Option<&str>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    dedup_preserving_order(
        value
            .split(JOINED_SEPARATOR)
            .filter(|part| !part.is_empty())
            .map(str::to_string),
    )
}

/// One `movies` row exactly as the legacy store exposes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMovieRow {
    pub id: LegacyMovieId,
    pub genre: Option<String>,
    pub director: Option<String>,
    pub writer: Option<String>,
    pub writers: Option<String>,
    pub title: String,
    pub plot: Option<String>,
    pub imdb_rating: Option<String>,
}

/// Legacy movie after sentinel cleanup and writer flattening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyMovie {
    pub id: LegacyMovieId,
    pub genre: Option<String>,
    pub director: Option<String>,
    pub title: String,
    pub plot: Option<String>,
    pub imdb_rating: Option<String>,
    pub writers: Vec<LegacyWriterId>,
}

impl LegacyMovie {
    pub fn genres(&self) -> Vec<String> {
        split_joined(self.genre.as_deref())
    }

    pub fn directors(&self) -> Vec<String> {
        split_joined(self.director.as_deref())
    }
}

/// Everything the resolver needs from the legacy store, held in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyCatalog {
    pub movies: Vec<LegacyMovie>,
    pub movie_actors: HashMap<LegacyMovieId, Vec<LegacyActorId>>,
    pub actor_names: HashMap<LegacyActorId, String>,
    pub writer_names: HashMap<LegacyWriterId, String>,
}

impl LegacyCatalog {
    pub fn actors_for(&self, movie_id: &str) -> &[LegacyActorId] {
        self.movie_actors
            .get(movie_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Director,
    Actor,
    Writer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Director => "director",
            Role::Actor => "actor",
            Role::Writer => "writer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Field order in the entities below is the column order of the target tables.

/// `film_work` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub creation_date: Option<NaiveDate>,
    pub certificate: Option<String>,
    pub file_path: Option<String>,
    pub rating: Option<f64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Movie {
    pub fn new(title: String, description: Option<String>, rating: Option<f64>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            description,
            creation_date: None,
            certificate: None,
            file_path: None,
            rating,
            kind: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// `person` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    pub fn new(full_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            full_name,
            birth_date: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// `genre` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Genre {
    pub fn new(name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// `person_film_work` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoviePerson {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub person_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl MoviePerson {
    pub fn new(movie_id: Uuid, person_id: Uuid, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            movie_id,
            person_id,
            role,
            created_at: Utc::now(),
        }
    }
}

/// `genre_film_work` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieGenre {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub genre_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl MovieGenre {
    pub fn new(movie_id: Uuid, genre_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            movie_id,
            genre_id,
            created_at: Utc::now(),
        }
    }
}

/// Fully resolved entity graph for one migration run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCatalog {
    pub movies: Vec<Movie>,
    pub persons: Vec<Person>,
    pub genres: Vec<Genre>,
    pub movie_persons: Vec<MoviePerson>,
    pub movie_genres: Vec<MovieGenre>,
}

impl ResolvedCatalog {
    pub fn counts(&self) -> CatalogCounts {
        CatalogCounts {
            movies: self.movies.len(),
            persons: self.persons.len(),
            genres: self.genres.len(),
            movie_persons: self.movie_persons.len(),
            movie_genres: self.movie_genres.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCounts {
    pub movies: usize,
    pub persons: usize,
    pub genres: usize,
    pub movie_persons: usize,
    pub movie_genres: usize,
}
