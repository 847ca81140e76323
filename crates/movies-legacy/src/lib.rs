//! Legacy SQLite reader contracts + row sanitizing.

pub mod sanitize;

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::num::ParseIntError;
use std::path::Path;

use async_trait::async_trait;
use movies_core::{
    dedup_preserving_order, is_empty_sentinel, LegacyActorId, LegacyCatalog, LegacyMovieId,
    LegacyWriterId, RawMovieRow,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row};
use thiserror::Error;
use tracing::{info, warn};

pub use sanitize::{flatten_writer_ids, none_if_empty, sanitize_movie, SanitizeError};

pub const CRATE_NAME: &str = "movies-legacy";

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("opening legacy store {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("reading legacy table {table}: {source}")]
    Query {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("movie_actors row for movie {movie_id}: actor_id {raw:?} is not an integer")]
    InvalidActorId {
        movie_id: LegacyMovieId,
        raw: String,
        #[source]
        source: ParseIntError,
    },
    #[error(transparent)]
    Sanitize(#[from] SanitizeError),
}

fn query_err(table: &'static str) -> impl FnOnce(sqlx::Error) -> ReadError {
    move |source| ReadError::Query { table, source }
}

/// Source of the denormalized legacy catalog.
#[async_trait]
pub trait LegacySource: Send {
    async fn read_catalog(&mut self) -> Result<LegacyCatalog, ReadError>;
}

/// A legacy name table split into usable names and ids whose name is a sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTable<K: Eq + Hash> {
    pub names: HashMap<K, String>,
    pub invalid_ids: HashSet<K>,
}

impl<K: Eq + Hash> NameTable<K> {
    pub fn from_rows(rows: impl IntoIterator<Item = (K, Option<String>)>) -> Self {
        let mut names = HashMap::new();
        let mut invalid_ids = HashSet::new();
        for (id, name) in rows {
            match name {
                Some(name) if !is_empty_sentinel(&name) => {
                    names.insert(id, name);
                }
                _ => {
                    invalid_ids.insert(id);
                }
            }
        }
        Self { names, invalid_ids }
    }
}

pub async fn open_sqlite(path: impl AsRef<Path>) -> Result<SqliteConnection, ReadError> {
    let path = path.as_ref();
    SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .connect()
        .await
        .map_err(|source| ReadError::Open {
            path: path.display().to_string(),
            source,
        })
}

/// Reads the four legacy tables over a single connection.
#[derive(Debug)]
pub struct SqliteLegacySource {
    conn: SqliteConnection,
}

impl SqliteLegacySource {
    pub fn new(conn: SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ReadError> {
        Ok(Self::new(open_sqlite(path).await?))
    }

    pub async fn close(self) -> Result<(), ReadError> {
        self.conn.close().await.map_err(query_err("<connection>"))
    }

    pub async fn read_actor_names(&mut self) -> Result<NameTable<LegacyActorId>, ReadError> {
        let rows = sqlx::query(
            "SELECT DISTINCT CAST(id AS INTEGER) AS id, CAST(name AS TEXT) AS name FROM actors",
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(query_err("actors"))?;
        let pairs = rows
            .iter()
            .map(|row| {
                Ok((
                    row.try_get::<i64, _>("id")?,
                    row.try_get::<Option<String>, _>("name")?,
                ))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(query_err("actors"))?;
        Ok(NameTable::from_rows(pairs))
    }

    pub async fn read_writer_names(&mut self) -> Result<NameTable<LegacyWriterId>, ReadError> {
        let rows = sqlx::query(
            "SELECT DISTINCT CAST(id AS TEXT) AS id, CAST(name AS TEXT) AS name FROM writers",
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(query_err("writers"))?;
        let pairs = rows
            .iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("id")?,
                    row.try_get::<Option<String>, _>("name")?,
                ))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(query_err("writers"))?;
        Ok(NameTable::from_rows(pairs))
    }

    /// Actor ids per movie, invalid ids excluded, each list deduplicated.
    pub async fn read_movie_actors(
        &mut self,
        invalid_actor_ids: &HashSet<LegacyActorId>,
    ) -> Result<HashMap<LegacyMovieId, Vec<LegacyActorId>>, ReadError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT CAST(movie_id AS TEXT) AS movie_id,
                            CAST(actor_id AS TEXT) AS actor_id
              FROM movie_actors
             ORDER BY movie_id, actor_id
            "#,
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(query_err("movie_actors"))?;

        let mut movie_actors: HashMap<LegacyMovieId, Vec<LegacyActorId>> = HashMap::new();
        for row in &rows {
            let movie_id: String = row.try_get("movie_id").map_err(query_err("movie_actors"))?;
            let raw: String = row.try_get("actor_id").map_err(query_err("movie_actors"))?;
            let actor_id = match raw.trim().parse::<LegacyActorId>() {
                Ok(id) => id,
                Err(source) => {
                    return Err(ReadError::InvalidActorId {
                        movie_id,
                        raw,
                        source,
                    })
                }
            };
            let actors = movie_actors.entry(movie_id).or_default();
            if !invalid_actor_ids.contains(&actor_id) {
                actors.push(actor_id);
            }
        }
        for actors in movie_actors.values_mut() {
            *actors = dedup_preserving_order(std::mem::take(actors));
        }
        Ok(movie_actors)
    }

    pub async fn read_movies(&mut self) -> Result<Vec<RawMovieRow>, ReadError> {
        // imdb_rating holds REAL values next to the "N/A" text sentinel.
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT CAST(id AS TEXT) AS id,
                            CAST(genre AS TEXT) AS genre,
                            CAST(director AS TEXT) AS director,
                            CAST(writer AS TEXT) AS writer,
                            CAST(writers AS TEXT) AS writers,
                            CAST(title AS TEXT) AS title,
                            CAST(plot AS TEXT) AS plot,
                            CAST(imdb_rating AS TEXT) AS imdb_rating
              FROM movies
             ORDER BY id
            "#,
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(query_err("movies"))?;

        rows.iter()
            .map(raw_movie_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_err("movies"))
    }
}

fn raw_movie_from_row(row: &SqliteRow) -> Result<RawMovieRow, sqlx::Error> {
    Ok(RawMovieRow {
        id: row.try_get("id")?,
        genre: row.try_get("genre")?,
        director: row.try_get("director")?,
        writer: row.try_get("writer")?,
        writers: row.try_get("writers")?,
        title: row.try_get("title")?,
        plot: row.try_get("plot")?,
        imdb_rating: row.try_get("imdb_rating")?,
    })
}

#[async_trait]
impl LegacySource for SqliteLegacySource {
    async fn read_catalog(&mut self) -> Result<LegacyCatalog, ReadError> {
        let actors = self.read_actor_names().await?;
        let writers = self.read_writer_names().await?;
        if !actors.invalid_ids.is_empty() || !writers.invalid_ids.is_empty() {
            warn!(
                invalid_actors = actors.invalid_ids.len(),
                invalid_writers = writers.invalid_ids.len(),
                "excluding legacy persons with empty names"
            );
        }

        let movie_actors = self.read_movie_actors(&actors.invalid_ids).await?;
        let movies = self
            .read_movies()
            .await?
            .into_iter()
            .map(|raw| sanitize_movie(raw, &writers.invalid_ids))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            movies = movies.len(),
            actors = actors.names.len(),
            writers = writers.names.len(),
            "legacy catalog read"
        );

        Ok(LegacyCatalog {
            movies,
            movie_actors,
            actor_names: actors.names,
            writer_names: writers.names,
        })
    }
}
