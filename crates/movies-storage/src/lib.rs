//! Bulk loading of the resolved catalog into the normalized Postgres schema.

use std::fmt;

use movies_core::ResolvedCatalog;
use serde::Serialize;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, Postgres};
use sqlx::query::Query;
use thiserror::Error;
use tracing::{debug, info, info_span, Instrument};

pub const CRATE_NAME: &str = "movies-storage";

pub const DEFAULT_SCHEMA: &str = "content";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid target schema name {0:?}")]
    InvalidSchema(String),
    #[error("connecting to target store: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("opening load transaction: {0}")]
    Begin(#[source] sqlx::Error),
    #[error("bulk insert into {table} ({rows} rows) failed: {source}")]
    Insert {
        table: &'static str,
        rows: usize,
        #[source]
        source: sqlx::Error,
    },
    #[error("committing load transaction: {0}")]
    Commit(#[source] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub pg_type: &'static str,
}

const fn col(name: &'static str, pg_type: &'static str) -> Column {
    Column { name, pg_type }
}

const FILM_WORK_COLUMNS: [Column; 10] = [
    col("id", "uuid"),
    col("title", "text"),
    col("description", "text"),
    col("creation_date", "date"),
    col("certificate", "text"),
    col("file_path", "text"),
    col("rating", "float8"),
    col("type", "text"),
    col("created_at", "timestamptz"),
    col("updated_at", "timestamptz"),
];

const GENRE_COLUMNS: [Column; 5] = [
    col("id", "uuid"),
    col("name", "text"),
    col("description", "text"),
    col("created_at", "timestamptz"),
    col("updated_at", "timestamptz"),
];

const GENRE_FILM_WORK_COLUMNS: [Column; 4] = [
    col("id", "uuid"),
    col("film_work_id", "uuid"),
    col("genre_id", "uuid"),
    col("created_at", "timestamptz"),
];

const PERSON_COLUMNS: [Column; 5] = [
    col("id", "uuid"),
    col("full_name", "text"),
    col("birth_date", "date"),
    col("created_at", "timestamptz"),
    col("updated_at", "timestamptz"),
];

const PERSON_FILM_WORK_COLUMNS: [Column; 5] = [
    col("id", "uuid"),
    col("film_work_id", "uuid"),
    col("person_id", "uuid"),
    col("role", "text"),
    col("created_at", "timestamptz"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetTable {
    FilmWork,
    Genre,
    GenreFilmWork,
    Person,
    PersonFilmWork,
}

impl TargetTable {
    /// Insert order; every link table follows the tables it references.
    pub const LOAD_ORDER: [TargetTable; 5] = [
        TargetTable::FilmWork,
        TargetTable::Genre,
        TargetTable::GenreFilmWork,
        TargetTable::Person,
        TargetTable::PersonFilmWork,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TargetTable::FilmWork => "film_work",
            TargetTable::Genre => "genre",
            TargetTable::GenreFilmWork => "genre_film_work",
            TargetTable::Person => "person",
            TargetTable::PersonFilmWork => "person_film_work",
        }
    }

    /// Columns in the attribute order of the matching canonical entity.
    pub fn columns(self) -> &'static [Column] {
        match self {
            TargetTable::FilmWork => &FILM_WORK_COLUMNS,
            TargetTable::Genre => &GENRE_COLUMNS,
            TargetTable::GenreFilmWork => &GENRE_FILM_WORK_COLUMNS,
            TargetTable::Person => &PERSON_COLUMNS,
            TargetTable::PersonFilmWork => &PERSON_FILM_WORK_COLUMNS,
        }
    }

    pub fn references(self) -> &'static [TargetTable] {
        match self {
            TargetTable::GenreFilmWork => &[TargetTable::FilmWork, TargetTable::Genre],
            TargetTable::PersonFilmWork => &[TargetTable::FilmWork, TargetTable::Person],
            _ => &[],
        }
    }

    pub fn row_count(self, catalog: &ResolvedCatalog) -> usize {
        match self {
            TargetTable::FilmWork => catalog.movies.len(),
            TargetTable::Genre => catalog.genres.len(),
            TargetTable::GenreFilmWork => catalog.movie_genres.len(),
            TargetTable::Person => catalog.persons.len(),
            TargetTable::PersonFilmWork => catalog.movie_persons.len(),
        }
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn validate_schema_name(schema: &str) -> Result<(), LoadError> {
    let mut chars = schema.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(LoadError::InvalidSchema(schema.to_string()))
    }
}

/// One multi-row insert covering every row of `table`.
///
/// Rows travel as one array parameter per column and are expanded with
/// `UNNEST`, so the statement size does not grow with the row count.
pub fn insert_statement(schema: &str, table: TargetTable) -> String {
    let columns = table.columns();
    let names = columns
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ");
    let arrays = columns
        .iter()
        .enumerate()
        .map(|(idx, c)| format!("${}::{}[]", idx + 1, c.pg_type))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {schema}.{table} ({names}) SELECT * FROM UNNEST({arrays})",
        table = table.name()
    )
}

fn column<T, U>(rows: &[T], f: impl Fn(&T) -> U) -> Vec<U> {
    rows.iter().map(f).collect()
}

fn bind_rows<'q>(
    query: Query<'q, Postgres, PgArguments>,
    table: TargetTable,
    catalog: &ResolvedCatalog,
) -> Query<'q, Postgres, PgArguments> {
    match table {
        TargetTable::FilmWork => {
            let rows = &catalog.movies;
            query
                .bind(column(rows, |r| r.id))
                .bind(column(rows, |r| r.title.clone()))
                .bind(column(rows, |r| r.description.clone()))
                .bind(column(rows, |r| r.creation_date))
                .bind(column(rows, |r| r.certificate.clone()))
                .bind(column(rows, |r| r.file_path.clone()))
                .bind(column(rows, |r| r.rating))
                .bind(column(rows, |r| r.kind.clone()))
                .bind(column(rows, |r| r.created_at))
                .bind(column(rows, |r| r.updated_at))
        }
        TargetTable::Genre => {
            let rows = &catalog.genres;
            query
                .bind(column(rows, |r| r.id))
                .bind(column(rows, |r| r.name.clone()))
                .bind(column(rows, |r| r.description.clone()))
                .bind(column(rows, |r| r.created_at))
                .bind(column(rows, |r| r.updated_at))
        }
        TargetTable::GenreFilmWork => {
            let rows = &catalog.movie_genres;
            query
                .bind(column(rows, |r| r.id))
                .bind(column(rows, |r| r.movie_id))
                .bind(column(rows, |r| r.genre_id))
                .bind(column(rows, |r| r.created_at))
        }
        TargetTable::Person => {
            let rows = &catalog.persons;
            query
                .bind(column(rows, |r| r.id))
                .bind(column(rows, |r| r.full_name.clone()))
                .bind(column(rows, |r| r.birth_date))
                .bind(column(rows, |r| r.created_at))
                .bind(column(rows, |r| r.updated_at))
        }
        TargetTable::PersonFilmWork => {
            let rows = &catalog.movie_persons;
            query
                .bind(column(rows, |r| r.id))
                .bind(column(rows, |r| r.movie_id))
                .bind(column(rows, |r| r.person_id))
                .bind(column(rows, |r| r.role.as_str()))
                .bind(column(rows, |r| r.created_at))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableBatch {
    pub table: TargetTable,
    pub rows: usize,
}

/// Ordered batches a load would execute, one per target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadPlan {
    pub schema: String,
    pub batches: Vec<TableBatch>,
}

impl LoadPlan {
    pub fn from_catalog(schema: &str, catalog: &ResolvedCatalog) -> Result<Self, LoadError> {
        validate_schema_name(schema)?;
        Ok(Self {
            schema: schema.to_string(),
            batches: TargetTable::LOAD_ORDER
                .iter()
                .map(|&table| TableBatch {
                    table,
                    rows: table.row_count(catalog),
                })
                .collect(),
        })
    }

    pub fn total_rows(&self) -> usize {
        self.batches.iter().map(|b| b.rows).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLoad {
    pub table: TargetTable,
    pub rows_inserted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub tables: Vec<TableLoad>,
}

impl LoadReport {
    pub fn rows_for(&self, table: TargetTable) -> u64 {
        self.tables
            .iter()
            .filter(|t| t.table == table)
            .map(|t| t.rows_inserted)
            .sum()
    }
}

/// Writes a resolved catalog over a single pooled connection.
#[derive(Debug, Clone)]
pub struct PgLoader {
    pool: PgPool,
    schema: String,
}

impl PgLoader {
    pub async fn connect(database_url: &str, schema: impl Into<String>) -> Result<Self, LoadError> {
        let schema = schema.into();
        validate_schema_name(&schema)?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .map_err(LoadError::Connect)?;
        Ok(Self { pool, schema })
    }

    pub fn from_pool(pool: PgPool, schema: impl Into<String>) -> Result<Self, LoadError> {
        let schema = schema.into();
        validate_schema_name(&schema)?;
        Ok(Self { pool, schema })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Insert every table in [`TargetTable::LOAD_ORDER`] inside one transaction.
    ///
    /// The store's own constraints are the only validation; the first
    /// rejected batch aborts the load and nothing is committed.
    pub async fn load(&self, catalog: &ResolvedCatalog) -> Result<LoadReport, LoadError> {
        let plan = LoadPlan::from_catalog(&self.schema, catalog)?;
        let mut tx = self.pool.begin().await.map_err(LoadError::Begin)?;
        let mut report = LoadReport::default();

        for batch in &plan.batches {
            if batch.rows == 0 {
                debug!(table = batch.table.name(), "no rows; skipping batch");
                continue;
            }
            let sql = insert_statement(&self.schema, batch.table);
            let span = info_span!("bulk_insert", table = batch.table.name(), rows = batch.rows);
            let result = bind_rows(sqlx::query(&sql), batch.table, catalog)
                .execute(&mut *tx)
                .instrument(span)
                .await
                .map_err(|source| LoadError::Insert {
                    table: batch.table.name(),
                    rows: batch.rows,
                    source,
                })?;
            report.tables.push(TableLoad {
                table: batch.table,
                rows_inserted: result.rows_affected(),
            });
        }

        tx.commit().await.map_err(LoadError::Commit)?;
        info!(schema = %self.schema, rows = plan.total_rows(), "catalog loaded");
        Ok(report)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
