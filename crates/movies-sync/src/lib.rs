//! Migration pipeline orchestration: legacy read -> resolve -> bulk load -> report.

pub mod config;
pub mod resolver;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use movies_core::{CatalogCounts, ResolvedCatalog};
use movies_legacy::{LegacySource, SqliteLegacySource};
use movies_storage::{LoadPlan, LoadReport, PgLoader};
use serde::Serialize;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

pub use config::{ConfigError, ConfigOverlay, MigrationConfig};
pub use resolver::{parse_rating, resolve_catalog, EntityResolver, ResolveError};

pub const CRATE_NAME: &str = "movies-sync";

pub const SUMMARY_FILE: &str = "migration_summary.json";

/// What a run would write, computed without touching the target store.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan {
    pub legacy_movies: usize,
    pub counts: CatalogCounts,
    pub load_plan: LoadPlan,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub legacy_movies: usize,
    pub counts: CatalogCounts,
    pub load: LoadReport,
    pub target_schema: String,
    pub database_url: String,
    pub report_path: Option<String>,
}

/// Read the whole legacy catalog and resolve it in memory.
pub async fn transform<S>(source: &mut S) -> Result<(usize, ResolvedCatalog)>
where
    S: LegacySource + ?Sized,
{
    let legacy = source
        .read_catalog()
        .await
        .context("reading legacy catalog")?;
    let resolved = resolve_catalog(&legacy).context("resolving legacy entities")?;
    let counts = resolved.counts();
    info!(
        movies = counts.movies,
        persons = counts.persons,
        genres = counts.genres,
        movie_persons = counts.movie_persons,
        movie_genres = counts.movie_genres,
        "legacy catalog resolved"
    );
    Ok((legacy.movies.len(), resolved))
}

pub struct MigrationPipeline {
    config: MigrationConfig,
}

impl MigrationPipeline {
    pub fn new(config: MigrationConfig) -> Self {
        Self { config }
    }

    async fn read_and_resolve(&self) -> Result<(usize, ResolvedCatalog)> {
        let mut source = SqliteLegacySource::open(&self.config.sqlite_path)
            .await
            .with_context(|| format!("opening {}", self.config.sqlite_path.display()))?;
        let transformed = transform(&mut source).await;
        source.close().await.context("closing legacy store")?;
        transformed
    }

    pub async fn plan(&self) -> Result<MigrationPlan> {
        let (legacy_movies, resolved) = self.read_and_resolve().await?;
        let load_plan = LoadPlan::from_catalog(&self.config.target_schema, &resolved)?;
        Ok(MigrationPlan {
            legacy_movies,
            counts: resolved.counts(),
            load_plan,
        })
    }

    pub async fn run_once(&self) -> Result<MigrationRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, source = %self.config.sqlite_path.display(), "migration started");

        let (legacy_movies, resolved) = self.read_and_resolve().await?;

        let loader = PgLoader::connect(&self.config.database_url, self.config.target_schema.clone())
            .await
            .with_context(|| format!("connecting to {}", self.config.redacted_database_url()))?;
        info!(schema = loader.schema(), "target store connected");
        let load = loader.load(&resolved).await;
        loader.close().await;
        let load = load.context("loading resolved catalog")?;

        let mut summary = MigrationRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            legacy_movies,
            counts: resolved.counts(),
            load,
            target_schema: self.config.target_schema.clone(),
            database_url: self.config.redacted_database_url(),
            report_path: None,
        };

        if self.config.write_report {
            let path = write_run_report(&self.config.reports_dir, &summary).await?;
            summary.report_path = Some(path.display().to_string());
        }

        info!(%run_id, movies = summary.counts.movies, "migration finished");
        Ok(summary)
    }
}

pub async fn run_migration_from_env(config_path: Option<&Path>) -> Result<MigrationRunSummary> {
    MigrationPipeline::new(load_config(config_path)?).run_once().await
}

pub async fn plan_migration_from_env(config_path: Option<&Path>) -> Result<MigrationPlan> {
    MigrationPipeline::new(load_config(config_path)?).plan().await
}

pub fn load_config(config_path: Option<&Path>) -> Result<MigrationConfig> {
    match config_path {
        Some(path) => Ok(MigrationConfig::from_yaml_file(path)?),
        None => Ok(MigrationConfig::from_env()),
    }
}

pub async fn write_run_report(reports_dir: &Path, summary: &MigrationRunSummary) -> Result<PathBuf> {
    let run_dir = reports_dir.join(summary.run_id.to_string());
    fs::create_dir_all(&run_dir)
        .await
        .with_context(|| format!("creating {}", run_dir.display()))?;
    let path = run_dir.join(SUMMARY_FILE);
    let bytes = serde_json::to_vec_pretty(summary).context("serializing migration summary")?;
    fs::write(&path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Markdown digest of the most recent run reports under `reports_root`.
pub fn report_markdown(runs: usize, reports_root: &Path) -> Result<String> {
    let mut dirs = std::fs::read_dir(reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().join(SUMMARY_FILE).exists())
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();

    let mut lines = vec!["# Movie Migration Runs".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let path = dir.path().join(SUMMARY_FILE);
        let value: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?,
        )
        .with_context(|| format!("parsing {}", path.display()))?;

        let count = |key: &str| {
            value
                .get("counts")
                .and_then(|c| c.get(key))
                .and_then(|v| v.as_u64())
                .unwrap_or(0)
        };
        let field = |key: &str| value.get(key).and_then(|v| v.as_str()).unwrap_or("unknown");

        lines.push(format!("## Run `{}`", dir.file_name().to_string_lossy()));
        lines.push(format!("- finished: {}", field("finished_at")));
        lines.push(format!("- target: `{}` schema `{}`", field("database_url"), field("target_schema")));
        lines.push(format!(
            "- film_work: {}, person: {}, genre: {}",
            count("movies"),
            count("persons"),
            count("genres")
        ));
        lines.push(format!(
            "- person_film_work: {}, genre_film_work: {}",
            count("movie_persons"),
            count("movie_genres")
        ));
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use movies_core::{LegacyCatalog, LegacyMovie};
    use movies_legacy::ReadError;
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct InMemorySource(LegacyCatalog);

    #[async_trait]
    impl LegacySource for InMemorySource {
        async fn read_catalog(&mut self) -> Result<LegacyCatalog, ReadError> {
            Ok(self.0.clone())
        }
    }

    fn legacy() -> LegacyCatalog {
        LegacyCatalog {
            movies: vec![LegacyMovie {
                id: "tt0083658".into(),
                genre: Some("Sci-Fi, Thriller".into()),
                director: Some("Ridley Scott".into()),
                title: "Blade Runner".into(),
                plot: Some("A blade runner must pursue replicants.".into()),
                imdb_rating: Some("8.1".into()),
                writers: vec!["w1".into(), "w2".into()],
            }],
            movie_actors: HashMap::from([("tt0083658".to_string(), vec![10, 11])]),
            actor_names: HashMap::from([
                (10, "Harrison Ford".to_string()),
                (11, "Rutger Hauer".to_string()),
            ]),
            writer_names: HashMap::from([
                ("w1".to_string(), "Hampton Fancher".to_string()),
                ("w2".to_string(), "David Peoples".to_string()),
            ]),
        }
    }

    fn summary(run_id: Uuid, counts: CatalogCounts, config: &MigrationConfig) -> MigrationRunSummary {
        MigrationRunSummary {
            run_id,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            legacy_movies: counts.movies,
            counts,
            load: LoadReport::default(),
            target_schema: config.target_schema.clone(),
            database_url: config.redacted_database_url(),
            report_path: None,
        }
    }

    #[tokio::test]
    async fn transform_resolves_every_role() {
        let mut source = InMemorySource(legacy());
        let (legacy_movies, resolved) = transform(&mut source).await.unwrap();
        assert_eq!(legacy_movies, 1);
        assert_eq!(
            resolved.counts(),
            CatalogCounts {
                movies: 1,
                persons: 5,
                genres: 2,
                movie_persons: 5,
                movie_genres: 2,
            }
        );
    }

    #[tokio::test]
    async fn transform_surfaces_lookup_faults_with_context() {
        let mut catalog = legacy();
        catalog.actor_names.remove(&11);
        let mut source = InMemorySource(catalog);
        let err = transform(&mut source).await.unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("resolving legacy entities"));
        assert!(chain.contains("actor 11"));
    }

    #[tokio::test]
    async fn run_report_round_trips_into_markdown() {
        let dir = tempdir().unwrap();
        let run_id = Uuid::new_v4();
        let counts = CatalogCounts {
            movies: 3,
            persons: 7,
            genres: 2,
            movie_persons: 9,
            movie_genres: 4,
        };
        let config = MigrationConfig::from_vars(|key| {
            (key == "DATABASE_URL").then(|| "postgres://app:s3cret@db/movies".to_string())
        });
        let path = write_run_report(dir.path(), &summary(run_id, counts, &config))
            .await
            .unwrap();
        let json = std::fs::read_to_string(&path).unwrap();
        assert!(json.contains("postgres://app:***@db/movies"));
        assert!(!json.contains("s3cret"));
        assert!(path.ends_with(format!("{run_id}/{SUMMARY_FILE}")));

        let markdown = report_markdown(5, dir.path()).unwrap();
        assert!(markdown.contains(&format!("## Run `{run_id}`")));
        assert!(markdown.contains("film_work: 3, person: 7, genre: 2"));
        assert!(markdown.contains("person_film_work: 9, genre_film_work: 4"));
        assert!(markdown.contains("schema `content`"));
        assert!(!markdown.contains("s3cret"));
    }
}
