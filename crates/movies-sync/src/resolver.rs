//! Identity reconciliation: legacy references -> canonical entities + links.
//!
//! Directors and genres are keyed by name, actors and writers by legacy id.
//! The two person namespaces are never merged, so a director and an actor
//! sharing a name become two `Person` rows.

use std::collections::HashMap;
use std::hash::Hash;
use std::num::ParseFloatError;

use movies_core::{
    Genre, LegacyActorId, LegacyCatalog, LegacyMovie, LegacyWriterId, Movie, MovieGenre,
    MoviePerson, Person, ResolvedCatalog, Role,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("movie {movie_id}: actor {actor_id} has no entry in actors")]
    UnknownActor {
        movie_id: String,
        actor_id: LegacyActorId,
    },
    #[error("movie {movie_id}: writer {writer_id} has no entry in writers")]
    UnknownWriter {
        movie_id: String,
        writer_id: LegacyWriterId,
    },
    #[error("movie {movie_id}: imdb_rating {raw:?} is not a number")]
    InvalidRating {
        movie_id: String,
        raw: String,
        #[source]
        source: ParseFloatError,
    },
}

pub fn parse_rating(movie_id: &str, raw: Option<&str>) -> Result<Option<f64>, ResolveError> {
    raw.map(|raw| {
        raw.trim()
            .parse::<f64>()
            .map_err(|source| ResolveError::InvalidRating {
                movie_id: movie_id.to_string(),
                raw: raw.to_string(),
                source,
            })
    })
    .transpose()
}

fn cached_person<K: Eq + Hash>(
    cache: &mut HashMap<K, Uuid>,
    persons: &mut Vec<Person>,
    key: K,
    full_name: impl FnOnce(&K) -> Result<String, ResolveError>,
) -> Result<Uuid, ResolveError> {
    if let Some(id) = cache.get(&key) {
        return Ok(*id);
    }
    let person = Person::new(full_name(&key)?);
    let id = person.id;
    persons.push(person);
    cache.insert(key, id);
    Ok(id)
}

/// Dedup caches and output for a single migration run.
#[derive(Debug, Default)]
pub struct EntityResolver {
    directors: HashMap<String, Uuid>,
    genres: HashMap<String, Uuid>,
    actors: HashMap<LegacyActorId, Uuid>,
    writers: HashMap<LegacyWriterId, Uuid>,
    resolved: ResolvedCatalog,
}

impl EntityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve one sanitized movie; returns the new film work id.
    ///
    /// Steps run in a fixed order (movie, genres, directors, actors, writers)
    /// so cache population is deterministic for a given input order.
    pub fn resolve_movie(
        &mut self,
        movie: &LegacyMovie,
        legacy: &LegacyCatalog,
    ) -> Result<Uuid, ResolveError> {
        let rating = parse_rating(&movie.id, movie.imdb_rating.as_deref())?;
        let film_work = Movie::new(movie.title.clone(), movie.plot.clone(), rating);
        let film_work_id = film_work.id;
        self.resolved.movies.push(film_work);

        for name in movie.genres() {
            let genre_id = self.genre_id(name);
            self.resolved
                .movie_genres
                .push(MovieGenre::new(film_work_id, genre_id));
        }

        for name in movie.directors() {
            let person_id = cached_person(
                &mut self.directors,
                &mut self.resolved.persons,
                name,
                |name| Ok(name.clone()),
            )?;
            self.link_person(film_work_id, person_id, Role::Director);
        }

        for &actor_id in legacy.actors_for(&movie.id) {
            let person_id = cached_person(
                &mut self.actors,
                &mut self.resolved.persons,
                actor_id,
                |actor_id| {
                    legacy.actor_names.get(actor_id).cloned().ok_or_else(|| {
                        ResolveError::UnknownActor {
                            movie_id: movie.id.clone(),
                            actor_id: *actor_id,
                        }
                    })
                },
            )?;
            self.link_person(film_work_id, person_id, Role::Actor);
        }

        for writer_id in &movie.writers {
            let person_id = cached_person(
                &mut self.writers,
                &mut self.resolved.persons,
                writer_id.clone(),
                |writer_id| {
                    legacy.writer_names.get(writer_id).cloned().ok_or_else(|| {
                        ResolveError::UnknownWriter {
                            movie_id: movie.id.clone(),
                            writer_id: writer_id.clone(),
                        }
                    })
                },
            )?;
            self.link_person(film_work_id, person_id, Role::Writer);
        }

        Ok(film_work_id)
    }

    fn genre_id(&mut self, name: String) -> Uuid {
        let genres = &mut self.resolved.genres;
        *self.genres.entry(name).or_insert_with_key(|name| {
            let genre = Genre::new(name.clone());
            let id = genre.id;
            genres.push(genre);
            id
        })
    }

    fn link_person(&mut self, film_work_id: Uuid, person_id: Uuid, role: Role) {
        self.resolved
            .movie_persons
            .push(MoviePerson::new(film_work_id, person_id, role));
    }

    pub fn finish(self) -> ResolvedCatalog {
        self.resolved
    }
}

/// Resolve every legacy movie in input order; the first fault aborts.
pub fn resolve_catalog(legacy: &LegacyCatalog) -> Result<ResolvedCatalog, ResolveError> {
    let mut resolver = EntityResolver::new();
    for movie in &legacy.movies {
        resolver.resolve_movie(movie, legacy)?;
    }
    Ok(resolver.finish())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use movies_core::RawMovieRow;
    use movies_legacy::sanitize_movie;

    fn movie(id: &str) -> LegacyMovie {
        LegacyMovie {
            id: id.to_string(),
            genre: None,
            director: None,
            title: format!("Movie {id}"),
            plot: None,
            imdb_rating: None,
            writers: Vec::new(),
        }
    }

    fn person_name(catalog: &ResolvedCatalog, id: Uuid) -> &str {
        &catalog
            .persons
            .iter()
            .find(|p| p.id == id)
            .expect("person exists")
            .full_name
    }

    #[test]
    fn repeated_genres_resolve_to_one_entity_each() {
        let mut m = movie("tt1");
        m.genre = Some("Action, Comedy, Action".into());
        let legacy = LegacyCatalog {
            movies: vec![m],
            ..Default::default()
        };

        let resolved = resolve_catalog(&legacy).unwrap();
        let names = resolved.genres.iter().map(|g| g.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Action", "Comedy"]);
        assert_eq!(resolved.movie_genres.len(), 2);
        let linked = resolved
            .movie_genres
            .iter()
            .map(|l| l.genre_id)
            .collect::<HashSet<_>>();
        assert_eq!(linked.len(), 2);
    }

    #[test]
    fn genres_are_shared_across_movies() {
        let mut a = movie("tt1");
        a.genre = Some("Drama".into());
        let mut b = movie("tt2");
        b.genre = Some("Drama, Crime".into());
        let legacy = LegacyCatalog {
            movies: vec![a, b],
            ..Default::default()
        };

        let resolved = resolve_catalog(&legacy).unwrap();
        assert_eq!(resolved.genres.len(), 2);
        assert_eq!(resolved.movie_genres.len(), 3);
        assert_eq!(resolved.movie_genres[0].genre_id, resolved.movie_genres[1].genre_id);
    }

    #[test]
    fn same_director_name_shares_one_person() {
        let mut a = movie("tt1");
        a.director = Some("Jane Doe".into());
        let mut b = movie("tt2");
        b.director = Some("Jane Doe, John Roe".into());
        let legacy = LegacyCatalog {
            movies: vec![a, b],
            ..Default::default()
        };

        let resolved = resolve_catalog(&legacy).unwrap();
        assert_eq!(resolved.persons.len(), 2);
        let jane = resolved
            .movie_persons
            .iter()
            .filter(|l| person_name(&resolved, l.person_id) == "Jane Doe")
            .map(|l| l.person_id)
            .collect::<HashSet<_>>();
        assert_eq!(jane.len(), 1);
        assert!(resolved.movie_persons.iter().all(|l| l.role == Role::Director));
    }

    #[test]
    fn actor_and_writer_with_same_name_stay_distinct() {
        let mut m = movie("tt1");
        m.writers = vec!["w7".into()];
        m.director = Some("Sam Lee".into());
        let legacy = LegacyCatalog {
            movies: vec![m],
            movie_actors: HashMap::from([("tt1".to_string(), vec![7])]),
            actor_names: HashMap::from([(7, "Sam Lee".to_string())]),
            writer_names: HashMap::from([("w7".to_string(), "Sam Lee".to_string())]),
        };

        let resolved = resolve_catalog(&legacy).unwrap();
        assert_eq!(resolved.persons.len(), 3);
        assert!(resolved.persons.iter().all(|p| p.full_name == "Sam Lee"));
        let roles = resolved.movie_persons.iter().map(|l| l.role).collect::<Vec<_>>();
        assert_eq!(roles, vec![Role::Director, Role::Actor, Role::Writer]);
    }

    #[test]
    fn actors_and_writers_dedup_by_legacy_id_across_movies() {
        let mut a = movie("tt1");
        a.writers = vec!["w1".into()];
        let mut b = movie("tt2");
        b.writers = vec!["w1".into(), "w2".into()];
        let legacy = LegacyCatalog {
            movies: vec![a, b],
            movie_actors: HashMap::from([
                ("tt1".to_string(), vec![1, 2]),
                ("tt2".to_string(), vec![2]),
            ]),
            actor_names: HashMap::from([(1, "Ann".to_string()), (2, "Bob".to_string())]),
            writer_names: HashMap::from([
                ("w1".to_string(), "Wes".to_string()),
                ("w2".to_string(), "Wil".to_string()),
            ]),
        };

        let resolved = resolve_catalog(&legacy).unwrap();
        assert_eq!(resolved.persons.len(), 4);
        assert_eq!(resolved.movie_persons.len(), 6);
    }

    #[test]
    fn sentinel_rating_is_absent_not_zero() {
        let raw = RawMovieRow {
            id: "tt1".into(),
            genre: None,
            director: None,
            writer: None,
            writers: None,
            title: "Untitled".into(),
            plot: None,
            imdb_rating: Some("N/A".into()),
        };
        let legacy = LegacyCatalog {
            movies: vec![sanitize_movie(raw, &HashSet::new()).unwrap()],
            ..Default::default()
        };

        let resolved = resolve_catalog(&legacy).unwrap();
        assert_eq!(resolved.movies[0].rating, None);
    }

    #[test]
    fn rating_is_parsed_as_float() {
        assert_eq!(parse_rating("tt1", Some("7.9")).unwrap(), Some(7.9));
        assert_eq!(parse_rating("tt1", None).unwrap(), None);
    }

    #[test]
    fn non_numeric_rating_is_fatal() {
        let err = parse_rating("tt9", Some("great")).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidRating { ref movie_id, .. } if movie_id == "tt9"));
    }

    #[test]
    fn json_and_bare_writer_shapes_link_the_same_persons() {
        let json_row = RawMovieRow {
            id: "tt1".into(),
            genre: None,
            director: None,
            writer: None,
            writers: Some(r#"[{"id": "w1"}, {"id": "w2"}]"#.into()),
            title: "Json writers".into(),
            plot: None,
            imdb_rating: None,
        };
        let bare_row = RawMovieRow {
            id: "tt2".into(),
            writer: Some("w1".into()),
            writers: None,
            title: "Bare writer".into(),
            ..json_row.clone()
        };
        let no_invalid = HashSet::new();
        let legacy = LegacyCatalog {
            movies: vec![
                sanitize_movie(json_row, &no_invalid).unwrap(),
                sanitize_movie(bare_row, &no_invalid).unwrap(),
            ],
            writer_names: HashMap::from([
                ("w1".to_string(), "Lawrence Kasdan".to_string()),
                ("w2".to_string(), "Leigh Brackett".to_string()),
            ]),
            ..Default::default()
        };

        let resolved = resolve_catalog(&legacy).unwrap();
        let first = resolved.movies[0].id;
        let second = resolved.movies[1].id;
        let writers_of = |film: Uuid| {
            resolved
                .movie_persons
                .iter()
                .filter(|l| l.movie_id == film && l.role == Role::Writer)
                .map(|l| person_name(&resolved, l.person_id).to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(writers_of(first), vec!["Lawrence Kasdan", "Leigh Brackett"]);
        assert_eq!(writers_of(second), vec!["Lawrence Kasdan"]);
        assert_eq!(resolved.persons.len(), 2);
    }

    #[test]
    fn actor_missing_from_name_table_aborts() {
        let legacy = LegacyCatalog {
            movies: vec![movie("tt1")],
            movie_actors: HashMap::from([("tt1".to_string(), vec![42])]),
            ..Default::default()
        };

        let err = resolve_catalog(&legacy).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownActor { actor_id: 42, .. }));
        assert!(err.to_string().contains("tt1"));
    }

    #[test]
    fn writer_missing_from_name_table_aborts() {
        let mut m = movie("tt1");
        m.writers = vec!["w404".into()];
        let legacy = LegacyCatalog {
            movies: vec![m],
            ..Default::default()
        };

        let err = resolve_catalog(&legacy).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownWriter { ref writer_id, .. } if writer_id == "w404"));
    }

    #[test]
    fn movie_without_actor_rows_gets_no_actor_links() {
        let legacy = LegacyCatalog {
            movies: vec![movie("tt1")],
            ..Default::default()
        };

        let resolved = resolve_catalog(&legacy).unwrap();
        assert_eq!(resolved.movies.len(), 1);
        assert!(resolved.movie_persons.is_empty());
    }

    #[test]
    fn links_only_reference_resolved_entities() {
        let mut a = movie("tt1");
        a.genre = Some("Sci-Fi, Horror".into());
        a.director = Some("Ridley Scott".into());
        a.writers = vec!["w1".into()];
        let legacy = LegacyCatalog {
            movies: vec![a],
            movie_actors: HashMap::from([("tt1".to_string(), vec![1])]),
            actor_names: HashMap::from([(1, "Sigourney Weaver".to_string())]),
            writer_names: HashMap::from([("w1".to_string(), "Dan O'Bannon".to_string())]),
        };

        let resolved = resolve_catalog(&legacy).unwrap();
        let movie_ids = resolved.movies.iter().map(|m| m.id).collect::<HashSet<_>>();
        let person_ids = resolved.persons.iter().map(|p| p.id).collect::<HashSet<_>>();
        let genre_ids = resolved.genres.iter().map(|g| g.id).collect::<HashSet<_>>();
        assert!(resolved
            .movie_persons
            .iter()
            .all(|l| movie_ids.contains(&l.movie_id) && person_ids.contains(&l.person_id)));
        assert!(resolved
            .movie_genres
            .iter()
            .all(|l| movie_ids.contains(&l.movie_id) && genre_ids.contains(&l.genre_id)));
        assert_eq!(
            resolved.counts(),
            movies_core::CatalogCounts {
                movies: 1,
                persons: 3,
                genres: 2,
                movie_persons: 3,
                movie_genres: 2,
            }
        );
    }
}
