//! Sentinel cleanup and writer-list flattening for legacy movie rows.

use std::collections::HashSet;

use movies_core::{dedup_preserving_order, is_empty_sentinel, LegacyMovie, LegacyWriterId, RawMovieRow};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("movie {movie_id}: malformed writers JSON: {source}")]
    MalformedWriters {
        movie_id: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct WriterRef {
    id: LegacyWriterId,
}

/// `""` and `"N/A"` become `None`; anything else is kept verbatim.
pub fn none_if_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !is_empty_sentinel(v))
}

/// Normalize both writer encodings into one flat, deduplicated id list.
///
/// The JSON column (`[{"id": ...}, ...]`) wins whenever it is present; the
/// single-id `writer` column is only consulted for rows without it. Ids listed
/// in `invalid` are dropped.
pub fn flatten_writer_ids(
    movie_id: &str,
    writer: Option<&str>,
    writers_json: Option<&str>,
    invalid: &HashSet<LegacyWriterId>,
) -> Result<Vec<LegacyWriterId>, SanitizeError> {
    let ids: Vec<LegacyWriterId> = match writers_json {
        Some(json) => serde_json::from_str::<Vec<WriterRef>>(json)
            .map_err(|source| SanitizeError::MalformedWriters {
                movie_id: movie_id.to_string(),
                source,
            })?
            .into_iter()
            .map(|w| w.id)
            .collect(),
        None => writer.map(|id| vec![id.to_string()]).unwrap_or_default(),
    };

    Ok(dedup_preserving_order(
        ids.into_iter().filter(|id| !invalid.contains(id)),
    ))
}

pub fn sanitize_movie(
    raw: RawMovieRow,
    invalid_writer_ids: &HashSet<LegacyWriterId>,
) -> Result<LegacyMovie, SanitizeError> {
    let writer = none_if_empty(raw.writer);
    let writers_json = none_if_empty(raw.writers);
    let writers = flatten_writer_ids(
        &raw.id,
        writer.as_deref(),
        writers_json.as_deref(),
        invalid_writer_ids,
    )?;

    Ok(LegacyMovie {
        id: raw.id,
        genre: none_if_empty(raw.genre),
        director: none_if_empty(raw.director),
        title: raw.title,
        plot: none_if_empty(raw.plot),
        imdb_rating: none_if_empty(raw.imdb_rating),
        writers,
    })
}
