use serde_json::Value;
use std::cmp::Ordering;
use tracing::debug;

use crate::error::FieldError;
use crate::models::{MovieRecord, Resolution, UNKNOWN};

pub fn extract_movies(items: &[Value]) -> Vec<MovieRecord> {
    let mut movies: Vec<MovieRecord> = items.iter().map(extract_movie).collect();
    sort_movies(&mut movies);
    movies
}

/// Reads every field on its own; a bad field becomes Unknown without touching the rest.
pub fn extract_movie(item: &Value) -> MovieRecord {
    let title = string_field(item, "title").unwrap_or_else(|e| {
        debug!("Movie item without usable title ({}), using {}", e, UNKNOWN);
        UNKNOWN.to_string()
    });
    let media = first_entry(item, "Media");

    MovieRecord {
        resolution: recover(
            &title,
            media.and_then(|m| string_field(m, "videoResolution")),
        )
        .map(|r| Resolution::parse(&r))
        .unwrap_or(Resolution::Unknown),
        year: recover(&title, int_field(item, "year")),
        studio: recover(&title, string_field(item, "studio")),
        content_rating: recover(&title, string_field(item, "contentRating")),
        file_path: recover(
            &title,
            media
                .and_then(|m| first_entry(m, "Part"))
                .and_then(|p| string_field(p, "file")),
        ),
        container: recover(&title, media.and_then(|m| string_field(m, "container"))),
        title,
    }
}

pub fn sort_movies(movies: &mut [MovieRecord]) {
    movies.sort_by(compare_titles);
}

fn compare_titles(a: &MovieRecord, b: &MovieRecord) -> Ordering {
    a.title
        .to_lowercase()
        .cmp(&b.title.to_lowercase())
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.year.cmp(&b.year))
}

fn recover<T>(title: &str, result: Result<T, FieldError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("'{}': {}, using {}", title, e, UNKNOWN);
            None
        }
    }
}

fn string_field(item: &Value, name: &'static str) -> Result<String, FieldError> {
    match item.get(name) {
        None | Some(Value::Null) => Err(FieldError::Missing(name)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(FieldError::Missing(name)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(FieldError::WrongType(name)),
    }
}

fn int_field(item: &Value, name: &'static str) -> Result<i32, FieldError> {
    match item.get(name) {
        None | Some(Value::Null) => Err(FieldError::Missing(name)),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or(FieldError::WrongType(name)),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| FieldError::WrongType(name)),
        Some(_) => Err(FieldError::WrongType(name)),
    }
}

fn first_entry<'a>(item: &'a Value, name: &'static str) -> Result<&'a Value, FieldError> {
    match item.get(name) {
        None | Some(Value::Null) => Err(FieldError::Missing(name)),
        Some(Value::Array(entries)) => entries.first().ok_or(FieldError::Missing(name)),
        Some(_) => Err(FieldError::WrongType(name)),
    }
}
