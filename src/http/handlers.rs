//! Route handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::data::{Movie, MovieInput, MovieUpdate};
use crate::http::request::X_EXPECTED_VERSION;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::notify::{self, Notification};

pub async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.config.environment.as_str(),
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

pub async fn create_movie(
    State(state): State<AppState>,
    payload: Result<Json<MovieInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(bad_body)?;
    let movie = Movie::from(input);
    movie.validate().map_err(ApiError::Validation)?;

    // Claim the notification slot first: a draining server refuses the
    // request before anything is stored.
    let task = state.tasks.register()?;
    let movie = state.movies.create(movie).await?;

    tracing::info!(id = movie.id, title = %movie.title, "Movie created");
    task.spawn(
        "notify_movie_created",
        notify::deliver(
            state.notifier.clone(),
            Notification::MovieCreated {
                id: movie.id,
                title: movie.title.clone(),
            },
            state.config.notifications.clone(),
        ),
    );

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id)) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(json!({ "movie": movie }))))
}

pub async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let movie = state.movies.read(id).await?;
    Ok(Json(json!({ "movie": movie })))
}

pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<MovieUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let asserted = expected_version(&headers)?;
    let Json(update) = payload.map_err(bad_body)?;

    let mut movie = state.movies.read(id).await?;
    let read_version = movie.version;
    update.apply(&mut movie);
    movie.validate().map_err(ApiError::Validation)?;

    let movie = state.movies.commit(read_version, movie, asserted).await?;
    tracing::info!(id, version = movie.version, "Movie updated");
    Ok(Json(json!({ "movie": movie })))
}

pub async fn not_found() -> ApiError {
    ApiError::RecordNotFound
}

pub async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method.to_string())
}

/// Record ids are positive integers; anything else names no record.
fn parse_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::RecordNotFound),
    }
}

fn expected_version(headers: &HeaderMap) -> Result<Option<u32>, ApiError> {
    let Some(value) = headers.get(X_EXPECTED_VERSION) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest("invalid X-Expected-Version header".into()))
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("42").unwrap(), 42);
        for raw in ["0", "-1", "abc", "1.5", ""] {
            assert!(matches!(parse_id(raw), Err(ApiError::RecordNotFound)), "{raw}");
        }
    }

    #[test]
    fn expected_version_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(expected_version(&headers).unwrap(), None);

        headers.insert(X_EXPECTED_VERSION, HeaderValue::from_static("5"));
        assert_eq!(expected_version(&headers).unwrap(), Some(5));

        headers.insert(X_EXPECTED_VERSION, HeaderValue::from_static("five"));
        assert!(matches!(
            expected_version(&headers),
            Err(ApiError::BadRequest(_))
        ));
    }
}
