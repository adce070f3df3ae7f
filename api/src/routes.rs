/// HTTP route handlers for ytm4a.
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use ytm4a_shared::errors::RelayError;
use ytm4a_shared::feed::progress_feed;
use ytm4a_shared::handoff;
use ytm4a_shared::registry::RegistryStats;

use crate::AppState;

// ====== REQUEST / RESPONSE TYPES ======

#[derive(Deserialize)]
pub struct StartForm {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Serialize)]
pub struct StartResponse {
    pub job_id: String,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/start", post(start))
        .route("/events/:job_id", get(events))
        .route("/file/:job_id", get(download_file))
        .route("/api/stats", get(stats))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ====== PAGE ======

/// GET / - Submission page
pub async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

// ====== JOB ROUTES ======

/// POST /start - Submit a locator and get a job id back immediately
pub async fn start(
    State(state): State<Arc<AppState>>,
    Form(form): Form<StartForm>,
) -> Result<Json<StartResponse>, (StatusCode, Json<ErrorBody>)> {
    let url = form.url.unwrap_or_default();

    match state.jobs.submit(&url).await {
        Ok(job_id) => Ok(Json(StartResponse { job_id })),
        Err(RelayError::Validation(message)) => {
            Err((StatusCode::BAD_REQUEST, Json(ErrorBody { error: message })))
        }
        Err(e) => {
            warn!("Failed to submit job: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody { error: format!("Failed to start: {}", e) }),
            ))
        }
    }
}

/// GET /events/:job_id - Server-sent progress snapshots until the job ends
pub async fn events(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("Progress stream opened for job {}", job_id);
    let feed = progress_feed(state.jobs.registry().clone(), job_id, state.poll_interval);
    let stream = feed.filter_map(|snapshot| sse_event(snapshot.to_json()).map(Ok::<_, Infallible>));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Wrap a rendered snapshot as an SSE message. A payload that failed to render
/// is logged and skipped; the next change is sent as usual.
fn sse_event<E: std::fmt::Display>(payload: Result<String, E>) -> Option<Event> {
    match payload {
        Ok(json) => Some(Event::default().data(json)),
        Err(e) => {
            warn!("Skipping progress event that failed to serialize: {}", e);
            None
        }
    }
}

/// GET /file/:job_id - Hand the finished artifact over once, then delete it
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let artifact = handoff::claim(state.jobs.registry(), &job_id)
        .await
        .map_err(|e| {
            debug!("Handoff refused: {}", e);
            StatusCode::NOT_FOUND
        })?;

    let file = match tokio::fs::File::open(&artifact.path).await {
        Ok(file) => file,
        Err(e) => {
            warn!("Cannot open artifact {:?}: {}", artifact.path, e);
            artifact.guard.disarm().await;
            return Err(StatusCode::NOT_FOUND);
        }
    };

    let content_type = artifact.content_type();
    let disposition = content_disposition(&artifact.download_name);
    debug!("Handing off job {} as {:?}", artifact.job_id, artifact.download_name);

    // The guard travels with the body and fires once it is sent or dropped.
    let guard = artifact.guard;
    let mut chunks = ReaderStream::new(file);
    let body = async_stream::stream! {
        let _guard = guard;
        while let Some(chunk) = chunks.next().await {
            yield chunk;
        }
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(body),
    ))
}

/// `attachment` disposition with an ASCII fallback and the UTF-8 name.
pub fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}

// ====== STATS ======

/// GET /api/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<RegistryStats> {
    Json(state.jobs.registry().stats().await)
}
