use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    middleware,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use server_api::{
    add_attachment, create_chapter, create_course, delete_attachment, get_course,
    reorder_chapters, update_course, ApiContext,
};
use shared::{
    domain::{Attachment, AttachmentId, Chapter, Course, CourseId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        CourseDetail, CreateAttachmentRequest, CreateChapterRequest, CreateCourseRequest,
        ReorderChaptersRequest, UpdateCourseRequest,
    },
};
use storage::Storage;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;

use auth::require_caller;
use config::{load_settings, normalize_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext { storage },
    };
    let app = build_router(Arc::new(state), settings.max_body_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
    info!("shutdown requested");
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    let courses = Router::new()
        .route("/courses", post(http_create_course))
        .route(
            "/courses/:course_id",
            get(http_get_course).patch(http_update_course),
        )
        .route("/courses/:course_id/chapters", post(http_create_chapter))
        .route(
            "/courses/:course_id/chapters/reorder",
            put(http_reorder_chapters),
        )
        .route("/courses/:course_id/attachments", post(http_add_attachment))
        .route(
            "/courses/:course_id/attachments/:attachment_id",
            delete(http_delete_attachment),
        )
        .route_layer(middleware::from_fn(require_caller));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(courses)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::InvalidPayload => StatusCode::BAD_REQUEST,
        ErrorCode::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> HttpError {
    (status_for(err.code), Json(err))
}

fn path_param<T>(path: Result<Path<T>, PathRejection>) -> Result<T, HttpError> {
    path
        .map(|Path(value)| value)
        .map_err(|rejection| reject(ApiError::invalid_payload(rejection.body_text())))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, HttpError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| reject(ApiError::invalid_payload(rejection.body_text())))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.api.storage.health_check().await.map_err(|error| {
        error!(%error, "health check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::storage("storage unavailable")),
        )
    })?;
    Ok("ok")
}

async fn http_create_course(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    payload: Result<Json<CreateCourseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Course>), HttpError> {
    let req = json_body(payload)?;
    let course = create_course(&state.api, &user_id, &req.title)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn http_get_course(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    course_id: Result<Path<CourseId>, PathRejection>,
) -> Result<Json<CourseDetail>, HttpError> {
    let course_id = path_param(course_id)?;
    get_course(&state.api, &user_id, course_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_course(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    course_id: Result<Path<CourseId>, PathRejection>,
    payload: Result<Json<UpdateCourseRequest>, JsonRejection>,
) -> Result<Json<Course>, HttpError> {
    let course_id = path_param(course_id)?;
    let patch = json_body(payload)?;
    update_course(&state.api, &user_id, course_id, patch)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_chapter(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    course_id: Result<Path<CourseId>, PathRejection>,
    payload: Result<Json<CreateChapterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Chapter>), HttpError> {
    let course_id = path_param(course_id)?;
    let req = json_body(payload)?;
    let chapter = create_chapter(&state.api, &user_id, course_id, &req.title)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(chapter)))
}

async fn http_reorder_chapters(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    course_id: Result<Path<CourseId>, PathRejection>,
    payload: Result<Json<ReorderChaptersRequest>, JsonRejection>,
) -> Result<StatusCode, HttpError> {
    let course_id = path_param(course_id)?;
    let req = json_body(payload)?;
    reorder_chapters(&state.api, &user_id, course_id, &req.list)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_add_attachment(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    course_id: Result<Path<CourseId>, PathRejection>,
    payload: Result<Json<CreateAttachmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Attachment>), HttpError> {
    let course_id = path_param(course_id)?;
    let req = json_body(payload)?;
    let attachment = add_attachment(&state.api, &user_id, course_id, &req.url)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

async fn http_delete_attachment(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    ids: Result<Path<(CourseId, AttachmentId)>, PathRejection>,
) -> Result<StatusCode, HttpError> {
    let (course_id, attachment_id) = path_param(ids)?;
    delete_attachment(&state.api, &user_id, course_id, attachment_id)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
