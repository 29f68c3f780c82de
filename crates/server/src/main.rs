use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use shared::{
    domain::{
        Collection, CourseId, FacilitatorId, PageId, ProgramId, QuestionId, StudentId, StudentRef,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        ActionOutcome, CourseUpsert, CoverPageDocument, FacilitatorSummary, FacilitatorUpsert,
        NewQuestion, PageRequest, PageResult, ProgramUpsert, StudentLookupRequest, StudentUpsert,
    },
};
use storage::Storage;
use tracing::{error, info};

mod config;

use config::{load_settings, prepare_database_url};

use server_api::ApiContext;

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    per_page: u32,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    collection: Collection,
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default)]
    search: String,
    per_page: Option<u32>,
}

fn default_page() -> u32 {
    1
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
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
        per_page: settings.per_page,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/list", get(http_list))
        .route("/api/questions", post(http_save_question))
        .route("/api/questions/:id", delete(http_delete_question))
        .route("/api/pages", post(http_save_page))
        .route("/api/pages/:id", get(http_load_page))
        .route("/api/pages/:id", delete(http_delete_page))
        .route("/api/students", post(http_create_student))
        .route("/api/students/:id", put(http_update_student))
        .route("/api/students/:id", delete(http_delete_student))
        .route("/api/students/lookup", post(http_lookup_students))
        .route("/api/programs", post(http_create_program))
        .route("/api/programs/:id", put(http_update_program))
        .route("/api/programs/:id", delete(http_delete_program))
        .route("/api/courses", post(http_create_course))
        .route("/api/courses/:id", put(http_update_course))
        .route("/api/courses/:id", delete(http_delete_course))
        .route("/api/facilitators", get(http_list_facilitators))
        .route("/api/facilitators", post(http_create_facilitator))
        .route("/api/facilitators/:id", put(http_update_facilitator))
        .route("/api/facilitators/:id", delete(http_delete_facilitator))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    match state.api.storage.health_check().await {
        Ok(()) => Ok("ok"),
        Err(error) => {
            error!(%error, "health check failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// Action endpoints answer 200 with a `{success, message}` envelope even when
/// a request is rejected; only internal failures surface as error statuses.
fn outcome_reply(
    result: Result<ActionOutcome, ApiError>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    match result {
        Ok(outcome) => Ok(Json(outcome)),
        Err(err) if matches!(err.code, ErrorCode::Validation | ErrorCode::NotFound) => {
            Ok(Json(ActionOutcome::from(err)))
        }
        Err(err) => Err((StatusCode::INTERNAL_SERVER_ERROR, Json(err))),
    }
}

fn error_status(err: &ApiError) -> StatusCode {
    match err.code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn http_list(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> Result<Json<PageResult<Value>>, (StatusCode, Json<ApiError>)> {
    let request = PageRequest {
        collection: q.collection,
        page: q.page,
        search: q.search,
        per_page: q.per_page.unwrap_or(state.per_page),
    };
    let result = server_api::paginate(&state.api, &request)
        .await
        .map_err(|e| (error_status(&e), Json(e)))?;
    Ok(Json(result))
}

async fn http_save_question(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewQuestion>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::save_question(&state.api, &req.content).await)
}

async fn http_delete_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::delete_question(&state.api, QuestionId(id)).await)
}

async fn http_save_page(
    State(state): State<Arc<AppState>>,
    Json(document): Json<CoverPageDocument>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::save_cover_page(&state.api, &document).await)
}

async fn http_load_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<CoverPageDocument>, (StatusCode, Json<ApiError>)> {
    let document = server_api::load_page(&state.api, PageId(id))
        .await
        .map_err(|e| (error_status(&e), Json(e)))?;
    Ok(Json(document))
}

async fn http_delete_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::delete_page(&state.api, PageId(id)).await)
}

async fn http_create_student(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StudentUpsert>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::create_student(&state.api, &req).await)
}

async fn http_update_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<StudentUpsert>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::update_student(&state.api, StudentId(id), &req).await)
}

async fn http_delete_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::delete_student(&state.api, StudentId(id)).await)
}

async fn http_lookup_students(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StudentLookupRequest>,
) -> Result<Json<Vec<StudentRef>>, (StatusCode, Json<ApiError>)> {
    let students = state
        .api
        .storage
        .students_by_ids(&req.ids)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new(ErrorCode::Internal, e.to_string())),
            )
        })?;
    Ok(Json(students))
}

async fn http_create_program(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProgramUpsert>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::create_program(&state.api, &req).await)
}

async fn http_update_program(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ProgramUpsert>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::update_program(&state.api, ProgramId(id), &req).await)
}

async fn http_delete_program(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::delete_program(&state.api, ProgramId(id)).await)
}

async fn http_create_course(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CourseUpsert>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::create_course(&state.api, &req).await)
}

async fn http_update_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<CourseUpsert>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::update_course(&state.api, CourseId(id), &req).await)
}

async fn http_delete_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::delete_course(&state.api, CourseId(id)).await)
}

async fn http_list_facilitators(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FacilitatorSummary>>, (StatusCode, Json<ApiError>)> {
    let facilitators = state.api.storage.list_facilitators().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok(Json(facilitators))
}

async fn http_create_facilitator(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FacilitatorUpsert>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::create_facilitator(&state.api, &req).await)
}

async fn http_update_facilitator(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<FacilitatorUpsert>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::update_facilitator(&state.api, FacilitatorId(id), &req).await)
}

async fn http_delete_facilitator(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ActionOutcome>, (StatusCode, Json<ApiError>)> {
    outcome_reply(server_api::delete_facilitator(&state.api, FacilitatorId(id)).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let program = storage
            .create_program("Clinical Medicine", "CM")
            .await
            .expect("program");
        for n in 1..=12 {
            storage
                .create_student(&format!("Student {n:02}"), &format!("CM-{n:03}"), Some(program))
                .await
                .expect("student");
        }
        let state = AppState {
            api: ApiContext { storage },
            per_page: 10,
        };
        build_router(Arc::new(state))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn listing_returns_items_and_pagination() {
        let app = test_app().await;
        let request = Request::get("/api/list?collection=students&page=2")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["pagination"]["current_page"], 2);
        assert_eq!(json["pagination"]["total_count"], 12);
        assert_eq!(json["items"].as_array().expect("items").len(), 2);
    }

    #[tokio::test]
    async fn rejected_save_still_answers_ok_with_envelope() {
        let app = test_app().await;
        let request = Request::post("/api/questions")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"content":"hi"}"#))
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Question is too short.");
    }

    #[tokio::test]
    async fn loading_missing_page_is_404() {
        let app = test_app().await;
        let request = Request::get("/api/pages/404")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn student_lookup_preserves_request_order() {
        let app = test_app().await;
        let request = Request::post("/api/students/lookup")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"ids":[3,1]}"#))
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let items = json.as_array().expect("array");
        assert_eq!(items[0]["regnumber"], "CM-003");
        assert_eq!(items[1]["regnumber"], "CM-001");
    }
}
