use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::{
    dto::progress::{
        MarkMediaViewedRequest, MarkReadRequest, ProgressOverview, RecordQuizRequest, TeamProgress,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::QuizResult,
    response::ApiResponse,
    services::progress_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(my_progress))
        .route("/team", get(team_progress))
        .route("/read", post(mark_read))
        .route("/media", post(mark_media_viewed))
        .route("/quiz", post(record_quiz))
}

#[utoipa::path(
    get,
    path = "/api/progress/me",
    responses(
        (status = 200, description = "Progress of the current user", body = ApiResponse<ProgressOverview>)
    ),
    security(("bearer_auth" = [])),
    tag = "Progress"
)]
pub async fn my_progress(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<ProgressOverview>>> {
    let resp = progress_service::my_progress(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/progress/team",
    responses(
        (status = 200, description = "Progress of the pharmacist's preparateurs", body = ApiResponse<TeamProgress>),
        (status = 403, description = "Pharmacists only")
    ),
    security(("bearer_auth" = [])),
    tag = "Progress"
)]
pub async fn team_progress(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<TeamProgress>>> {
    let resp = progress_service::team_progress(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/progress/read",
    request_body = MarkReadRequest,
    responses(
        (status = 200, description = "Fiche marked as read", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Memo fiche not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Progress"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<MarkReadRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = progress_service::mark_read(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/progress/media",
    request_body = MarkMediaViewedRequest,
    responses(
        (status = 200, description = "Media marked as viewed", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Unknown media"),
        (status = 404, description = "Memo fiche not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Progress"
)]
pub async fn mark_media_viewed(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<MarkMediaViewedRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = progress_service::mark_media_viewed(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/progress/quiz",
    request_body = RecordQuizRequest,
    responses(
        (status = 200, description = "Quiz result recorded", body = ApiResponse<QuizResult>),
        (status = 400, description = "Invalid score"),
        (status = 404, description = "Memo fiche not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Progress"
)]
pub async fn record_quiz(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<RecordQuizRequest>,
) -> AppResult<Json<ApiResponse<QuizResult>>> {
    let resp = progress_service::record_quiz(&state, &user, payload).await?;
    Ok(Json(resp))
}
