use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::generation::{GenerateMemoFicheRequest, MemoFicheDraft},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::generation_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/memofiche", post(generate_memofiche))
}

#[utoipa::path(
    post,
    path = "/api/generate/memofiche",
    request_body = GenerateMemoFicheRequest,
    responses(
        (status = 200, description = "Draft memo fiche, not persisted", body = ApiResponse<MemoFicheDraft>),
        (status = 400, description = "Empty or oversized source text"),
        (status = 403, description = "Forbidden"),
        (status = 502, description = "AI provider error"),
        (status = 503, description = "AI provider not configured")
    ),
    security(("bearer_auth" = [])),
    tag = "Generation"
)]
pub async fn generate_memofiche(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<GenerateMemoFicheRequest>,
) -> AppResult<Json<ApiResponse<MemoFicheDraft>>> {
    let resp = generation_service::generate(&state, &user, payload).await?;
    Ok(Json(resp))
}
