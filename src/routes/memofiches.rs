use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::memofiches::{CreateMemoFicheRequest, IndexReport, MemoFicheList, UpdateMemoFicheRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::MemoFiche,
    response::ApiResponse,
    routes::params::MemoFicheQuery,
    services::memofiche_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_memofiches).post(create_memofiche))
        .route(
            "/{id}",
            get(get_memofiche)
                .put(update_memofiche)
                .delete(delete_memofiche),
        )
        .route("/{id}/index", post(index_memofiche))
}

#[utoipa::path(
    get,
    path = "/api/memofiches",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("q" = Option<String>, Query, description = "Search title and patient situation"),
        ("theme" = Option<String>, Query, description = "Filter by theme"),
        ("system" = Option<String>, Query, description = "Filter by system"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc")
    ),
    responses(
        (status = 200, description = "List memo fiches", body = ApiResponse<MemoFicheList>)
    ),
    security(("bearer_auth" = [])),
    tag = "MemoFiches"
)]
pub async fn list_memofiches(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<MemoFicheQuery>,
) -> AppResult<Json<ApiResponse<MemoFicheList>>> {
    let resp = memofiche_service::list_memofiches(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/memofiches/{id}",
    params(
        ("id" = Uuid, Path, description = "Memo fiche ID")
    ),
    responses(
        (status = 200, description = "Get memo fiche", body = ApiResponse<MemoFiche>),
        (status = 403, description = "Subscription required"),
        (status = 404, description = "Memo fiche not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "MemoFiches"
)]
pub async fn get_memofiche(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MemoFiche>>> {
    let resp = memofiche_service::get_memofiche(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/memofiches",
    request_body = CreateMemoFicheRequest,
    responses(
        (status = 201, description = "Create memo fiche", body = ApiResponse<MemoFiche>),
        (status = 400, description = "Invalid memo fiche"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "MemoFiches"
)]
pub async fn create_memofiche(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateMemoFicheRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<MemoFiche>>)> {
    let resp = memofiche_service::create_memofiche(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/memofiches/{id}",
    params(
        ("id" = Uuid, Path, description = "Memo fiche ID")
    ),
    request_body = UpdateMemoFicheRequest,
    responses(
        (status = 200, description = "Updated memo fiche", body = ApiResponse<MemoFiche>),
        (status = 400, description = "Invalid memo fiche"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Memo fiche not found")
    ),
    security(("bearer_auth" = [])),
    tag = "MemoFiches"
)]
pub async fn update_memofiche(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMemoFicheRequest>,
) -> AppResult<Json<ApiResponse<MemoFiche>>> {
    let resp = memofiche_service::update_memofiche(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/memofiches/{id}",
    params(
        ("id" = Uuid, Path, description = "Memo fiche ID")
    ),
    responses(
        (status = 200, description = "Deleted memo fiche", body = ApiResponse<serde_json::Value>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Memo fiche not found")
    ),
    security(("bearer_auth" = [])),
    tag = "MemoFiches"
)]
pub async fn delete_memofiche(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = memofiche_service::delete_memofiche(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/memofiches/{id}/index",
    params(
        ("id" = Uuid, Path, description = "Memo fiche ID")
    ),
    responses(
        (status = 200, description = "Memo fiche embedded for the assistant", body = ApiResponse<IndexReport>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Memo fiche not found"),
        (status = 502, description = "AI provider error"),
        (status = 503, description = "AI provider not configured")
    ),
    security(("bearer_auth" = [])),
    tag = "MemoFiches"
)]
pub async fn index_memofiche(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<IndexReport>>> {
    let resp = memofiche_service::index_memofiche(&state, &user, id).await?;
    Ok(Json(resp))
}
