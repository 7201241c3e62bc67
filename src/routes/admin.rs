use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch},
};
use uuid::Uuid;

use crate::{
    dto::{
        newsletter::{
            DeliveryReport, NewsletterList, SendNewsletterRequest, SubscriberList,
            UpdateGroupsRequest,
        },
        users::{UpdateRoleRequest, UpdateSubscriptionRequest, UserList},
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Subscriber, User},
    response::ApiResponse,
    routes::params::{Pagination, SubscriberQuery, UserListQuery},
    services::{newsletter_service, user_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", delete(delete_user))
        .route("/users/{id}/role", patch(update_role))
        .route("/users/{id}/subscription", patch(update_subscription))
        .route("/subscribers", get(list_subscribers))
        .route("/subscribers/{id}", delete(delete_subscriber))
        .route("/subscribers/{id}/groups", patch(update_groups))
        .route("/newsletters", get(list_newsletters).post(send_newsletter))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("role" = Option<String>, Query, description = "Filter by role"),
        ("q" = Option<String>, Query, description = "Search email and names")
    ),
    responses(
        (status = 200, description = "List users (admin only)", body = ApiResponse<UserList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<UserListQuery>,
) -> AppResult<Json<ApiResponse<UserList>>> {
    let resp = user_service::list_users(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/admin/users/{id}/role",
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Change a user's role", body = ApiResponse<User>),
        (status = 400, description = "Admins cannot demote themselves"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::update_role(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/admin/users/{id}/subscription",
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    request_body = UpdateSubscriptionRequest,
    responses(
        (status = 200, description = "Set a user's subscription", body = ApiResponse<User>),
        (status = 400, description = "Invalid subscription"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSubscriptionRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::update_subscription(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Delete a user", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Admins cannot delete themselves"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = user_service::delete_user(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/subscribers",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("group" = Option<String>, Query, description = "Filter by group")
    ),
    responses(
        (status = 200, description = "List newsletter subscribers", body = ApiResponse<SubscriberList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_subscribers(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SubscriberQuery>,
) -> AppResult<Json<ApiResponse<SubscriberList>>> {
    let resp = newsletter_service::list_subscribers(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/admin/subscribers/{id}/groups",
    params(
        ("id" = Uuid, Path, description = "Subscriber ID")
    ),
    request_body = UpdateGroupsRequest,
    responses(
        (status = 200, description = "Add or remove subscriber groups", body = ApiResponse<Subscriber>),
        (status = 400, description = "Invalid group"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_groups(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateGroupsRequest>,
) -> AppResult<Json<ApiResponse<Subscriber>>> {
    let resp = newsletter_service::update_groups(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/admin/subscribers/{id}",
    params(
        ("id" = Uuid, Path, description = "Subscriber ID")
    ),
    responses(
        (status = 200, description = "Delete a subscriber", body = ApiResponse<serde_json::Value>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_subscriber(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = newsletter_service::delete_subscriber(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/newsletters",
    request_body = SendNewsletterRequest,
    responses(
        (status = 201, description = "Newsletter sent, possibly partially", body = ApiResponse<DeliveryReport>),
        (status = 400, description = "Invalid newsletter"),
        (status = 403, description = "Forbidden"),
        (status = 503, description = "Mail provider not configured"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn send_newsletter(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<SendNewsletterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<DeliveryReport>>)> {
    let resp = newsletter_service::send_newsletter(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/admin/newsletters",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "Newsletters sent so far", body = ApiResponse<NewsletterList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_newsletters(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<NewsletterList>>> {
    let resp = newsletter_service::list_newsletters(&state, &user, pagination).await?;
    Ok(Json(resp))
}
