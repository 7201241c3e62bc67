use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::newsletter::{SubscribeRequest, UnsubscribeRequest},
    error::AppResult,
    models::Subscriber,
    response::ApiResponse,
    services::newsletter_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subscribe", post(subscribe))
        .route("/unsubscribe", post(unsubscribe))
}

#[utoipa::path(
    post,
    path = "/api/newsletter/subscribe",
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Subscribed", body = ApiResponse<Subscriber>),
        (status = 400, description = "Invalid email or group")
    ),
    tag = "Newsletter"
)]
pub async fn subscribe(
    State(state): State<AppState>,
    Json(payload): Json<SubscribeRequest>,
) -> AppResult<Json<ApiResponse<Subscriber>>> {
    let resp = newsletter_service::subscribe(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/newsletter/unsubscribe",
    request_body = UnsubscribeRequest,
    responses(
        (status = 200, description = "Unsubscribed", body = ApiResponse<serde_json::Value>)
    ),
    tag = "Newsletter"
)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(payload): Json<UnsubscribeRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = newsletter_service::unsubscribe(&state, payload).await?;
    Ok(Json(resp))
}
