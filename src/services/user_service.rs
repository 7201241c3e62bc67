use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::users::{
        ChangePasswordRequest, UpdateProfileRequest, UpdateRoleRequest,
        UpdateSubscriptionRequest, UserList, UserProfile,
    },
    entity::users::{
        ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Role, User},
    response::{ApiResponse, Meta},
    routes::params::UserListQuery,
    services::auth_service::{hash_password, normalize_email, verify_password},
    state::AppState,
};

pub async fn load_user(state: &AppState, id: Uuid) -> AppResult<User> {
    let model = Users::find_by_id(id).one(&state.orm).await?;
    match model {
        Some(m) => user_from_entity(m),
        None => Err(AppError::NotFound),
    }
}

/// Find the pharmacist a préparateur attaches to, by email.
pub async fn resolve_pharmacist(state: &AppState, email: &str) -> AppResult<Uuid> {
    let pharmacist = Users::find()
        .filter(UserCol::Email.eq(normalize_email(email)))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("referent pharmacist not found".into()))?;
    if pharmacist.role != Role::Pharmacien.as_str() {
        return Err(AppError::BadRequest(
            "referent must have the pharmacien role".into(),
        ));
    }
    Ok(pharmacist.id)
}

/// Whether `user` may open paid fiches and use the assistant.
///
/// Préparateurs inherit access from their referent pharmacist.
pub async fn has_access(state: &AppState, user: &User) -> AppResult<bool> {
    let now = Utc::now();
    match user.role {
        Role::Admin | Role::Formateur => Ok(true),
        Role::Pharmacien => Ok(user.subscription_active_at(now)),
        Role::Preparateur => match user.pharmacist_id {
            Some(pharmacist_id) => {
                let pharmacist = Users::find_by_id(pharmacist_id).one(&state.orm).await?;
                match pharmacist {
                    Some(p) => Ok(user_from_entity(p)?.subscription_active_at(now)),
                    None => Ok(false),
                }
            }
            None => Ok(false),
        },
    }
}

pub async fn has_access_by_id(state: &AppState, auth: &AuthUser) -> AppResult<bool> {
    if auth.role.is_staff() {
        return Ok(true);
    }
    let user = load_user(state, auth.user_id).await?;
    has_access(state, &user).await
}

pub async fn get_profile(state: &AppState, auth: &AuthUser) -> AppResult<ApiResponse<UserProfile>> {
    let user = load_user(state, auth.user_id).await?;
    let has_access = has_access(state, &user).await?;
    Ok(ApiResponse::success(
        "Profile",
        UserProfile { user, has_access },
        Some(Meta::empty()),
    ))
}

pub async fn update_profile(
    state: &AppState,
    auth: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<UserProfile>> {
    payload.validate()?;
    let existing = Users::find_by_id(auth.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let is_preparateur = existing.role == Role::Preparateur.as_str();
    let mut active: UserActive = existing.into();
    if let Some(first_name) = payload.first_name {
        active.first_name = Set(first_name.trim().to_string());
    }
    if let Some(last_name) = payload.last_name {
        active.last_name = Set(last_name.trim().to_string());
    }
    if let Some(email) = payload.pharmacist_email {
        if !is_preparateur {
            return Err(AppError::BadRequest(
                "only preparateurs can name a referent pharmacist".into(),
            ));
        }
        active.pharmacist_id = Set(Some(resolve_pharmacist(state, &email).await?));
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    let user = user_from_entity(updated)?;
    let has_access = has_access(state, &user).await?;
    Ok(ApiResponse::success(
        "Profile updated",
        UserProfile { user, has_access },
        Some(Meta::empty()),
    ))
}

pub async fn change_password(
    state: &AppState,
    auth: &AuthUser,
    payload: ChangePasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    payload.validate()?;
    let existing = Users::find_by_id(auth.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if !verify_password(&payload.current_password, &existing.password_hash)? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }

    let mut active: UserActive = existing.into();
    active.password_hash = Set(hash_password(&payload.new_password)?);
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(auth.user_id),
        "password_change",
        "users",
        serde_json::json!({ "user_id": auth.user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Password changed",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_users(
    state: &AppState,
    auth: &AuthUser,
    query: UserListQuery,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(auth)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(role) = query.role {
        condition = condition.add(UserCol::Role.eq(role.as_str()));
    }
    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(UserCol::Email).ilike(pattern.clone()))
                .add(Expr::col(UserCol::FirstName).ilike(pattern.clone()))
                .add(Expr::col(UserCol::LastName).ilike(pattern)),
        );
    }

    let finder = Users::find()
        .filter(condition)
        .order_by_desc(UserCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(user_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn update_role(
    state: &AppState,
    auth: &AuthUser,
    id: Uuid,
    payload: UpdateRoleRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(auth)?;
    if id == auth.user_id && payload.role != Role::Admin {
        return Err(AppError::BadRequest("admins cannot demote themselves".into()));
    }
    let existing = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: UserActive = existing.into();
    active.role = Set(payload.role.as_str().to_string());
    if payload.role != Role::Preparateur {
        active.pharmacist_id = Set(None);
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(auth.user_id),
        "user_role_update",
        "users",
        serde_json::json!({ "user_id": id, "role": payload.role }),
    )
    .await;

    Ok(ApiResponse::success(
        "Role updated",
        user_from_entity(updated)?,
        Some(Meta::empty()),
    ))
}

pub async fn update_subscription(
    state: &AppState,
    auth: &AuthUser,
    id: Uuid,
    payload: UpdateSubscriptionRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(auth)?;
    let existing = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: UserActive = existing.into();
    active.subscription_status = Set(payload.status.as_str().to_string());
    active.subscription_end_date = Set(payload.end_date.map(Into::into));
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(auth.user_id),
        "subscription_update",
        "users",
        serde_json::json!({
            "user_id": id,
            "status": payload.status,
            "end_date": payload.end_date,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Subscription updated",
        user_from_entity(updated)?,
        Some(Meta::empty()),
    ))
}

pub async fn delete_user(
    state: &AppState,
    auth: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(auth)?;
    if id == auth.user_id {
        return Err(AppError::BadRequest("admins cannot delete themselves".into()));
    }
    let result = Users::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(auth.user_id),
        "user_delete",
        "users",
        serde_json::json!({ "user_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub(crate) fn user_from_entity(model: UserModel) -> AppResult<User> {
    let role = model
        .role
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;
    let subscription_status = model
        .subscription_status
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;
    Ok(User {
        id: model.id,
        email: model.email,
        password_hash: model.password_hash,
        first_name: model.first_name,
        last_name: model.last_name,
        role,
        pharmacist_id: model.pharmacist_id,
        subscription_status,
        subscription_end_date: model.subscription_end_date.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}
