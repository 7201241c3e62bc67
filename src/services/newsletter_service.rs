use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use sea_orm::{
    ActiveModelTrait, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::newsletter::{
        DeliveryReport, NewsletterList, SendNewsletterRequest, SubscribeRequest, SubscriberList,
        UnsubscribeRequest, UpdateGroupsRequest,
    },
    entity::{
        newsletters::{
            ActiveModel as NewsletterActive, Column as NewsletterCol, Entity as Newsletters,
            Model as NewsletterModel,
        },
        subscribers::{
            ActiveModel as SubscriberActive, Entity as Subscribers,
            Model as SubscriberModel,
        },
    },
    error::{AppError, AppResult},
    mail::Mailer,
    middleware::auth::{AuthUser, ensure_admin},
    models::{Newsletter, Subscriber},
    response::{ApiResponse, Meta},
    routes::params::{Pagination, SubscriberQuery},
    services::auth_service::normalize_email,
    state::AppState,
};

/// Deliveries in flight at once.
pub const SEND_CONCURRENCY: usize = 8;

/// Trim, lowercase and de-duplicate group names; the result is sorted.
pub fn normalize_groups(groups: &[String]) -> AppResult<Vec<String>> {
    let mut out = BTreeSet::new();
    for group in groups {
        let group = group.trim().to_lowercase();
        if group.is_empty() {
            return Err(AppError::BadRequest("group names must not be empty".into()));
        }
        out.insert(group);
    }
    Ok(out.into_iter().collect())
}

/// Apply additions then removals to `current`.
pub fn apply_group_changes(
    current: &[String],
    add: &[String],
    remove: &[String],
) -> AppResult<Vec<String>> {
    let add = normalize_groups(add)?;
    let remove = normalize_groups(remove)?;
    let mut groups: BTreeSet<String> = current.iter().cloned().collect();
    groups.extend(add);
    for group in &remove {
        groups.remove(group);
    }
    Ok(groups.into_iter().collect())
}

/// Send one message per recipient; returns the addresses that failed, sorted.
pub async fn deliver(
    mailer: &dyn Mailer,
    recipients: &[String],
    subject: &str,
    html: &str,
) -> Vec<String> {
    let mut failed: Vec<String> = stream::iter(recipients.iter().cloned())
        .map(|to: String| async move {
            match mailer.send(&to, subject, html).await {
                Ok(()) => None,
                Err(err) => {
                    tracing::warn!(recipient = %to, error = %err, "newsletter delivery failed");
                    Some(to)
                }
            }
        })
        .buffer_unordered(SEND_CONCURRENCY)
        .filter_map(|r| async move { r })
        .collect()
        .await;
    failed.sort();
    failed
}

/// Upsert on email: new groups are merged in and a past unsubscribe is cleared.
pub async fn subscribe(
    state: &AppState,
    payload: SubscribeRequest,
) -> AppResult<ApiResponse<Subscriber>> {
    payload.validate()?;
    let email = normalize_email(&payload.email);
    let groups = normalize_groups(&payload.groups)?;

    let row = sqlx::query_as::<_, SubscriberRow>(
        r#"
        INSERT INTO subscribers (id, email, groups)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET
            groups = ARRAY(
                SELECT DISTINCT g
                FROM unnest(subscribers.groups || EXCLUDED.groups) AS g
                ORDER BY g
            ),
            unsubscribed_at = NULL
        RETURNING id, email, groups, subscribed_at, unsubscribed_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(&groups)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Subscribed",
        Subscriber::from(row),
        Some(Meta::empty()),
    ))
}

/// Always succeeds so callers cannot learn which addresses are subscribed.
pub async fn unsubscribe(
    state: &AppState,
    payload: UnsubscribeRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query(
        "UPDATE subscribers SET unsubscribed_at = now() WHERE email = $1 AND unsubscribed_at IS NULL",
    )
    .bind(normalize_email(&payload.email))
    .execute(&state.pool)
    .await?;
    tracing::debug!(rows = result.rows_affected(), "unsubscribe processed");

    Ok(ApiResponse::success(
        "Unsubscribed",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriberRow {
    id: Uuid,
    email: String,
    groups: Vec<String>,
    subscribed_at: DateTime<Utc>,
    unsubscribed_at: Option<DateTime<Utc>>,
}

impl From<SubscriberRow> for Subscriber {
    fn from(row: SubscriberRow) -> Self {
        Subscriber {
            id: row.id,
            email: row.email,
            groups: row.groups,
            subscribed_at: row.subscribed_at,
            unsubscribed_at: row.unsubscribed_at,
        }
    }
}

pub async fn list_subscribers(
    state: &AppState,
    user: &AuthUser,
    query: SubscriberQuery,
) -> AppResult<ApiResponse<SubscriberList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();
    let group = query
        .group
        .as_deref()
        .map(|g| g.trim().to_lowercase())
        .filter(|g| !g.is_empty());

    let rows = sqlx::query_as::<_, SubscriberRow>(
        r#"
        SELECT id, email, groups, subscribed_at, unsubscribed_at
        FROM subscribers
        WHERE ($1::text IS NULL OR $1 = ANY(groups))
        ORDER BY subscribed_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(group.as_deref())
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM subscribers WHERE ($1::text IS NULL OR $1 = ANY(groups))",
    )
    .bind(group.as_deref())
    .fetch_one(&state.pool)
    .await?;

    let items = rows.into_iter().map(Subscriber::from).collect();

    Ok(ApiResponse::success(
        "Subscribers",
        SubscriberList { items },
        Some(Meta::new(page, limit, total.0)),
    ))
}

pub async fn update_groups(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateGroupsRequest,
) -> AppResult<ApiResponse<Subscriber>> {
    ensure_admin(user)?;
    let existing = Subscribers::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let groups = apply_group_changes(&existing.groups, &payload.add, &payload.remove)?;
    let mut active: SubscriberActive = existing.into();
    active.groups = Set(groups);
    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "subscriber_groups_update",
        "subscribers",
        serde_json::json!({ "subscriber_id": id, "groups": updated.groups }),
    )
    .await;

    Ok(ApiResponse::success(
        "Groups updated",
        subscriber_from_entity(updated),
        Some(Meta::empty()),
    ))
}

pub async fn delete_subscriber(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Subscribers::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "subscriber_delete",
        "subscribers",
        serde_json::json!({ "subscriber_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Active subscribers in any of `groups`, or all active subscribers.
pub async fn resolve_recipients(state: &AppState, groups: &[String]) -> AppResult<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT email FROM subscribers
        WHERE unsubscribed_at IS NULL
          AND (cardinality($1::text[]) = 0 OR groups && $1::text[])
        ORDER BY email
        "#,
    )
    .bind(groups)
    .fetch_all(&state.pool)
    .await?;
    Ok(rows.into_iter().map(|(email,)| email).collect())
}

pub async fn send_newsletter(
    state: &AppState,
    user: &AuthUser,
    payload: SendNewsletterRequest,
) -> AppResult<ApiResponse<DeliveryReport>> {
    ensure_admin(user)?;
    payload.validate()?;
    let mailer = state.mailer()?;
    let groups = normalize_groups(&payload.groups)?;

    let recipients = resolve_recipients(state, &groups).await?;
    if recipients.is_empty() {
        return Err(AppError::BadRequest("no active subscribers match these groups".into()));
    }

    tracing::info!(recipients = recipients.len(), groups = ?groups, "sending newsletter");
    let failed = deliver(mailer, &recipients, &payload.subject, &payload.html_content).await;
    let sent = recipients.len() - failed.len();

    let newsletter = NewsletterActive {
        id: Set(Uuid::new_v4()),
        subject: Set(payload.subject),
        html_content: Set(payload.html_content),
        target_groups: Set(groups),
        sent_count: Set(sent as i32),
        failed_count: Set(failed.len() as i32),
        failed_recipients: Set(failed.clone()),
        sent_by: Set(Some(user.user_id)),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "newsletter_send",
        "newsletters",
        serde_json::json!({
            "newsletter_id": newsletter.id,
            "sent": sent,
            "failed": failed.len(),
        }),
    )
    .await;

    let message = if failed.is_empty() {
        "Newsletter sent"
    } else if sent == 0 {
        "Newsletter delivery failed"
    } else {
        "Newsletter partially sent"
    };

    Ok(ApiResponse::success(
        message,
        DeliveryReport {
            newsletter_id: newsletter.id,
            recipients: recipients.len(),
            sent,
            failed,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_newsletters(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<NewsletterList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Newsletters::find().order_by_desc(NewsletterCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(newsletter_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Newsletters",
        NewsletterList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

fn subscriber_from_entity(model: SubscriberModel) -> Subscriber {
    Subscriber {
        id: model.id,
        email: model.email,
        groups: model.groups,
        subscribed_at: model.subscribed_at.with_timezone(&Utc),
        unsubscribed_at: model.unsubscribed_at.map(|dt| dt.with_timezone(&Utc)),
    }
}

fn newsletter_from_entity(model: NewsletterModel) -> Newsletter {
    Newsletter {
        id: model.id,
        subject: model.subject,
        html_content: model.html_content,
        target_groups: model.target_groups,
        sent_count: model.sent_count,
        failed_count: model.failed_count,
        failed_recipients: model.failed_recipients,
        sent_by: model.sent_by,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
