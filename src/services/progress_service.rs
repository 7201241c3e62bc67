use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::{
    dto::progress::{
        MarkMediaViewedRequest, MarkReadRequest, ProgressOverview, RecordQuizRequest,
        TeamMemberProgress, TeamProgress,
    },
    entity::{
        fiche_reads::{Column as ReadCol, Entity as FicheReads},
        media_views::{Column as MediaCol, Entity as MediaViews},
        quiz_results::{
            ActiveModel as QuizActive, Column as QuizCol, Entity as QuizResults,
            Model as QuizModel,
        },
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_role},
    models::{MediaView, QuizResult, Role},
    response::{ApiResponse, Meta},
    services::memofiche_service::find_memofiche,
    state::AppState,
};

/// Mean of `score / total` as a percentage, rounded to one decimal.
pub fn average_percentage<I>(results: I) -> Option<f64>
where
    I: IntoIterator<Item = (i32, i32)>,
{
    let mut sum = 0.0;
    let mut count = 0usize;
    for (score, total) in results {
        if total > 0 {
            sum += f64::from(score) / f64::from(total);
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    Some((sum / count as f64 * 1000.0).round() / 10.0)
}

pub fn validate_quiz_score(score: i32, total: i32) -> AppResult<()> {
    if total <= 0 {
        return Err(AppError::BadRequest("total must be greater than 0".into()));
    }
    if score < 0 || score > total {
        return Err(AppError::BadRequest(
            "score must be between 0 and total".into(),
        ));
    }
    Ok(())
}

pub async fn mark_read(
    state: &AppState,
    user: &AuthUser,
    payload: MarkReadRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    find_memofiche(state, payload.memofiche_id).await?;

    sqlx::query(
        r#"
        INSERT INTO fiche_reads (user_id, memofiche_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, memofiche_id) DO NOTHING
        "#,
    )
    .bind(user.user_id)
    .bind(payload.memofiche_id)
    .execute(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Marked as read",
        serde_json::json!({ "memofiche_id": payload.memofiche_id }),
        Some(Meta::empty()),
    ))
}

pub async fn mark_media_viewed(
    state: &AppState,
    user: &AuthUser,
    payload: MarkMediaViewedRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let fiche = find_memofiche(state, payload.memofiche_id).await?;
    if !fiche.media.iter().any(|m| m.id == payload.media_id) {
        return Err(AppError::BadRequest("media not found in memo fiche".into()));
    }

    sqlx::query(
        r#"
        INSERT INTO media_views (user_id, memofiche_id, media_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, memofiche_id, media_id) DO NOTHING
        "#,
    )
    .bind(user.user_id)
    .bind(payload.memofiche_id)
    .bind(&payload.media_id)
    .execute(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Media viewed",
        serde_json::json!({
            "memofiche_id": payload.memofiche_id,
            "media_id": payload.media_id,
        }),
        Some(Meta::empty()),
    ))
}

pub async fn record_quiz(
    state: &AppState,
    user: &AuthUser,
    payload: RecordQuizRequest,
) -> AppResult<ApiResponse<QuizResult>> {
    validate_quiz_score(payload.score, payload.total)?;
    find_memofiche(state, payload.memofiche_id).await?;

    let result = QuizActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        memofiche_id: Set(payload.memofiche_id),
        score: Set(payload.score),
        total: Set(payload.total),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    tracing::debug!(user_id = %user.user_id, memofiche_id = %result.memofiche_id, "quiz recorded");

    Ok(ApiResponse::success(
        "Quiz recorded",
        quiz_from_entity(result),
        Some(Meta::empty()),
    ))
}

pub async fn my_progress(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<ProgressOverview>> {
    let read_fiche_ids = FicheReads::find()
        .filter(ReadCol::UserId.eq(user.user_id))
        .order_by_desc(ReadCol::ReadAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|r| r.memofiche_id)
        .collect();

    let viewed_media = MediaViews::find()
        .filter(MediaCol::UserId.eq(user.user_id))
        .order_by_desc(MediaCol::ViewedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|m| MediaView {
            memofiche_id: m.memofiche_id,
            media_id: m.media_id,
            viewed_at: m.viewed_at.with_timezone(&Utc),
        })
        .collect();

    let quiz_history: Vec<QuizResult> = QuizResults::find()
        .filter(QuizCol::UserId.eq(user.user_id))
        .order_by_desc(QuizCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(quiz_from_entity)
        .collect();

    let average_score = average_percentage(quiz_history.iter().map(|q| (q.score, q.total)));

    Ok(ApiResponse::success(
        "Progress",
        ProgressOverview {
            read_fiche_ids,
            viewed_media,
            quiz_history,
            average_score,
        },
        Some(Meta::empty()),
    ))
}

/// Progress of every préparateur attached to the calling pharmacist.
pub async fn team_progress(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<TeamProgress>> {
    ensure_role(user, Role::Pharmacien)?;

    let members = Users::find()
        .filter(UserCol::PharmacistId.eq(user.user_id))
        .filter(UserCol::Role.eq(Role::Preparateur.as_str()))
        .order_by_asc(UserCol::LastName)
        .all(&state.orm)
        .await?;

    let mut items = Vec::with_capacity(members.len());
    for member in members {
        let (fiches_read,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM fiche_reads WHERE user_id = $1")
                .bind(member.id)
                .fetch_one(&state.pool)
                .await?;
        let quizzes: Vec<(i32, i32)> =
            sqlx::query_as("SELECT score, total FROM quiz_results WHERE user_id = $1")
                .bind(member.id)
                .fetch_all(&state.pool)
                .await?;

        items.push(TeamMemberProgress {
            user_id: member.id,
            email: member.email,
            first_name: member.first_name,
            last_name: member.last_name,
            fiches_read,
            quizzes_taken: quizzes.len() as i64,
            average_score: average_percentage(quizzes),
        });
    }

    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Team progress",
        TeamProgress { items },
        Some(Meta::new(1, total, total)),
    ))
}

fn quiz_from_entity(model: QuizModel) -> QuizResult {
    QuizResult {
        id: model.id,
        user_id: model.user_id,
        memofiche_id: model.memofiche_id,
        score: model.score,
        total: model.total,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
