use std::collections::HashSet;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    ai::{AiClient, with_retries},
    audit,
    dto::memofiches::{CreateMemoFicheRequest, IndexReport, MemoFicheList, UpdateMemoFicheRequest},
    entity::{
        memofiche_chunks::{ActiveModel as ChunkActive, Column as ChunkCol, Entity as Chunks},
        memofiches::{
            ActiveModel as FicheActive, Column as FicheCol, Entity as MemoFiches,
            Model as FicheModel,
        },
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin, ensure_staff},
    models::{MediaLink, MemoFiche, MemoFicheContent, MemoFicheSummary},
    response::{ApiResponse, Meta},
    retrieval::{MAX_CHUNK_CHARS, chunk_text, render_fiche_text},
    routes::params::{MemoFicheQuery, SortOrder},
    services::user_service::has_access_by_id,
    state::AppState,
};

/// Problems that make a fiche body unpublishable; empty when valid.
pub fn content_problems(content: &MemoFicheContent) -> Vec<String> {
    let mut problems = Vec::new();
    if content.title.trim().is_empty() {
        problems.push("title must not be empty".to_string());
    }
    if content.patient_situation.trim().is_empty() {
        problems.push("patient_situation must not be empty".to_string());
    }
    for (i, q) in content.quiz.iter().enumerate() {
        if q.question.trim().is_empty() {
            problems.push(format!("quiz[{i}] has an empty question"));
        }
        if q.options.len() < 2 {
            problems.push(format!("quiz[{i}] needs at least two options"));
        }
        if q.correct_answer_index >= q.options.len() {
            problems.push(format!(
                "quiz[{i}] correct_answer_index {} is out of range",
                q.correct_answer_index
            ));
        }
    }
    for (i, card) in content.flashcards.iter().enumerate() {
        if card.question.trim().is_empty() || card.answer.trim().is_empty() {
            problems.push(format!("flashcards[{i}] needs a question and an answer"));
        }
    }
    problems
}

pub fn media_problems(media: &[MediaLink]) -> Vec<String> {
    let mut problems = Vec::new();
    let mut seen = HashSet::new();
    for m in media {
        if m.id.trim().is_empty() {
            problems.push("media id must not be empty".to_string());
        } else if !seen.insert(m.id.as_str()) {
            problems.push(format!("duplicate media id {}", m.id));
        }
        if m.url.trim().is_empty() {
            problems.push(format!("media {} has no url", m.id));
        }
    }
    problems
}

fn ensure_valid(content: &MemoFicheContent, media: &[MediaLink]) -> AppResult<()> {
    let mut problems = content_problems(content);
    problems.extend(media_problems(media));
    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::BadRequest(problems.join("; ")))
    }
}

pub async fn list_memofiches(
    state: &AppState,
    query: MemoFicheQuery,
) -> AppResult<ApiResponse<MemoFicheList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(FicheCol::Title).ilike(pattern.clone()))
                .add(Expr::col(FicheCol::PatientSituation).ilike(pattern)),
        );
    }
    if let Some(theme) = query.theme.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(FicheCol::Theme.eq(theme.clone()));
    }
    if let Some(system) = query.system.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(FicheCol::System.eq(system.clone()));
    }

    let mut finder = MemoFiches::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(FicheCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(FicheCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(summary_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Memo fiches", MemoFicheList { items }, Some(meta)))
}

pub async fn find_memofiche(state: &AppState, id: Uuid) -> AppResult<MemoFiche> {
    let model = MemoFiches::find_by_id(id).one(&state.orm).await?;
    match model {
        Some(m) => fiche_from_entity(m),
        None => Err(AppError::NotFound),
    }
}

/// Load a fiche the caller is allowed to read in full.
pub async fn readable_memofiche(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<MemoFiche> {
    let fiche = find_memofiche(state, id).await?;
    if !fiche.is_free && !has_access_by_id(state, user).await? {
        return Err(AppError::Forbidden);
    }
    Ok(fiche)
}

pub async fn get_memofiche(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<MemoFiche>> {
    let fiche = readable_memofiche(state, user, id).await?;
    Ok(ApiResponse::success("Memo fiche", fiche, None))
}

pub async fn create_memofiche(
    state: &AppState,
    user: &AuthUser,
    payload: CreateMemoFicheRequest,
) -> AppResult<ApiResponse<MemoFiche>> {
    ensure_staff(user)?;
    ensure_valid(&payload.content, &payload.media)?;

    let CreateMemoFicheRequest {
        content,
        theme,
        system,
        kind,
        media,
        is_free,
    } = payload;
    let now = Utc::now();
    let active = FicheActive {
        id: Set(Uuid::new_v4()),
        title: Set(content.title.trim().to_string()),
        theme: Set(theme.trim().to_string()),
        system: Set(system.trim().to_string()),
        kind: Set(kind.trim().to_string()),
        patient_situation: Set(content.patient_situation),
        key_questions: Set(to_json(&content.key_questions)?),
        red_flags: Set(to_json(&content.red_flags)?),
        recommendations: Set(to_json(&content.recommendations)?),
        flashcards: Set(to_json(&content.flashcards)?),
        glossary: Set(to_json(&content.glossary)?),
        quiz: Set(to_json(&content.quiz)?),
        media: Set(to_json(&media)?),
        is_free: Set(is_free),
        created_by: Set(Some(user.user_id)),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    let fiche = active.insert(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "memofiche_create",
        "memofiches",
        serde_json::json!({ "memofiche_id": fiche.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Memo fiche created",
        fiche_from_entity(fiche)?,
        Some(Meta::empty()),
    ))
}

pub async fn update_memofiche(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateMemoFicheRequest,
) -> AppResult<ApiResponse<MemoFiche>> {
    ensure_staff(user)?;
    let existing = MemoFiches::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    // Validate the merged result, not just the patch.
    let mut merged = fiche_from_entity(existing.clone())?;
    let UpdateMemoFicheRequest {
        title,
        theme,
        system,
        kind,
        patient_situation,
        key_questions,
        red_flags,
        recommendations,
        flashcards,
        glossary,
        quiz,
        media,
        is_free,
    } = payload;
    if let Some(title) = title {
        merged.content.title = title.trim().to_string();
    }
    if let Some(theme) = theme {
        merged.theme = theme.trim().to_string();
    }
    if let Some(system) = system {
        merged.system = system.trim().to_string();
    }
    if let Some(kind) = kind {
        merged.kind = kind.trim().to_string();
    }
    if let Some(situation) = patient_situation {
        merged.content.patient_situation = situation;
    }
    if let Some(v) = key_questions {
        merged.content.key_questions = v;
    }
    if let Some(v) = red_flags {
        merged.content.red_flags = v;
    }
    if let Some(v) = recommendations {
        merged.content.recommendations = v;
    }
    if let Some(v) = flashcards {
        merged.content.flashcards = v;
    }
    if let Some(v) = glossary {
        merged.content.glossary = v;
    }
    if let Some(v) = quiz {
        merged.content.quiz = v;
    }
    if let Some(v) = media {
        merged.media = v;
    }
    if let Some(v) = is_free {
        merged.is_free = v;
    }
    ensure_valid(&merged.content, &merged.media)?;

    let mut active: FicheActive = existing.into();
    active.title = Set(merged.content.title);
    active.theme = Set(merged.theme);
    active.system = Set(merged.system);
    active.kind = Set(merged.kind);
    active.patient_situation = Set(merged.content.patient_situation);
    active.key_questions = Set(to_json(&merged.content.key_questions)?);
    active.red_flags = Set(to_json(&merged.content.red_flags)?);
    active.recommendations = Set(to_json(&merged.content.recommendations)?);
    active.flashcards = Set(to_json(&merged.content.flashcards)?);
    active.glossary = Set(to_json(&merged.content.glossary)?);
    active.quiz = Set(to_json(&merged.content.quiz)?);
    active.media = Set(to_json(&merged.media)?);
    active.is_free = Set(merged.is_free);
    active.updated_at = Set(Utc::now().into());
    let fiche = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "memofiche_update",
        "memofiches",
        serde_json::json!({ "memofiche_id": fiche.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        fiche_from_entity(fiche)?,
        Some(Meta::empty()),
    ))
}

pub async fn delete_memofiche(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = MemoFiches::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "memofiche_delete",
        "memofiches",
        serde_json::json!({ "memofiche_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Re-embed a fiche for the assistant, replacing its previous chunks.
pub async fn index_memofiche(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<IndexReport>> {
    ensure_staff(user)?;
    let fiche = find_memofiche(state, id).await?;
    let chunks = chunk_text(&render_fiche_text(&fiche), MAX_CHUNK_CHARS);
    let embeddings = embed_chunks(state.ai()?, state, &chunks).await?;

    let txn = state.orm.begin().await?;
    Chunks::delete_many()
        .filter(ChunkCol::MemoficheId.eq(id))
        .exec(&txn)
        .await?;
    let now = Utc::now();
    for (position, (content, embedding)) in chunks.iter().zip(embeddings).enumerate() {
        ChunkActive {
            id: Set(Uuid::new_v4()),
            memofiche_id: Set(id),
            position: Set(position as i32),
            content: Set(content.clone()),
            embedding: Set(to_json(&embedding)?),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;
    }
    txn.commit().await?;

    tracing::info!(memofiche_id = %id, chunks = chunks.len(), "memo fiche indexed");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "memofiche_index",
        "memofiche_chunks",
        serde_json::json!({ "memofiche_id": id, "chunks": chunks.len() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Indexed",
        IndexReport {
            memofiche_id: id,
            chunks: chunks.len(),
        },
        Some(Meta::empty()),
    ))
}

async fn embed_chunks(
    ai: &dyn AiClient,
    state: &AppState,
    chunks: &[String],
) -> AppResult<Vec<Vec<f32>>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }
    let embeddings = with_retries(state.ai_retry, |_| ai.embed(chunks)).await?;
    Ok(embeddings)
}

fn to_json<T: Serialize>(value: &T) -> AppResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.into()))
}

fn from_json<T: DeserializeOwned>(value: serde_json::Value, field: &str) -> AppResult<T> {
    serde_json::from_value(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt memo fiche {field}: {e}")))
}

pub(crate) fn fiche_from_entity(model: FicheModel) -> AppResult<MemoFiche> {
    Ok(MemoFiche {
        id: model.id,
        theme: model.theme,
        system: model.system,
        kind: model.kind,
        content: MemoFicheContent {
            title: model.title,
            patient_situation: model.patient_situation,
            key_questions: from_json(model.key_questions, "key_questions")?,
            red_flags: from_json(model.red_flags, "red_flags")?,
            recommendations: from_json(model.recommendations, "recommendations")?,
            flashcards: from_json(model.flashcards, "flashcards")?,
            glossary: from_json(model.glossary, "glossary")?,
            quiz: from_json(model.quiz, "quiz")?,
        },
        media: from_json(model.media, "media")?,
        is_free: model.is_free,
        created_by: model.created_by,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn summary_from_entity(model: FicheModel) -> MemoFicheSummary {
    MemoFicheSummary {
        id: model.id,
        title: model.title,
        theme: model.theme,
        system: model.system,
        kind: model.kind,
        is_free: model.is_free,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
