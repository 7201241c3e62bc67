use uuid::Uuid;

use crate::{
    ai::{AiClient, ChatMessage, ChatRole, RetryPolicy, with_retries},
    dto::chat::{ChatRequest, ChatResponse, ChatSource},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    retrieval::{render_fiche_text, top_k},
    services::{memofiche_service::readable_memofiche, user_service::has_access_by_id},
    state::AppState,
};

/// Chunks handed to the model as context.
pub const CONTEXT_CHUNKS: usize = 4;
/// Prior turns kept from the client-supplied history.
pub const MAX_HISTORY: usize = 10;
pub const MAX_MESSAGE_CHARS: usize = 4_000;
/// Chunks scored per question. Ranking happens in process over the newest
/// chunks only, so fiches indexed beyond this bound are not searched.
pub const MAX_RETRIEVAL_CHUNKS: i64 = 2_000;

const SYSTEM_PROMPT: &str = "Tu es PharmIA, l'assistant de formation des équipes \
officinales. Réponds en français, de façon concise et pratique, en t'appuyant \
d'abord sur le contexte fourni. Si la question dépasse le conseil officinal ou \
si un signal d'alerte apparaît, recommande une orientation médicale. Si le \
contexte ne permet pas de répondre, dis-le.";

/// A retrieved piece of context.
#[derive(Debug, Clone)]
pub struct ContextChunk {
    pub memofiche_id: Uuid,
    pub title: String,
    pub content: String,
    pub score: Option<f32>,
}

/// A stored chunk joined with its fiche title.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredChunk {
    pub memofiche_id: Uuid,
    pub title: String,
    pub content: String,
    pub embedding: serde_json::Value,
}

/// Assemble the conversation sent to the model.
pub fn build_messages(
    context: &[ContextChunk],
    history: &[ChatMessage],
    message: &str,
) -> Vec<ChatMessage> {
    let mut system = SYSTEM_PROMPT.to_string();
    if !context.is_empty() {
        system.push_str("\n\nContexte :");
        for chunk in context {
            system.push_str(&format!("\n\n[{}]\n{}", chunk.title, chunk.content));
        }
    }

    // Clients cannot inject system instructions.
    let turns: Vec<&ChatMessage> = history
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .collect();
    let start = turns.len().saturating_sub(MAX_HISTORY);

    let mut messages = vec![ChatMessage::system(system)];
    messages.extend(turns[start..].iter().map(|m| (*m).clone()));
    messages.push(ChatMessage::user(message.trim()));
    messages
}

/// Pick the chunks most similar to `query` among `chunks`.
pub fn select_context(query: &[f32], chunks: Vec<StoredChunk>, k: usize) -> Vec<ContextChunk> {
    let vectors: Vec<Vec<f32>> = chunks
        .iter()
        .map(|c| serde_json::from_value(c.embedding.clone()).unwrap_or_default())
        .collect();
    top_k(query, vectors.iter().map(|v| v.as_slice()), k)
        .into_iter()
        .map(|(i, score)| {
            let chunk = &chunks[i];
            ContextChunk {
                memofiche_id: chunk.memofiche_id,
                title: chunk.title.clone(),
                content: chunk.content.clone(),
                score: Some(score),
            }
        })
        .collect()
}

pub async fn chat(
    state: &AppState,
    user: &AuthUser,
    payload: ChatRequest,
) -> AppResult<ApiResponse<ChatResponse>> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("message must not be empty".into()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::BadRequest(format!(
            "message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    if !has_access_by_id(state, user).await? {
        return Err(AppError::Forbidden);
    }
    let ai = state.ai()?;

    let context = match payload.memofiche_id {
        Some(id) => {
            let fiche = readable_memofiche(state, user, id).await?;
            vec![ContextChunk {
                memofiche_id: fiche.id,
                title: fiche.content.title.clone(),
                content: render_fiche_text(&fiche),
                score: None,
            }]
        }
        None => retrieve_context(state, ai, message).await?,
    };

    let reply = answer(ai, state.ai_retry, &context, &payload.history, message).await?;
    tracing::debug!(user_id = %user.user_id, sources = context.len(), "assistant replied");

    let sources = dedup_sources(&context);
    Ok(ApiResponse::success(
        "Reply",
        ChatResponse { reply, sources },
        Some(Meta::empty()),
    ))
}

pub async fn answer(
    ai: &dyn AiClient,
    policy: RetryPolicy,
    context: &[ContextChunk],
    history: &[ChatMessage],
    message: &str,
) -> AppResult<String> {
    let messages = build_messages(context, history, message);
    let reply = with_retries(policy, |_| ai.chat(&messages)).await?;
    Ok(reply)
}

async fn retrieve_context(
    state: &AppState,
    ai: &dyn AiClient,
    message: &str,
) -> AppResult<Vec<ContextChunk>> {
    let input = vec![message.to_string()];
    let query = with_retries(state.ai_retry, |_| ai.embed(&input))
        .await?
        .into_iter()
        .next()
        .unwrap_or_default();

    let chunks = sqlx::query_as::<_, StoredChunk>(
        r#"
        SELECT c.memofiche_id, f.title, c.content, c.embedding
        FROM memofiche_chunks c
        JOIN memofiches f ON f.id = c.memofiche_id
        ORDER BY c.created_at DESC
        LIMIT $1
        "#,
    )
    .bind(MAX_RETRIEVAL_CHUNKS)
    .fetch_all(&state.pool)
    .await?;

    Ok(select_context(&query, chunks, CONTEXT_CHUNKS))
}

/// One source per fiche, keeping its best score, in context order.
fn dedup_sources(context: &[ContextChunk]) -> Vec<ChatSource> {
    let mut sources: Vec<ChatSource> = Vec::new();
    for chunk in context {
        match sources.iter_mut().find(|s| s.memofiche_id == chunk.memofiche_id) {
            Some(existing) => {
                if chunk.score > existing.score {
                    existing.score = chunk.score;
                }
            }
            None => sources.push(ChatSource {
                memofiche_id: chunk.memofiche_id,
                title: chunk.title.clone(),
                score: chunk.score,
            }),
        }
    }
    sources
}
