use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::{Value, json};

use crate::{
    ai::{AiClient, AiError, ChatMessage, ResponseSchema, RetryPolicy, with_retries},
    dto::{
        generation::{GenerateMemoFicheRequest, MemoFicheDraft},
        memofiches::default_kind,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_staff},
    models::MemoFicheContent,
    response::{ApiResponse, Meta},
    services::memofiche_service::content_problems,
    state::AppState,
};

/// Longest accepted source text, in characters.
pub const MAX_SOURCE_CHARS: usize = 60_000;

const SYSTEM_PROMPT: &str = "Tu es formateur en pharmacie d'officine. \
À partir du document fourni, rédige une mémofiche de formation destinée aux \
pharmaciens et préparateurs : un cas de comptoir réaliste, les questions à \
poser, les signaux d'alerte imposant une orientation médicale, les conseils \
(traitement, produits associés, hygiène de vie, alimentation), des flashcards, \
un glossaire et un quiz à choix multiples. Réponds en français, uniquement \
avec des informations présentes dans le document ou consensuelles.";

fn string_array() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

/// JSON schema of a generated fiche, in the strict subset providers accept.
pub fn memofiche_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "title", "patient_situation", "key_questions", "red_flags",
            "recommendations", "flashcards", "glossary", "quiz"
        ],
        "properties": {
            "title": { "type": "string" },
            "patient_situation": { "type": "string" },
            "key_questions": string_array(),
            "red_flags": string_array(),
            "recommendations": {
                "type": "object",
                "additionalProperties": false,
                "required": [
                    "main_treatment", "associated_products",
                    "lifestyle_advice", "dietary_advice"
                ],
                "properties": {
                    "main_treatment": string_array(),
                    "associated_products": string_array(),
                    "lifestyle_advice": string_array(),
                    "dietary_advice": string_array()
                }
            },
            "flashcards": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["question", "answer"],
                    "properties": {
                        "question": { "type": "string" },
                        "answer": { "type": "string" }
                    }
                }
            },
            "glossary": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["term", "definition"],
                    "properties": {
                        "term": { "type": "string" },
                        "definition": { "type": "string" }
                    }
                }
            },
            "quiz": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["question", "options", "correct_answer_index", "explanation"],
                    "properties": {
                        "question": { "type": "string" },
                        "options": string_array(),
                        "correct_answer_index": { "type": "integer" },
                        "explanation": { "type": ["string", "null"] }
                    }
                }
            }
        }
    })
}

/// Parse and check a model answer; any problem is an `InvalidOutput`.
pub fn parse_draft(raw: &str) -> Result<MemoFicheContent, AiError> {
    let content: MemoFicheContent = serde_json::from_str(raw.trim())
        .map_err(|e| AiError::InvalidOutput(format!("answer does not match the schema: {e}")))?;
    let problems = content_problems(&content);
    if !problems.is_empty() {
        return Err(AiError::InvalidOutput(problems.join("; ")));
    }
    Ok(content)
}

fn build_prompt(payload: &GenerateMemoFicheRequest, previous_errors: &[String]) -> String {
    let mut prompt = String::new();
    if let Some(theme) = payload.theme.as_deref().filter(|t| !t.trim().is_empty()) {
        prompt.push_str(&format!("Thème : {}\n", theme.trim()));
    }
    if let Some(system) = payload.system.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("Système : {}\n", system.trim()));
    }
    if let Some(kind) = payload.kind.as_deref().filter(|k| !k.trim().is_empty()) {
        prompt.push_str(&format!("Type de mémofiche : {}\n", kind.trim()));
    }
    prompt.push_str("\nDocument source :\n\"\"\"\n");
    prompt.push_str(payload.source_text.trim());
    prompt.push_str("\n\"\"\"\n");

    if !previous_errors.is_empty() {
        prompt.push_str("\nTes réponses précédentes ont été refusées pour ces raisons, corrige-les :\n");
        for err in previous_errors {
            prompt.push_str("- ");
            prompt.push_str(err);
            prompt.push('\n');
        }
    }
    prompt
}

/// Role check comes before the provider lookup, so learners get 403 even when
/// no AI provider is configured.
pub async fn generate(
    state: &AppState,
    user: &AuthUser,
    payload: GenerateMemoFicheRequest,
) -> AppResult<ApiResponse<MemoFicheDraft>> {
    ensure_staff(user)?;
    generate_memofiche(state.ai()?, state.ai_retry, user, payload).await
}

pub async fn generate_memofiche(
    ai: &dyn AiClient,
    policy: RetryPolicy,
    user: &AuthUser,
    payload: GenerateMemoFicheRequest,
) -> AppResult<ApiResponse<MemoFicheDraft>> {
    ensure_staff(user)?;
    let source_len = payload.source_text.trim().chars().count();
    if source_len == 0 {
        return Err(AppError::BadRequest("source_text must not be empty".into()));
    }
    if source_len > MAX_SOURCE_CHARS {
        return Err(AppError::BadRequest(format!(
            "source_text must be at most {MAX_SOURCE_CHARS} characters"
        )));
    }

    let schema = memofiche_schema();
    let attempts = AtomicU32::new(0);
    let content = with_retries(policy, |previous_errors| {
        attempts.fetch_add(1, Ordering::SeqCst);
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(&payload, &previous_errors)),
        ];
        let schema = &schema;
        async move {
            let raw = ai
                .chat_structured(
                    &messages,
                    ResponseSchema {
                        name: "memofiche",
                        schema,
                    },
                )
                .await?;
            parse_draft(&raw)
        }
    })
    .await?;

    let attempts = attempts.load(Ordering::SeqCst);
    tracing::info!(user_id = %user.user_id, attempts, "memo fiche draft generated");

    let draft = MemoFicheDraft {
        content,
        theme: payload.theme.unwrap_or_default().trim().to_string(),
        system: payload.system.unwrap_or_default().trim().to_string(),
        kind: payload
            .kind
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(default_kind),
        attempts,
    };
    Ok(ApiResponse::success("Draft generated", draft, Some(Meta::empty())))
}
