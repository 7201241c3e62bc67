use std::{
    collections::VecDeque,
    sync::{Mutex, atomic::{AtomicU32, Ordering}},
    time::Duration,
};

use async_trait::async_trait;
use pharmia_api::{
    ai::{AiClient, AiError, AiResult, ChatMessage, ResponseSchema, RetryPolicy},
    dto::generation::GenerateMemoFicheRequest,
    error::AppError,
    middleware::auth::AuthUser,
    models::Role,
    services::generation_service::generate_memofiche,
};
use serde_json::json;
use uuid::Uuid;

/// Replays canned answers and records the prompts it received.
struct ScriptedAi {
    answers: Mutex<VecDeque<AiResult<String>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicU32,
}

impl ScriptedAi {
    fn new(answers: Vec<AiResult<String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl AiClient for ScriptedAi {
    async fn chat(&self, _messages: &[ChatMessage]) -> AiResult<String> {
        Err(AiError::Rejected("chat is not scripted".into()))
    }

    async fn chat_structured(
        &self,
        messages: &[ChatMessage],
        schema: ResponseSchema<'_>,
    ) -> AiResult<String> {
        assert_eq!(schema.name, "memofiche");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(last) = messages.last() {
            self.prompts.lock().unwrap().push(last.content.clone());
        }
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::Rejected("script exhausted".into())))
    }

    async fn embed(&self, inputs: &[String]) -> AiResult<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        delay: Duration::ZERO,
    }
}

fn formateur() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: Role::Formateur,
    }
}

fn request(source: &str) -> GenerateMemoFicheRequest {
    GenerateMemoFicheRequest {
        source_text: source.into(),
        theme: Some("Dermatologie".into()),
        system: None,
        kind: None,
    }
}

fn valid_answer() -> String {
    json!({
        "title": "Acné de l'adolescent",
        "patient_situation": "Un adolescent de 15 ans demande un conseil pour des boutons.",
        "key_questions": ["Depuis quand ?"],
        "red_flags": ["Lésions profondes et douloureuses"],
        "recommendations": {
            "main_treatment": ["Nettoyant doux matin et soir"],
            "associated_products": ["Crème hydratante non comédogène"],
            "lifestyle_advice": ["Ne pas percer les boutons"],
            "dietary_advice": []
        },
        "flashcards": [{ "question": "Quand orienter ?", "answer": "Acné nodulaire" }],
        "glossary": [{ "term": "Comédon", "definition": "Point noir ou blanc" }],
        "quiz": [{
            "question": "Quel conseil donner ?",
            "options": ["Percer les boutons", "Nettoyer doucement la peau"],
            "correct_answer_index": 1,
            "explanation": null
        }]
    })
    .to_string()
}

#[tokio::test]
async fn invalid_draft_is_retried_with_feedback() {
    let broken = json!({
        "title": "Acné",
        "patient_situation": "Un adolescent.",
        "key_questions": [],
        "red_flags": [],
        "recommendations": {
            "main_treatment": [], "associated_products": [],
            "lifestyle_advice": [], "dietary_advice": []
        },
        "flashcards": [],
        "glossary": [],
        "quiz": [{
            "question": "Q ?",
            "options": ["Une seule"],
            "correct_answer_index": 3,
            "explanation": null
        }]
    })
    .to_string();
    let ai = ScriptedAi::new(vec![Ok(broken), Ok(valid_answer())]);

    let resp = generate_memofiche(&ai, policy(), &formateur(), request("L'acné juvénile..."))
        .await
        .expect("draft");
    let draft = resp.data.expect("draft data");

    assert_eq!(draft.attempts, 2);
    assert_eq!(draft.content.title, "Acné de l'adolescent");
    assert_eq!(draft.theme, "Dermatologie");
    assert_eq!(draft.kind, "maladie");

    let prompts = ai.prompts.lock().unwrap();
    assert!(!prompts[0].contains("refusées"));
    assert!(prompts[1].contains("quiz[0] needs at least two options"));
}

#[tokio::test]
async fn rejected_requests_are_not_retried() {
    let ai = ScriptedAi::new(vec![
        Err(AiError::Rejected("invalid api key".into())),
        Ok(valid_answer()),
    ]);

    let err = generate_memofiche(&ai, policy(), &formateur(), request("Texte"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Ai(AiError::Rejected(_))));
    assert_eq!(ai.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn persistent_garbage_exhausts_attempts() {
    let ai = ScriptedAi::new(vec![
        Ok("not json".into()),
        Ok("{".into()),
        Ok("[]".into()),
    ]);

    let err = generate_memofiche(&ai, policy(), &formateur(), request("Texte"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Ai(AiError::InvalidOutput(_))));
    assert_eq!(ai.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn learners_cannot_generate() {
    let ai = ScriptedAi::new(vec![Ok(valid_answer())]);
    let learner = AuthUser {
        user_id: Uuid::new_v4(),
        role: Role::Preparateur,
    };

    let err = generate_memofiche(&ai, policy(), &learner, request("Texte"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Forbidden));
    assert_eq!(ai.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn blank_source_is_a_bad_request() {
    let ai = ScriptedAi::new(Vec::new());

    let err = generate_memofiche(&ai, policy(), &formateur(), request("   \n "))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(ai.calls.load(Ordering::SeqCst), 0);
}
