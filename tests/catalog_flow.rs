use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use pharmia_api::{
    ai::{AiClient, AiResult, ChatMessage, ResponseSchema, RetryPolicy},
    config::JwtConfig,
    db::{create_orm_conn, pool_of, run_migrations},
    dto::{
        auth::RegisterRequest,
        chat::ChatRequest,
        memofiches::{CreateMemoFicheRequest, UpdateMemoFicheRequest},
        progress::{MarkMediaViewedRequest, MarkReadRequest, RecordQuizRequest},
    },
    entity::users::ActiveModel as UserActive,
    error::AppError,
    middleware::auth::AuthUser,
    models::{MemoFicheContent, QuizQuestion, Role, SubscriptionStatus},
    routes::params::{MemoFicheQuery, Pagination, SortOrder},
    services::{auth_service, chat_service, memofiche_service, progress_service},
    state::AppState,
};
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

/// Answers with the title of the first fiche found in the system prompt.
struct ContextAi;

#[async_trait]
impl AiClient for ContextAi {
    async fn chat(&self, messages: &[ChatMessage]) -> AiResult<String> {
        let system = messages.first().map(|m| m.content.as_str()).unwrap_or("");
        let title = system
            .split_once("\n\n[")
            .and_then(|(_, rest)| rest.split_once(']'))
            .map(|(title, _)| title.to_string())
            .unwrap_or_default();
        Ok(format!("fiche={title}"))
    }

    async fn chat_structured(
        &self,
        _messages: &[ChatMessage],
        _schema: ResponseSchema<'_>,
    ) -> AiResult<String> {
        Ok("{}".into())
    }

    async fn embed(&self, inputs: &[String]) -> AiResult<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

// Integration flow: catalogue listing, partial updates that must stay valid,
// fiche-scoped assistant questions and progress edge cases.
#[tokio::test]
async fn catalogue_update_and_scoped_chat_flow() -> anyhow::Result<()> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;
    let formateur = create_staff(&state, Role::Formateur, "formateur@example.com").await?;
    let pharmacist = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "sans.abonnement@example.com".into(),
            password: "secret-password".into(),
            first_name: "Camille".into(),
            last_name: "Martin".into(),
            role: Role::Pharmacien,
            pharmacist_email: None,
        },
    )
    .await?
    .data
    .expect("pharmacist");
    let learner = AuthUser {
        user_id: pharmacist.id,
        role: Role::Pharmacien,
    };

    let rhume = create(&state, &formateur, "Rhume", "ORL", "Respiratoire").await?;
    let angine = create(&state, &formateur, "Angine", "ORL", "Respiratoire").await?;
    let cystite = create(&state, &formateur, "Cystite", "Urologie", "Urinaire").await?;

    // Newest first, paginated.
    let first_page = memofiche_service::list_memofiches(&state, page(1, 2)).await?;
    let meta = first_page.meta.clone().expect("meta");
    assert_eq!(meta.total, Some(3));
    assert_eq!(meta.total_pages, Some(2));
    assert_eq!(titles(first_page), vec!["Cystite", "Angine"]);
    assert_eq!(
        titles(memofiche_service::list_memofiches(&state, page(2, 2)).await?),
        vec!["Rhume"]
    );

    let oldest_first = memofiche_service::list_memofiches(
        &state,
        MemoFicheQuery {
            sort_order: Some(SortOrder::Asc),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(titles(oldest_first), vec!["Rhume", "Angine", "Cystite"]);

    // Filters combine.
    let orl = memofiche_service::list_memofiches(
        &state,
        MemoFicheQuery {
            theme: Some("ORL".into()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(titles(orl), vec!["Angine", "Rhume"]);

    let urinary = memofiche_service::list_memofiches(
        &state,
        MemoFicheQuery {
            system: Some("Urinaire".into()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(titles(urinary), vec!["Cystite"]);

    let by_title = memofiche_service::list_memofiches(
        &state,
        MemoFicheQuery {
            q: Some("ANGI".into()),
            theme: Some("ORL".into()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(titles(by_title), vec!["Angine"]);

    let by_situation = memofiche_service::list_memofiches(
        &state,
        MemoFicheQuery {
            q: Some("au comptoir".into()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(by_situation.meta.and_then(|m| m.total), Some(3));

    // Partial updates keep untouched fields and are validated as a whole.
    let updated = memofiche_service::update_memofiche(
        &state,
        &formateur,
        rhume.id,
        UpdateMemoFicheRequest {
            title: Some("  Rhume de l'adulte ".into()),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("updated");
    assert_eq!(updated.content.title, "Rhume de l'adulte");
    assert_eq!(updated.theme, "ORL");
    assert_eq!(updated.content.quiz.len(), 1);

    let broken_quiz = memofiche_service::update_memofiche(
        &state,
        &formateur,
        rhume.id,
        UpdateMemoFicheRequest {
            quiz: Some(vec![QuizQuestion {
                question: "Quand orienter ?".into(),
                options: vec!["Fièvre élevée".into(), "Jamais".into()],
                correct_answer_index: 5,
                explanation: None,
            }]),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(broken_quiz, Err(AppError::BadRequest(_))));
    let unchanged = memofiche_service::find_memofiche(&state, rhume.id).await?;
    assert_eq!(unchanged.content.quiz[0].correct_answer_index, 0);

    assert!(matches!(
        memofiche_service::update_memofiche(
            &state,
            &learner,
            rhume.id,
            UpdateMemoFicheRequest::default()
        )
        .await,
        Err(AppError::Forbidden)
    ));
    assert!(matches!(
        memofiche_service::update_memofiche(
            &state,
            &formateur,
            Uuid::new_v4(),
            UpdateMemoFicheRequest::default()
        )
        .await,
        Err(AppError::NotFound)
    ));

    // A fiche-scoped question uses that fiche as the only context.
    memofiche_service::index_memofiche(&state, &formateur, angine.id).await?;
    let scoped = chat_service::chat(
        &state,
        &formateur,
        ChatRequest {
            message: "Quels signaux d'alerte ?".into(),
            history: Vec::new(),
            memofiche_id: Some(cystite.id),
        },
    )
    .await?
    .data
    .expect("scoped reply");
    assert_eq!(scoped.reply, "fiche=Cystite");
    assert_eq!(scoped.sources.len(), 1);
    assert_eq!(scoped.sources[0].memofiche_id, cystite.id);
    assert_eq!(scoped.sources[0].score, None);

    let retrieved = chat_service::chat(
        &state,
        &formateur,
        ChatRequest {
            message: "Mal de gorge ?".into(),
            history: Vec::new(),
            memofiche_id: None,
        },
    )
    .await?
    .data
    .expect("retrieved reply");
    assert_eq!(retrieved.reply, "fiche=Angine");
    assert!(retrieved.sources.iter().all(|s| s.memofiche_id == angine.id));

    // Learners without a subscription cannot use the assistant at all.
    for memofiche_id in [None, Some(angine.id)] {
        let refused = chat_service::chat(
            &state,
            &learner,
            ChatRequest {
                message: "Mal de gorge ?".into(),
                history: Vec::new(),
                memofiche_id,
            },
        )
        .await;
        assert!(matches!(refused, Err(AppError::Forbidden)));
    }
    assert!(matches!(
        chat_service::chat(
            &state,
            &formateur,
            ChatRequest {
                message: "Et ici ?".into(),
                history: Vec::new(),
                memofiche_id: Some(Uuid::new_v4()),
            },
        )
        .await,
        Err(AppError::NotFound)
    ));

    // Progress on a fiche that does not exist.
    let missing = Uuid::new_v4();
    assert!(matches!(
        progress_service::mark_read(&state, &learner, MarkReadRequest { memofiche_id: missing })
            .await,
        Err(AppError::NotFound)
    ));
    assert!(matches!(
        progress_service::mark_media_viewed(
            &state,
            &learner,
            MarkMediaViewedRequest {
                memofiche_id: missing,
                media_id: "video-1".into(),
            },
        )
        .await,
        Err(AppError::NotFound)
    ));
    assert!(matches!(
        progress_service::record_quiz(&state, &learner, quiz(missing, 1, 2)).await,
        Err(AppError::NotFound)
    ));

    // Quiz bounds are checked before anything is stored.
    for (score, total) in [(0, 0), (-1, 2), (3, 2)] {
        assert!(matches!(
            progress_service::record_quiz(&state, &learner, quiz(angine.id, score, total)).await,
            Err(AppError::BadRequest(_))
        ));
    }
    for (score, total) in [(0, 2), (2, 2)] {
        progress_service::record_quiz(&state, &learner, quiz(angine.id, score, total)).await?;
    }
    let progress = progress_service::my_progress(&state, &learner)
        .await?
        .data
        .expect("progress");
    assert_eq!(progress.quiz_history.len(), 2);
    assert_eq!(progress.average_score, Some(50.0));

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE newsletters, subscribers, quiz_results, media_views, fiche_reads, \
         memofiche_chunks, memofiches, audit_logs, users CASCADE",
    ))
    .await?;

    Ok(AppState {
        pool: pool_of(&orm),
        orm,
        jwt: JwtConfig {
            secret: "integration-test-secret-with-enough-bytes".into(),
            ttl_hours: 1,
        },
        ai: Some(Arc::new(ContextAi)),
        ai_retry: RetryPolicy {
            max_attempts: 1,
            delay: Duration::ZERO,
        },
        mailer: None,
    })
}

async fn create_staff(state: &AppState, role: Role, email: &str) -> anyhow::Result<AuthUser> {
    let now = Utc::now();
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set(auth_service::hash_password("secret-password")?),
        first_name: Set("Staff".into()),
        last_name: Set(role.to_string()),
        role: Set(role.as_str().into()),
        pharmacist_id: Set(None),
        subscription_status: Set(SubscriptionStatus::None.as_str().into()),
        subscription_end_date: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role,
    })
}

async fn create(
    state: &AppState,
    user: &AuthUser,
    title: &str,
    theme: &str,
    system: &str,
) -> anyhow::Result<pharmia_api::models::MemoFiche> {
    let payload = CreateMemoFicheRequest {
        content: MemoFicheContent {
            title: title.into(),
            patient_situation: format!("Un patient se présente au comptoir : {title}."),
            key_questions: vec!["Depuis quand ?".into()],
            quiz: vec![QuizQuestion {
                question: "Quand orienter ?".into(),
                options: vec!["Fièvre élevée".into(), "Jamais".into()],
                correct_answer_index: 0,
                explanation: None,
            }],
            ..Default::default()
        },
        theme: theme.into(),
        system: system.into(),
        kind: "maladie".into(),
        media: Vec::new(),
        is_free: true,
    };
    let fiche = memofiche_service::create_memofiche(state, user, payload)
        .await?
        .data
        .expect("created fiche");
    Ok(fiche)
}

fn page(page: i64, per_page: i64) -> MemoFicheQuery {
    MemoFicheQuery {
        pagination: Pagination {
            page: Some(page),
            per_page: Some(per_page),
        },
        ..Default::default()
    }
}

fn titles(
    response: pharmia_api::response::ApiResponse<pharmia_api::dto::memofiches::MemoFicheList>,
) -> Vec<String> {
    response
        .data
        .map(|list| list.items.into_iter().map(|f| f.title).collect())
        .unwrap_or_default()
}

fn quiz(memofiche_id: Uuid, score: i32, total: i32) -> RecordQuizRequest {
    RecordQuizRequest {
        memofiche_id,
        score,
        total,
    }
}
