use pharmia_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    dto::memofiches::CreateMemoFicheRequest,
    middleware::auth::AuthUser,
    models::{
        Flashcard, GlossaryTerm, MediaKind, MediaLink, MemoFicheContent, QuizQuestion,
        Recommendations, Role,
    },
    services::{auth_service::hash_password, memofiche_service},
    state::AppState,
};
use uuid::Uuid;

const SAMPLE_TITLE: &str = "Cystite aiguë simple de la femme";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;
    let state = AppState::from_config(orm, &config)?;

    let admin_email =
        std::env::var("SEED_ADMIN_EMAIL").unwrap_or_else(|_| "admin@pharmia.local".into());
    let admin_password =
        std::env::var("SEED_ADMIN_PASSWORD").unwrap_or_else(|_| "admin12345".into());

    let admin_id = ensure_user(&state.pool, &admin_email, &admin_password, Role::Admin).await?;
    let formateur_id = ensure_user(
        &state.pool,
        "formateur@pharmia.local",
        "formateur12345",
        Role::Formateur,
    )
    .await?;
    seed_sample_fiche(&state, formateur_id).await?;

    println!("Seed completed. Admin ID: {admin_id}, Formateur ID: {formateur_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password)?;

    // Existing accounts keep their password; only the role is enforced.
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role, updated_at = now()
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email.trim().to_lowercase())
    .bind(password_hash)
    .bind(role.as_str())
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(id)
}

async fn seed_sample_fiche(state: &AppState, author: Uuid) -> anyhow::Result<()> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM memofiches WHERE title = $1")
        .bind(SAMPLE_TITLE)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        println!("Sample memo fiche already present");
        return Ok(());
    }

    let author = AuthUser {
        user_id: author,
        role: Role::Formateur,
    };
    let resp = memofiche_service::create_memofiche(state, &author, sample_fiche()).await?;
    if let Some(fiche) = resp.data {
        println!("Seeded memo fiche {}", fiche.id);
    }
    Ok(())
}

fn sample_fiche() -> CreateMemoFicheRequest {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    CreateMemoFicheRequest {
        content: MemoFicheContent {
            title: SAMPLE_TITLE.into(),
            patient_situation: "Une femme de 28 ans se présente au comptoir avec des brûlures \
                en urinant et des envies fréquentes depuis la veille. Pas de fièvre."
                .into(),
            key_questions: strings(&[
                "Depuis quand les symptômes sont-ils apparus ?",
                "Avez-vous de la fièvre ou une douleur dans le dos ?",
                "Êtes-vous enceinte ?",
                "Est-ce le premier épisode cette année ?",
            ]),
            red_flags: strings(&[
                "Fièvre ou frissons",
                "Douleur lombaire",
                "Grossesse",
                "Plus de trois épisodes par an",
            ]),
            recommendations: Recommendations {
                main_treatment: strings(&["Orientation vers le médecin pour un test et un traitement"]),
                associated_products: strings(&["Canneberge en prévention des récidives"]),
                lifestyle_advice: strings(&[
                    "Uriner après les rapports",
                    "Ne pas se retenir d'uriner",
                ]),
                dietary_advice: strings(&["Boire au moins 1,5 L d'eau par jour"]),
            },
            flashcards: vec![Flashcard {
                question: "Quel signe impose une orientation médicale urgente ?".into(),
                answer: "La fièvre ou une douleur lombaire, évoquant une pyélonéphrite.".into(),
            }],
            glossary: vec![GlossaryTerm {
                term: "Pollakiurie".into(),
                definition: "Besoin d'uriner fréquemment, en petites quantités.".into(),
            }],
            quiz: vec![QuizQuestion {
                question: "Quelle patiente doit être orientée vers un médecin ?".into(),
                options: strings(&[
                    "Une patiente avec fièvre",
                    "Une patiente au premier épisode sans fièvre",
                ]),
                correct_answer_index: 0,
                explanation: Some("La fièvre fait suspecter une atteinte haute.".into()),
            }],
        },
        theme: "Urologie".into(),
        system: "Urinaire".into(),
        kind: "maladie".into(),
        media: vec![MediaLink {
            id: "podcast-cystite".into(),
            kind: MediaKind::Podcast,
            title: "La cystite au comptoir".into(),
            url: "https://example.org/podcasts/cystite.mp3".into(),
        }],
        is_free: true,
    }
}
