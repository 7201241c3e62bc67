use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use pharmia_api::{
    ai::RetryPolicy,
    config::JwtConfig,
    db::{create_orm_conn, pool_of, run_migrations},
    dto::newsletter::{
        SendNewsletterRequest, SubscribeRequest, UnsubscribeRequest, UpdateGroupsRequest,
    },
    error::AppError,
    mail::Mailer,
    middleware::auth::AuthUser,
    models::Role,
    routes::params::{Pagination, SubscriberQuery},
    services::newsletter_service,
    state::AppState,
};
use sea_orm::{ConnectionTrait, Statement};
use uuid::Uuid;

/// Bounces every address on `bounce.test`, records the rest.
#[derive(Default)]
struct RecordingMailer {
    delivered: Mutex<Vec<String>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, _subject: &str, _html: &str) -> anyhow::Result<()> {
        if to.ends_with("@bounce.test") {
            anyhow::bail!("550 mailbox unavailable");
        }
        self.delivered.lock().unwrap().push(to.to_string());
        Ok(())
    }
}

// Integration flow: public subscribe/unsubscribe, admin group edits, then a
// targeted send where one recipient bounces.
#[tokio::test]
async fn subscribe_target_and_send_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
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

    let mailer = Arc::new(RecordingMailer::default());
    let state = setup_state(&database_url, mailer.clone()).await?;
    let admin = AuthUser {
        user_id: create_admin(&state).await?,
        role: Role::Admin,
    };

    for (email, groups) in [
        ("alice@pharma.fr", vec!["Pharmaciens"]),
        ("bob@bounce.test", vec!["pharmaciens", "etudiants"]),
        ("carol@pharma.fr", vec!["etudiants"]),
        ("dave@pharma.fr", vec![]),
    ] {
        newsletter_service::subscribe(
            &state,
            SubscribeRequest {
                email: email.into(),
                groups: groups.into_iter().map(String::from).collect(),
            },
        )
        .await?;
    }

    let invalid = newsletter_service::subscribe(
        &state,
        SubscribeRequest {
            email: "not-an-email".into(),
            groups: Vec::new(),
        },
    )
    .await;
    assert!(matches!(invalid, Err(AppError::BadRequest(_))));

    // Unknown addresses unsubscribe silently.
    newsletter_service::unsubscribe(
        &state,
        UnsubscribeRequest {
            email: "nobody@pharma.fr".into(),
        },
    )
    .await?;
    newsletter_service::unsubscribe(
        &state,
        UnsubscribeRequest {
            email: "Carol@Pharma.fr".into(),
        },
    )
    .await?;

    let pharmaciens = newsletter_service::list_subscribers(
        &state,
        &admin,
        SubscriberQuery {
            pagination: Pagination::default(),
            group: Some("PHARMACIENS".into()),
        },
    )
    .await?
    .data
    .expect("subscribers");
    let mut emails: Vec<_> = pharmaciens.items.iter().map(|s| s.email.as_str()).collect();
    emails.sort();
    assert_eq!(emails, vec!["alice@pharma.fr", "bob@bounce.test"]);

    let dave = newsletter_service::subscribe(
        &state,
        SubscribeRequest {
            email: "dave@pharma.fr".into(),
            groups: Vec::new(),
        },
    )
    .await?
    .data
    .expect("dave");
    let dave = newsletter_service::update_groups(
        &state,
        &admin,
        dave.id,
        UpdateGroupsRequest {
            add: vec!["Pharmaciens".into()],
            remove: Vec::new(),
        },
    )
    .await?
    .data
    .expect("groups updated");
    assert_eq!(dave.groups, vec!["pharmaciens"]);

    let learner = AuthUser {
        user_id: Uuid::new_v4(),
        role: Role::Preparateur,
    };
    let forbidden =
        newsletter_service::send_newsletter(&state, &learner, newsletter(&["pharmaciens"])).await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));

    let resp =
        newsletter_service::send_newsletter(&state, &admin, newsletter(&["pharmaciens"])).await?;
    assert_eq!(resp.message, "Newsletter partially sent");
    let report = resp.data.expect("report");
    assert_eq!(report.recipients, 3);
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, vec!["bob@bounce.test"]);

    let mut delivered = mailer.delivered.lock().unwrap().clone();
    delivered.sort();
    assert_eq!(delivered, vec!["alice@pharma.fr", "dave@pharma.fr"]);

    // Unsubscribed addresses are skipped even when no group is targeted.
    let everyone = newsletter_service::send_newsletter(&state, &admin, newsletter(&[]))
        .await?
        .data
        .expect("report");
    assert_eq!(everyone.recipients, 3);

    let history = newsletter_service::list_newsletters(&state, &admin, Pagination::default())
        .await?
        .data
        .expect("history");
    assert_eq!(history.items.len(), 2);
    let targeted = history
        .items
        .iter()
        .find(|n| n.id == report.newsletter_id)
        .expect("targeted newsletter stored");
    assert_eq!(targeted.failed_recipients, vec!["bob@bounce.test"]);
    assert_eq!(targeted.sent_count, 2);

    // Simultaneous sign-ups for one address collapse into a single row.
    let (a, b, c) = tokio::join!(
        newsletter_service::subscribe(&state, subscribe("erin@pharma.fr", &["officine"])),
        newsletter_service::subscribe(&state, subscribe("Erin@pharma.fr", &["etudiants"])),
        newsletter_service::subscribe(&state, subscribe("erin@pharma.fr", &["officine"])),
    );
    let ids: Vec<Uuid> = [a?, b?, c?]
        .into_iter()
        .map(|r| r.data.expect("subscriber").id)
        .collect();
    assert!(ids.iter().all(|id| *id == ids[0]));

    let officine = newsletter_service::list_subscribers(
        &state,
        &admin,
        SubscriberQuery {
            pagination: Pagination::default(),
            group: Some("officine".into()),
        },
    )
    .await?
    .data
    .expect("subscribers");
    assert_eq!(officine.items.len(), 1);
    assert_eq!(officine.items[0].groups, vec!["etudiants", "officine"]);

    // Subscribing again reactivates and merges groups.
    let carol = newsletter_service::subscribe(&state, subscribe("carol@pharma.fr", &["Officine"]))
        .await?
        .data
        .expect("carol");
    assert_eq!(carol.groups, vec!["etudiants", "officine"]);
    assert!(carol.unsubscribed_at.is_none());

    Ok(())
}

async fn setup_state(
    database_url: &str,
    mailer: Arc<RecordingMailer>,
) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE newsletters, subscribers, audit_logs, users CASCADE",
    ))
    .await?;

    Ok(AppState {
        pool: pool_of(&orm),
        orm,
        jwt: JwtConfig {
            secret: "integration-test-secret-with-enough-bytes".into(),
            ttl_hours: 1,
        },
        ai: None,
        ai_retry: RetryPolicy {
            max_attempts: 1,
            delay: Duration::ZERO,
        },
        mailer: Some(mailer as Arc<dyn Mailer>),
    })
}

async fn create_admin(state: &AppState) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO users (id, email, password_hash, role) VALUES ($1, $2, 'x', 'admin') RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind("admin@example.com")
    .fetch_one(&state.pool)
    .await?;
    Ok(id)
}

fn newsletter(groups: &[&str]) -> SendNewsletterRequest {
    SendNewsletterRequest {
        subject: "Nouvelles mémofiches".into(),
        html_content: "<p>Trois nouvelles fiches sont disponibles.</p>".into(),
        groups: groups.iter().map(|g| g.to_string()).collect(),
    }
}

fn subscribe(email: &str, groups: &[&str]) -> SubscribeRequest {
    SubscribeRequest {
        email: email.into(),
        groups: groups.iter().map(|g| g.to_string()).collect(),
    }
}
