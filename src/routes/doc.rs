use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    ai::{ChatMessage, ChatRole},
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        chat::{ChatRequest, ChatResponse, ChatSource},
        generation::{GenerateMemoFicheRequest, MemoFicheDraft},
        memofiches::{CreateMemoFicheRequest, IndexReport, MemoFicheList, UpdateMemoFicheRequest},
        newsletter::{
            DeliveryReport, NewsletterList, SendNewsletterRequest, SubscribeRequest,
            SubscriberList, UnsubscribeRequest, UpdateGroupsRequest,
        },
        progress::{
            MarkMediaViewedRequest, MarkReadRequest, ProgressOverview, RecordQuizRequest,
            TeamMemberProgress, TeamProgress,
        },
        users::{
            ChangePasswordRequest, UpdateProfileRequest, UpdateRoleRequest,
            UpdateSubscriptionRequest, UserList, UserProfile,
        },
    },
    models::{
        Flashcard, GlossaryTerm, MediaKind, MediaLink, MediaView, MemoFiche, MemoFicheContent,
        MemoFicheSummary, Newsletter, QuizQuestion, QuizResult, Recommendations, Role,
        Subscriber, SubscriptionStatus, User,
    },
    response::{ApiResponse, Meta},
    routes::{
        admin, auth, chat, generation, health, memofiches, newsletter, params, progress, users,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        users::get_me,
        users::update_me,
        users::change_password,
        memofiches::list_memofiches,
        memofiches::get_memofiche,
        memofiches::create_memofiche,
        memofiches::update_memofiche,
        memofiches::delete_memofiche,
        memofiches::index_memofiche,
        progress::my_progress,
        progress::team_progress,
        progress::mark_read,
        progress::mark_media_viewed,
        progress::record_quiz,
        generation::generate_memofiche,
        chat::chat,
        newsletter::subscribe,
        newsletter::unsubscribe,
        admin::list_users,
        admin::update_role,
        admin::update_subscription,
        admin::delete_user,
        admin::list_subscribers,
        admin::update_groups,
        admin::delete_subscriber,
        admin::send_newsletter,
        admin::list_newsletters
    ),
    components(
        schemas(
            Role,
            SubscriptionStatus,
            User,
            Recommendations,
            Flashcard,
            GlossaryTerm,
            QuizQuestion,
            MediaKind,
            MediaLink,
            MemoFicheContent,
            MemoFiche,
            MemoFicheSummary,
            QuizResult,
            MediaView,
            Subscriber,
            Newsletter,
            ChatRole,
            ChatMessage,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UpdateProfileRequest,
            ChangePasswordRequest,
            UserProfile,
            UserList,
            UpdateRoleRequest,
            UpdateSubscriptionRequest,
            CreateMemoFicheRequest,
            UpdateMemoFicheRequest,
            MemoFicheList,
            IndexReport,
            MarkReadRequest,
            MarkMediaViewedRequest,
            RecordQuizRequest,
            ProgressOverview,
            TeamMemberProgress,
            TeamProgress,
            GenerateMemoFicheRequest,
            MemoFicheDraft,
            ChatRequest,
            ChatSource,
            ChatResponse,
            SubscribeRequest,
            UnsubscribeRequest,
            UpdateGroupsRequest,
            SendNewsletterRequest,
            DeliveryReport,
            SubscriberList,
            NewsletterList,
            params::Pagination,
            params::SortOrder,
            params::MemoFicheQuery,
            params::UserListQuery,
            params::SubscriberQuery,
            health::HealthData,
            Meta,
            ApiResponse<User>,
            ApiResponse<UserProfile>,
            ApiResponse<MemoFiche>,
            ApiResponse<MemoFicheList>,
            ApiResponse<MemoFicheDraft>,
            ApiResponse<ChatResponse>,
            ApiResponse<DeliveryReport>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration and login"),
        (name = "Users", description = "Current user profile"),
        (name = "MemoFiches", description = "Training memo fiches"),
        (name = "Progress", description = "Reading, media and quiz progress"),
        (name = "Generation", description = "AI drafting of memo fiches"),
        (name = "Chat", description = "Training assistant"),
        (name = "Newsletter", description = "Public newsletter subscription"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
