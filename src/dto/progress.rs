use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{MediaView, QuizResult};

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkReadRequest {
    pub memofiche_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkMediaViewedRequest {
    pub memofiche_id: Uuid,
    pub media_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordQuizRequest {
    pub memofiche_id: Uuid,
    pub score: i32,
    pub total: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProgressOverview {
    pub read_fiche_ids: Vec<Uuid>,
    pub viewed_media: Vec<MediaView>,
    pub quiz_history: Vec<QuizResult>,
    /// Mean of score/total over all quizzes, as a percentage.
    pub average_score: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TeamMemberProgress {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub fiches_read: i64,
    pub quizzes_taken: i64,
    pub average_score: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TeamProgress {
    pub items: Vec<TeamMemberProgress>,
}
