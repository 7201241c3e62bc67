use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{
    Flashcard, GlossaryTerm, MediaLink, MemoFicheContent, MemoFicheSummary, QuizQuestion,
    Recommendations,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMemoFicheRequest {
    #[serde(flatten)]
    pub content: MemoFicheContent,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub system: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub media: Vec<MediaLink>,
    #[serde(default)]
    pub is_free: bool,
}

pub fn default_kind() -> String {
    "maladie".to_string()
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateMemoFicheRequest {
    pub title: Option<String>,
    pub theme: Option<String>,
    pub system: Option<String>,
    pub kind: Option<String>,
    pub patient_situation: Option<String>,
    pub key_questions: Option<Vec<String>>,
    pub red_flags: Option<Vec<String>>,
    pub recommendations: Option<Recommendations>,
    pub flashcards: Option<Vec<Flashcard>>,
    pub glossary: Option<Vec<GlossaryTerm>>,
    pub quiz: Option<Vec<QuizQuestion>>,
    pub media: Option<Vec<MediaLink>>,
    pub is_free: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemoFicheList {
    pub items: Vec<MemoFicheSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IndexReport {
    pub memofiche_id: uuid::Uuid,
    pub chunks: usize,
}
