use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::MemoFicheContent;

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateMemoFicheRequest {
    /// Reference material the fiche is drafted from.
    pub source_text: String,
    pub theme: Option<String>,
    pub system: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemoFicheDraft {
    #[serde(flatten)]
    pub content: MemoFicheContent,
    pub theme: String,
    pub system: String,
    pub kind: String,
    pub attempts: u32,
}
