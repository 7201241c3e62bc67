use sea_orm::entity::prelude::*;

/// Section columns are JSONB; `models::MemoFiche` gives them their typed shape.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "memofiches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    pub theme: String,
    pub system: String,
    pub kind: String,
    #[sea_orm(column_type = "Text")]
    pub patient_situation: String,
    pub key_questions: Json,
    pub red_flags: Json,
    pub recommendations: Json,
    pub flashcards: Json,
    pub glossary: Json,
    pub quiz: Json,
    pub media: Json,
    pub is_free: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::memofiche_chunks::Entity")]
    Chunks,
    #[sea_orm(has_many = "super::quiz_results::Entity")]
    QuizResults,
    #[sea_orm(has_many = "super::fiche_reads::Entity")]
    FicheReads,
}

impl Related<super::memofiche_chunks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chunks.def()
    }
}

impl Related<super::quiz_results::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QuizResults.def()
    }
}

impl Related<super::fiche_reads::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FicheReads.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
