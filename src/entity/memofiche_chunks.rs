use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "memofiche_chunks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub memofiche_id: Uuid,
    pub position: i32,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    /// Embedding vector stored as a JSON array of floats.
    pub embedding: Json,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::memofiches::Entity",
        from = "Column::MemoficheId",
        to = "super::memofiches::Column::Id",
        on_delete = "Cascade"
    )]
    MemoFiche,
}

impl Related<super::memofiches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MemoFiche.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
