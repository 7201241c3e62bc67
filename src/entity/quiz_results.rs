use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "quiz_results")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub memofiche_id: Uuid,
    pub score: i32,
    pub total: i32,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::memofiches::Entity",
        from = "Column::MemoficheId",
        to = "super::memofiches::Column::Id",
        on_delete = "Cascade"
    )]
    MemoFiche,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::memofiches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MemoFiche.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
