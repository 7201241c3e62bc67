pub mod audit_logs;
pub mod fiche_reads;
pub mod media_views;
pub mod memofiche_chunks;
pub mod memofiches;
pub mod newsletters;
pub mod quiz_results;
pub mod subscribers;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use fiche_reads::Entity as FicheReads;
pub use media_views::Entity as MediaViews;
pub use memofiche_chunks::Entity as MemoFicheChunks;
pub use memofiches::Entity as MemoFiches;
pub use newsletters::Entity as Newsletters;
pub use quiz_results::Entity as QuizResults;
pub use subscribers::Entity as Subscribers;
pub use users::Entity as Users;
