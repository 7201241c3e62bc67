pub mod auth_service;
pub mod chat_service;
pub mod generation_service;
pub mod memofiche_service;
pub mod newsletter_service;
pub mod progress_service;
pub mod user_service;
