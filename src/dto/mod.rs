pub mod auth;
pub mod chat;
pub mod generation;
pub mod memofiches;
pub mod newsletter;
pub mod progress;
pub mod users;
