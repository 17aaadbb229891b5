pub mod chat;
pub mod fake;
pub mod golden;
