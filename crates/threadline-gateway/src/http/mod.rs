pub mod chat;
pub mod chats;
pub mod error;
pub mod health;
pub mod image;
pub mod ui;
