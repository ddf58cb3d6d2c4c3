pub mod chat;
pub mod events;
pub mod message;
pub mod presence;
pub mod user;
