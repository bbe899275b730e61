pub mod chat;
pub mod errors;
pub mod events;
pub mod images;
pub mod styles;
pub mod transcript;
pub mod wire;
