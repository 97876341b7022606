pub mod adapter;
pub mod handler;
pub mod send;
pub mod typing;

pub use adapter::TelegramAdapter;
