pub mod cache;
pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::HistoryError;
pub use store::{ConversationStore, HistoryStore};
pub use types::{HistoryEntry, TurnRole};
