pub mod interaction;
pub mod source;
pub mod sync_history;
