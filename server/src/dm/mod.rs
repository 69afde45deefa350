//! Direct messages: send/delete, delivery and read receipts, history
//! pages and sidebar summaries.

pub mod history;
pub mod messages;
pub mod receipts;
pub mod sidebar;
