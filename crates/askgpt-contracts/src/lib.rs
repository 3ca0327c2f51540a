pub mod events;
pub mod images;
pub mod memo;
pub mod messages;
pub mod payload;
pub mod qa_log;
pub mod shell;
