pub mod event_log;
pub mod human;
pub mod shutdown;
pub mod slot;
