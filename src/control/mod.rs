pub mod coordinator;
pub mod power;
