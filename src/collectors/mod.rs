pub mod activity;
pub mod topology;
