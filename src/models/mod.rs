pub mod array;
pub mod power;
