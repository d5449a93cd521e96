pub mod owner;
pub mod query;
