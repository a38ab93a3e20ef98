pub mod brain;
pub mod config;
pub mod llm;
pub mod sql;
pub mod store;
pub mod terminal;
