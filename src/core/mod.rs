pub mod config;
pub mod graph;
pub mod lifecycle;
pub mod llm;
pub mod minutes;
pub mod oauth;
pub mod store;
pub mod terminal;
pub mod vault;
pub mod workflow;
