pub mod config;
pub mod connectors;
pub mod jobs;
pub mod oauth;
pub mod publish;
pub mod session;
pub mod store;
pub mod terminal;
pub mod transcribe;
pub mod vault;
pub mod vendors;
