pub mod config;
pub mod document;
pub mod entities;
pub mod error;
pub mod index;
pub mod logging;
pub mod migration;
pub mod money;
pub mod notifications;
pub mod paths;
pub mod reconciliation;
pub mod store;
pub mod wallet;
