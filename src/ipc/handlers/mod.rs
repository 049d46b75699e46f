pub mod backend;
pub mod chat;
pub mod core;
pub mod datasets;
pub mod learners;
pub mod models;
pub mod predictions;
pub mod setup;
pub mod suggestions;
pub mod tasks;
