pub mod api;
pub mod error;
pub mod forms;
pub mod models;
