pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::AppState;
