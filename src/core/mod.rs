pub mod errors;
pub mod history;
pub mod locks;
pub mod models;
pub mod orchestrator;
pub mod text;
pub mod traits;
