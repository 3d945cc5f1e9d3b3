//! Storage: SQLite repository, media blobs and settings

pub mod database;
pub mod entities;
pub mod media;
pub mod repositories;
pub mod settings;
pub mod traits;
