mod file_repository;
mod model;
mod redis_repository;

pub use file_repository::*;
pub use model::*;
pub use redis_repository::*;
