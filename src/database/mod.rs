pub mod link;
pub mod redis_connection;

pub use link::*;
pub use redis_connection::*;
