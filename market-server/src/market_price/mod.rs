mod entity;
mod repo;

pub use entity::*;
pub use repo::*;
