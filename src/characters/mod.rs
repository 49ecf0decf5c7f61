pub mod db;
pub mod directory;
pub mod models;
pub mod prompt;

pub use db::*;
pub use directory::*;
pub use models::*;
pub use prompt::compose_character_prompt;
