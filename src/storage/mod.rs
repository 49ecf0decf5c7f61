pub mod kv;
pub mod preferences;

pub use kv::*;
pub use preferences::*;
