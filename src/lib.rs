pub mod characters;
pub mod chat;
pub mod cli;
pub mod core;
pub mod gateway;
pub mod markdown;
pub mod storage;
pub mod view;
