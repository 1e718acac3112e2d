pub mod admin;
pub mod config;
pub mod conversation;
pub mod gateway;
pub mod health;
pub mod monitor;
pub mod relay;
pub mod rolling_log;
pub mod system_log;
pub mod upstream;
