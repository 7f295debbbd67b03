pub mod agents;
pub mod auth;
pub mod chat;
pub mod health;
pub mod inbox;
pub mod monitor;
pub mod setup;
pub mod webhook;
