// src/models/mod.rs
pub mod admin;
pub mod auth;
pub mod chat;
