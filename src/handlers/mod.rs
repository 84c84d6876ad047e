// src/handlers/mod.rs

pub mod bank;
pub mod health;
pub mod quiz;
pub mod results;
