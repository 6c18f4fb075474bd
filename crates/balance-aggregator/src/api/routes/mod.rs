//! API route handlers

pub mod balances;
pub mod health;
pub mod providers;
