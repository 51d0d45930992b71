//! API handlers module

pub mod admin;
pub mod auth;
pub mod health;
pub mod papers;
pub mod payments;
pub mod review;
pub mod webhook;
