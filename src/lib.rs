//! Client for the Vibe Check classroom check-in service: releases and redeems
//! check-in codes, records student moods, and aggregates the teacher dashboard.

pub mod aggregate;
pub mod api;
pub mod cancel;
pub mod code_store;
pub mod config;
pub mod error;
pub mod forms;
pub mod guard;
pub mod import;
pub mod models;
pub mod report;
pub mod schema;
pub mod session;
