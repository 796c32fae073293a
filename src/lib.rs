//! Worklog Engine library crate.
//!
//! This crate records employee work, computes remuneration (including a
//! pro-rata split between collaborators) and gates the application
//! behind a license/demo state machine.  External applications may call
//! into [`engine`] and [`license`] directly or embed the HTTP API via
//! [`api::router`].

pub mod api;
pub mod clock;
pub mod config;
pub mod encoding;
pub mod engine;
pub mod identity;
pub mod license;
pub mod models;
pub mod records;
pub mod reports;
pub mod roles;
pub mod storage;
pub mod validation;
