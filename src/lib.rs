//! Campus - training-course management service
//!
//! Courses, providers and participant imports for administrators, attendance
//! and grades for instructors, aggregated reports for reporters.
//! All modules are public so integration tests can drive them directly.

pub mod auth;
pub mod entities;
pub mod errors;
pub mod import;
pub mod jobs;
pub mod jwks;
pub mod reports;
pub mod session;
pub mod settings;
pub mod storage;
pub mod web;
