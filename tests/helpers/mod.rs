#![allow(dead_code)]

pub mod app;
pub mod builders;
pub mod db;

pub use app::TestApp;
pub use builders::{CourseBuilder, UserBuilder};
pub use db::TestDb;
