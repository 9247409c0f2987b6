//! Backend of a personal dashboard: users arrange feed and email widgets into tabs of
//! columns, over one of several storage backends.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod models;
pub mod services;

pub use app::App;
pub use error::{AppError, Result};
