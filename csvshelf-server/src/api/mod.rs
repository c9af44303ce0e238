//! HTTP API handlers for csvshelf-server

pub mod health;
pub mod records;
pub mod ui;

pub use health::health_routes;
pub use records::record_routes;
pub use ui::ui_routes;
