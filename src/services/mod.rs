// 服务层模块
pub mod auth;
pub mod garak_runner;
pub mod probe_parser;
pub mod scan_service;
pub mod scan_tracker;

pub use auth::AuthService;
pub use garak_runner::{GarakError, GarakRunner};
pub use probe_parser::parse_probe_listing;
pub use scan_service::ScanService;
pub use scan_tracker::ScanTracker;
