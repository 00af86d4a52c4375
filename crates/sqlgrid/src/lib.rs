pub mod app;
pub mod clipboard;
pub mod config;
pub mod context;
pub mod edit;
pub mod export;
pub mod history;
pub mod logging;
pub mod query;
pub mod server;
pub mod store;
pub mod ui;
pub mod util;
pub mod window;
