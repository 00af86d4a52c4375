#[allow(clippy::module_inception)]
mod app;
mod state;

pub use app::{App, AppEvent};
pub use state::{Focus, StoreStatus};
