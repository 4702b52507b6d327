pub mod app;
pub mod store;

pub use app::AppState;
pub use store::{MetricsSnapshot, Record, Store, StoreOptions};
