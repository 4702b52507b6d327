//! Key-value service with two front doors.
//!
//! - the **public** API on a TCP port, which never reveals or accepts keys
//!   starting with `_` (see [`policy`]);
//! - the **admin** API on a local Unix socket, which sees everything and can
//!   reset the data.
//!
//! Both share one SQLite-backed [`state::Store`], so any number of worker
//! processes observe the same records and request counter.

pub mod app;
pub mod cli;
pub mod config;
pub mod errors;
pub mod policy;
pub mod routes;
pub mod server;
pub mod services;
pub mod state;
pub mod supervisor;
pub mod transport;
