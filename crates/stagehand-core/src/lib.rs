pub mod backoff;
pub mod config;
pub mod db;
pub mod error;
pub mod io;
pub mod lock;
pub mod marker;
pub mod migrate;
pub mod orchestrator;
pub mod probe;
pub mod runner;
pub mod seed;
pub mod server;
pub mod status;

pub use error::{Result, StagehandError};
