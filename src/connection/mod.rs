mod core;
mod exec;
mod tx;

pub use core::{Connection, ConnectionState};
