//! Service layer wiring the pipeline together.

mod monitor;

pub use monitor::{Monitor, RootGroup};
