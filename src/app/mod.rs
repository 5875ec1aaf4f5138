pub mod runner;

pub use runner::{build_driver, RunOptions};
