pub mod config;
pub mod doctor;
pub mod engine;
pub mod runner;
pub mod sink;
pub mod util;

pub use config::*;
pub use doctor::*;
pub use engine::*;
pub use runner::*;
pub use sink::*;
pub use util::*;
