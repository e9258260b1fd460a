pub mod assignment;
pub mod error;
pub mod forecast;
pub mod ids;
pub mod model;
pub mod plan;
pub mod trigger;
pub mod types;

pub use assignment::*;
pub use error::*;
pub use forecast::*;
pub use ids::*;
pub use model::*;
pub use plan::*;
pub use trigger::*;
pub use types::*;
