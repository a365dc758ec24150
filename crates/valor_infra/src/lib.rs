mod completion;
mod env;
mod repository;
mod sandbox;
mod telemetry;

pub use completion::*;
pub use env::*;
pub use repository::*;
pub use sandbox::*;
pub use telemetry::*;
