pub mod error;
pub mod fetch;
pub mod logging;
pub mod process;
pub mod schema;

pub use error::{Result, SodError};
