//! Types shared by the botyard crates.

pub mod errors;

pub use errors::{BotyardError, BotyardResult};
