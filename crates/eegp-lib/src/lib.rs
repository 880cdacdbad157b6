pub mod epochs;
pub mod error;
pub mod experiment;
pub mod features;
pub mod io;
pub mod montage;
pub mod plot;
pub mod preprocessing;
pub mod signal;
pub mod spectrum;

pub use error::{Error, Result};
pub use experiment::*;
pub use signal::*;
