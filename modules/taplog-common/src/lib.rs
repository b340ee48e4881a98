pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::TaplogError;
pub use types::{CountryMatch, FieldState, PostRecord, VenueRecord, VenueSeed};
