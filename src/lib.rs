//! Region-of-interest extraction and housekeeping for FSL FEAT analyses of
//! BIDS-named fMRI runs.

pub mod error;
pub use error::{Error, Result};

pub use entities;

pub mod volume;
pub mod roi;
pub mod discover;
pub mod extract;
pub mod fsl;
pub mod registration;
pub mod reglog;
pub mod events;
pub mod design;
pub mod group;
pub mod preprocess;
pub mod config;
pub mod utils;
