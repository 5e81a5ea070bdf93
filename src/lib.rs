//! # Imaging sensor characterization report
//!
//! Reduces the bias, dark and flat field exposures of a detector test campaign
//! into the detector read noise, dark current, conversion gain and well depth,
//! and writes a report with the frame statistics of every test condition.
//!
//! The analyses are run with [StandardAnalysis] over an [ExposureSource],
//! either the [NpzLoader] of the `.npz` frame files or a [MemorySource]:
//! ```no_run
//! use sensor_report::{NpzLoader, StandardAnalysis};
//!
//! let loader = NpzLoader::new()?;
//! let products = StandardAnalysis::new("data", &loader).run()?;
//! products.write("data")?;
//! # Ok::<(), sensor_report::Error>(())
//! ```

pub mod analysis;
pub mod config;
mod error;
pub mod exposure;
pub mod gain;
pub mod measurements;
pub mod pipeline;
pub mod ptc;
pub mod reducer;
pub mod report;
pub mod scanner;

pub use config::AnalysisConfig;
pub use error::Error;
pub use exposure::{ExposureSource, MemorySource, NpzLoader, RawExposure, Roi};
pub use gain::{Channel, GainMode};
pub use measurements::MeasurementSet;
pub use pipeline::{AnalysisProducts, StandardAnalysis};
pub use reducer::{FrameReducer, ReducedFrame};
pub use report::Report;
pub use scanner::Conditions;
