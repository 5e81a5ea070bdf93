//! Standard analyses of the bias, dark and flat conditions
//!
//! Every analysis consumes the [MeasurementSet] recorded so far and returns the
//! updated set together with the report pages of its section.

use crate::{
    exposure::ExposureError,
    gain::Channel,
    measurements::MeasurementSet,
    ptc::PtcError,
    reducer::{ReduceError, ReducedFrame},
    report::{HistogramPage, Page},
};

mod bias;
mod dark;
mod flat;
pub use bias::BiasAnalysis;
pub use dark::{DarkAcquisition, DarkAnalysis, DarkMode};
pub use flat::{FlatAnalysis, FlatRamp};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("failed to load the exposures")]
    Exposure(#[from] ExposureError),
    #[error("failed to reduce the frames")]
    Reduce(#[from] ReduceError),
    #[error("failed to fit the photon transfer curve")]
    Fit(#[from] PtcError),
    #[error("{what} is missing for channel {channel}")]
    DataInsufficiency { channel: Channel, what: String },
    #[error("exposure has no {channel} pixel array")]
    MissingChannel { channel: Channel },
}
type Result<T> = std::result::Result<T, AnalysisError>;

/// Updated measurements and the pages of an analysis
pub type Analyzed = (MeasurementSet, Vec<Page>);

/// Histogram page of the median frame of a [ReducedFrame]
fn histogram_page(title: String, caption: String, reduced: &ReducedFrame) -> Page {
    Page::Histogram(HistogramPage {
        title,
        caption,
        data: reduced.median_frame.clone(),
    })
}
