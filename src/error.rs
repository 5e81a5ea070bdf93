use crate::{
    analysis::AnalysisError, exposure::ExposureError, report::ReportError, scanner::ScanError,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to scan the data directory")]
    Scan(#[from] ScanError),
    #[error("failed to load the exposures")]
    Exposure(#[from] ExposureError),
    #[error("analysis failed")]
    Analysis(#[from] AnalysisError),
    #[error("failed to write the report")]
    Report(#[from] ReportError),
    #[error("failed to write the summary table")]
    Csv(#[from] csv::Error),
}
