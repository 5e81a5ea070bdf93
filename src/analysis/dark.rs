use nalgebra::DMatrix;
use std::{fmt, time::Instant};
use strum_macros::EnumIter;

use super::{histogram_page, AnalysisError, Analyzed, Result};
use crate::{
    config::AnalysisConfig,
    exposure::RawExposure,
    gain::Channel,
    measurements::MeasurementSet,
    reducer::FrameReducer,
    report::{Page, TimeSeriesPage, TimeSeriesPanel},
};

/// Standard operating dark modes
#[derive(EnumIter, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DarkMode {
    Fuv,
    Nuv,
    NuvGuiding,
}
impl DarkMode {
    pub fn name(&self) -> &'static str {
        match self {
            DarkMode::Fuv => "FUVdark",
            DarkMode::Nuv => "NUVdark",
            DarkMode::NuvGuiding => "NUVguidingdark",
        }
    }
    /// Short and long exposure durations [s]
    pub fn durations(&self) -> (f64, f64) {
        match self {
            DarkMode::Fuv => (9., 900.),
            DarkMode::Nuv | DarkMode::NuvGuiding => (3., 300.),
        }
    }
    /// Whether the mode dark current is recorded
    pub fn records_dark_current(&self) -> bool {
        matches!(self, DarkMode::Fuv)
    }
    /// File name prefixes of the (long, short) exposures of every acquisition
    pub fn prefixes(&self, camera: &str, device_id: &str) -> Vec<(String, String)> {
        let mode = self.name();
        match self {
            DarkMode::Fuv | DarkMode::Nuv => {
                let (short, long) = self.durations();
                (0..9)
                    .map(|i| {
                        (
                            format!("{camera}_{device_id}_{mode}{i}_{long}_"),
                            format!("{camera}_{device_id}_{mode}{i}_{short}_"),
                        )
                    })
                    .collect()
            }
            DarkMode::NuvGuiding => (0..3)
                .flat_map(|i| {
                    (0..3).map(move |j| {
                        let prefix = format!("{camera}_{device_id}_{mode}{i}_FullDwell_exp{j}_UVEXNUV");
                        (format!("{prefix}_4"), format!("{prefix}_2"))
                    })
                })
                .collect(),
        }
    }
}
impl fmt::Display for DarkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Long and short dark exposures of one acquisition
#[derive(Debug, Clone)]
pub struct DarkAcquisition {
    pub long: RawExposure,
    pub short: RawExposure,
}

/// One of the four dark frame series of a mode
#[derive(Debug, Clone, Copy)]
struct Series {
    long: bool,
    channel: Channel,
}
impl Series {
    const ALL: [Series; 4] = [
        Series {
            long: false,
            channel: Channel::DualLow,
        },
        Series {
            long: false,
            channel: Channel::DualHigh,
        },
        Series {
            long: true,
            channel: Channel::DualLow,
        },
        Series {
            long: true,
            channel: Channel::DualHigh,
        },
    ];
    fn name(&self) -> String {
        let duration = if self.long { "long" } else { "short" };
        let gain = match self.channel {
            Channel::DualLow | Channel::Low => "low",
            Channel::DualHigh | Channel::High => "high",
        };
        format!("{duration} {gain}-gain")
    }
    fn exposure<'a>(&self, acquisition: &'a DarkAcquisition) -> &'a RawExposure {
        if self.long {
            &acquisition.long
        } else {
            &acquisition.short
        }
    }
    /// First frame of the series channel in every acquisition
    fn frames<'a>(&self, acquisitions: &'a [DarkAcquisition]) -> Result<Vec<(&'a RawExposure, &'a DMatrix<f64>)>> {
        acquisitions
            .iter()
            .map(|acquisition| {
                let exposure = self.exposure(acquisition);
                exposure
                    .frame(0, self.channel)
                    .map(|frame| (exposure, frame))
                    .ok_or(AnalysisError::MissingChannel {
                        channel: self.channel,
                    })
            })
            .collect()
    }
}

/// Dark current and dark frame stability of the standard operating modes
pub struct DarkAnalysis<'a> {
    config: &'a AnalysisConfig,
}
impl<'a> DarkAnalysis<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }
    /// Analyzes the acquisitions of a dark mode
    pub fn analyze(
        &self,
        mode: DarkMode,
        acquisitions: &[DarkAcquisition],
        mut measurements: MeasurementSet,
    ) -> Result<Analyzed> {
        let now = Instant::now();
        let reducer = FrameReducer::new().maybe_roi(self.config.roi);
        let (short, long) = mode.durations();
        let mut pages = vec![];
        let mut panels = vec![];
        for series in Series::ALL {
            let frames = series.frames(acquisitions)?;
            let arrays: Vec<_> = frames.iter().map(|(_, frame)| *frame).collect();
            let reduced = reducer.reduce(&arrays)?;
            let name = series.name();
            let duration = if series.long { long } else { short };
            let caption = format!(
                "Frame: {name}\nMedian of {} x {duration}s exposures\nMin median pixel value: {} ADU; max median pixel value: {} ADU",
                reduced.n_frame, reduced.min_value, reduced.max_value
            );
            pages.push(histogram_page(
                format!("Dark frames - {mode} mode - {name} frame"),
                caption,
                &reduced,
            ));
            if series.long && mode.records_dark_current() {
                let dark_current = reduced.median_value / long;
                log::info!("{mode} {}: dark current {dark_current:.4} ADU/s", series.channel);
                measurements = measurements.with_dark_current(series.channel, dark_current);
            }
            panels.push(self.time_series(name, frames));
        }
        pages.push(Page::TimeSeries(TimeSeriesPage {
            title: format!("Dark frames - {mode} mode - mean over time"),
            panels,
        }));
        log::info!("{mode} analysis done in {}ms", now.elapsed().as_millis());
        Ok((measurements, pages))
    }
    /// Mean signal of the whole chip and of the column segments versus time
    fn time_series(
        &self,
        name: String,
        mut frames: Vec<(&RawExposure, &DMatrix<f64>)>,
    ) -> TimeSeriesPanel {
        frames.sort_by_key(|(exposure, _)| exposure.date);
        let Some(last) = frames.last().map(|(exposure, _)| exposure.date) else {
            return TimeSeriesPanel {
                name,
                ..Default::default()
            };
        };
        let times = frames
            .iter()
            .map(|(exposure, _)| (last - exposure.date).num_milliseconds() as f64 * 1e-3)
            .collect();
        let whole_chip = frames.iter().map(|(_, frame)| frame.mean()).collect();
        let width = self.config.segment_width;
        let n_segment = frames[0].1.ncols().checked_div(width).unwrap_or(0);
        let segments = (0..n_segment)
            .map(|i| {
                frames
                    .iter()
                    .map(|(_, frame)| frame.columns(i * width, width).mean())
                    .collect()
            })
            .collect();
        TimeSeriesPanel {
            name,
            times,
            whole_chip,
            segments,
        }
    }
}
