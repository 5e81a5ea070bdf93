use std::time::Instant;

use super::{histogram_page, Analyzed, Result};
use crate::{
    config::AnalysisConfig, exposure::RawExposure, measurements::MeasurementSet,
    reducer::FrameReducer,
};

/// Read noise and hot pixels from the minimum-length exposures
pub struct BiasAnalysis<'a> {
    config: &'a AnalysisConfig,
}
impl<'a> BiasAnalysis<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }
    /// Analyzes one bias exposure per gain mode
    pub fn analyze(
        &self,
        exposures: &[RawExposure],
        mut measurements: MeasurementSet,
    ) -> Result<Analyzed> {
        let now = Instant::now();
        let reducer = FrameReducer::new().maybe_roi(self.config.roi);
        let mut pages = vec![];
        for exposure in exposures {
            for &channel in exposure.gain.channels() {
                let reduced = reducer.reduce(&exposure.channel_frames(channel))?;
                let read_noise = reduced.std();
                let n_bad = reduced.count_above(self.config.bias_threshold);
                log::info!("bias {channel}: read noise {read_noise:.2} ADU, {n_bad} hot pixels");
                let caption = format!(
                    "Gain mode: {}\nMedian of {} minimum-length exposures\nMin median pixel value: {} ADU; max median pixel value: {} ADU\nPixels > {} ADU: {}, {:.3}%\nRead noise: {:.2} ADU",
                    channel.label(),
                    reduced.n_frame,
                    reduced.min_value,
                    reduced.max_value,
                    self.config.bias_threshold,
                    n_bad,
                    reduced.percent(n_bad),
                    read_noise
                );
                pages.push(histogram_page(
                    format!("Bias frames - gain: {}", channel.label()),
                    caption,
                    &reduced,
                ));
                measurements = measurements.with_read_noise(channel, read_noise);
            }
        }
        log::info!("bias analysis done in {}ms", now.elapsed().as_millis());
        Ok((measurements, pages))
    }
}
