use std::time::Instant;

use super::{histogram_page, AnalysisError, Analyzed, Result};
use crate::{
    config::AnalysisConfig,
    exposure::RawExposure,
    gain::{Channel, GainMode},
    measurements::MeasurementSet,
    ptc::{PtcFitter, PtcSample},
    reducer::{FrameReducer, ReducedFrame},
    report::{Page, PtcCurve, PtcPage},
};

/// Flat field exposures of a gain mode, with increasing exposure times
#[derive(Debug, Clone)]
pub struct FlatRamp {
    pub gain: GainMode,
    pub exposures: Vec<RawExposure>,
}
impl FlatRamp {
    pub fn new(gain: GainMode, exposures: Vec<RawExposure>) -> Self {
        Self { gain, exposures }
    }
}

/// Reduced flat ramp of a channel
struct ChannelRamp {
    channel: Channel,
    sample: PtcSample,
    mid_range: (f64, ReducedFrame),
    saturated: (f64, ReducedFrame),
}

/// Linearity, well depth and conversion gain from the flat field ramps
pub struct FlatAnalysis<'a> {
    config: &'a AnalysisConfig,
}
impl<'a> FlatAnalysis<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }
    fn reduce(&self, channel: Channel, exposures: &[&RawExposure]) -> Result<ChannelRamp> {
        let reducer = FrameReducer::new().maybe_roi(self.config.roi);
        let longest = exposures
            .iter()
            .map(|exposure| exposure.exp_time)
            .fold(f64::NEG_INFINITY, f64::max);
        let mut sample = PtcSample::new();
        let mut mid_range = None;
        let mut saturated = None;
        for exposure in exposures {
            let reduced = reducer.reduce(&exposure.channel_frames(channel))?;
            sample.push(exposure.exp_time, reduced.median_value, reduced.variance);
            let is_saturated = saturated.is_none() && exposure.exp_time == longest;
            if mid_range.is_none() && self.config.is_mid_range(reduced.median_value) {
                mid_range = Some((exposure.exp_time, reduced.clone()));
            }
            if is_saturated {
                saturated = Some((exposure.exp_time, reduced));
            }
        }
        let mid_range = mid_range.ok_or_else(|| AnalysisError::DataInsufficiency {
            channel,
            what: format!(
                "a flat exposure with a median signal within ({}, {}) ADU",
                self.config.mid_range.0, self.config.mid_range.1
            ),
        })?;
        let saturated = saturated.ok_or_else(|| AnalysisError::DataInsufficiency {
            channel,
            what: String::from("a saturated flat exposure"),
        })?;
        Ok(ChannelRamp {
            channel,
            sample,
            mid_range,
            saturated,
        })
    }
    /// Analyzes the flat ramps of the gain modes
    ///
    /// The well depth and the conversion gain of every channel are recorded,
    /// the gain converting the channel quantities to electrons.
    pub fn analyze(&self, ramps: &[FlatRamp], mut measurements: MeasurementSet) -> Result<Analyzed> {
        let now = Instant::now();
        let mut channel_ramps = vec![];
        for ramp in ramps {
            if ramp.exposures.is_empty() {
                log::warn!("no flat exposure for gain mode {}, skipping", ramp.gain);
                continue;
            }
            let mut exposures: Vec<_> = ramp.exposures.iter().collect();
            exposures.sort_by(|a, b| a.exp_time.total_cmp(&b.exp_time));
            for &channel in ramp.gain.channels() {
                log::info!("reducing {} flat exposures of channel {channel}", exposures.len());
                channel_ramps.push(self.reduce(channel, &exposures)?);
            }
        }
        if channel_ramps.is_empty() {
            return Ok((measurements, vec![]));
        }

        let mut pages = vec![];
        for ramp in &channel_ramps {
            let (exp_time, reduced) = &ramp.mid_range;
            let label = ramp.channel.label();
            pages.push(histogram_page(
                format!("Mid-range flat frame - gain: {label}"),
                format!(
                    "Gain mode: {label}\nIlluminated {exp_time}s exposure\nMin pixel value: {} ADU; max pixel value: {} ADU\nMedian pixel value: {} ADU",
                    reduced.min_value, reduced.max_value, reduced.median_value
                ),
                reduced,
            ));
        }
        for ramp in &channel_ramps {
            let (exp_time, reduced) = &ramp.saturated;
            let label = ramp.channel.label();
            let threshold = self.config.saturation_threshold;
            let n_bad = reduced.count_below(threshold);
            pages.push(histogram_page(
                format!("Well depth (saturated flat frame) - gain: {label}"),
                format!(
                    "Gain mode: {label}\nIlluminated {exp_time}s exposure\nMin pixel value: {} ADU; max pixel value: {} ADU\nMedian pixel value: {} ADU\nPixels < {threshold} ADU: {n_bad}, {:.3}%",
                    reduced.min_value,
                    reduced.max_value,
                    reduced.median_value,
                    reduced.percent(n_bad)
                ),
                reduced,
            ));
            measurements = measurements.with_well_depth(ramp.channel, reduced.median_value);
        }

        let fitter = PtcFitter::from(self.config);
        let mut curves = vec![];
        for ramp in channel_ramps {
            let fit = fitter.fit(&ramp.sample)?;
            log::info!("{}: gain {:.3} e-/ADU", ramp.channel, fit.gain);
            measurements = measurements.with_gain(ramp.channel, fit.gain);
            curves.push(PtcCurve {
                label: ramp.channel.label().to_string(),
                sample: ramp.sample,
                fit,
            });
        }
        pages.push(Page::Ptc(PtcPage {
            title: String::from("Linearity and photon transfer curves"),
            curves,
        }));
        log::info!("flat analysis done in {}ms", now.elapsed().as_millis());
        Ok((measurements, pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::Unit;
    use approx::assert_relative_eq;
    use chrono::DateTime;
    use nalgebra::DMatrix;

    /// Exposure which two frames are `signal -/+ sqrt(variance)`
    fn flat(gain: GainMode, exp_time: f64, signal: f64, variance: f64) -> RawExposure {
        let date = DateTime::from_timestamp(0, 0).unwrap().naive_utc();
        let d = variance.sqrt();
        let frames = [signal - d, signal + d]
            .into_iter()
            .map(|value| {
                gain.channels()
                    .iter()
                    .map(|_| DMatrix::from_element(2, 3, value))
                    .collect()
            })
            .collect();
        RawExposure::new(gain, exp_time, date, frames).unwrap()
    }

    /// Ramp of 500 ADU/s with a shot noise of gain `k` and a noise floor of 4 ADU^2,
    /// saturating at 20000 ADU
    fn ramp(gain: GainMode, k: f64) -> FlatRamp {
        let mut exp_times = vec![40., 0., 0.01];
        exp_times.extend((1..=35).map(|i| i as f64));
        let exposures = exp_times
            .into_iter()
            .map(|t| {
                let signal = (500. * t).min(20000.);
                flat(gain, t, signal, signal / k + 4.)
            })
            .collect();
        FlatRamp::new(gain, exposures)
    }

    #[test]
    fn conversion_gain_and_well_depth() {
        let config = AnalysisConfig::default();
        let (measurements, pages) = FlatAnalysis::new(&config)
            .analyze(&[ramp(GainMode::High, 2.)], MeasurementSet::new())
            .unwrap();
        let k = measurements.gain(Channel::High).unwrap();
        assert_relative_eq!(k, 2., max_relative = 0.01);
        let well_depth = measurements.well_depth(Channel::High).unwrap();
        assert_eq!(well_depth.unit, Unit::Electron);
        assert_relative_eq!(well_depth.value, 20000. * k, max_relative = 1e-9);

        assert_eq!(pages.len(), 3);
        let Page::Histogram(mid) = &pages[0] else {
            panic!("expected a histogram page")
        };
        assert_eq!(mid.title, "Mid-range flat frame - gain: high");
        assert!(mid.caption.contains("Illuminated 11s exposure"));
        let Page::Histogram(saturated) = &pages[1] else {
            panic!("expected a histogram page")
        };
        assert!(saturated.caption.contains("Illuminated 40s exposure"));
        assert!(saturated.caption.ends_with("Pixels < 5000 ADU: 0, 0.000%"));
        assert!(matches!(&pages[2], Page::Ptc(page) if page.curves.len() == 1));
    }

    #[test]
    fn hdr_ramp_yields_two_channels() {
        let config = AnalysisConfig::default();
        let (measurements, pages) = FlatAnalysis::new(&config)
            .analyze(
                &[ramp(GainMode::Hdr, 1.5), FlatRamp::new(GainMode::Low, vec![])],
                MeasurementSet::new(),
            )
            .unwrap();
        assert_eq!(
            measurements.channels().collect::<Vec<_>>(),
            vec![Channel::DualHigh, Channel::DualLow]
        );
        assert_eq!(pages.len(), 5);
        assert_eq!(pages[1].title(), "Mid-range flat frame - gain: low (dual-gain)");
    }

    #[test]
    fn second_run_does_not_convert_twice() {
        let config = AnalysisConfig::default();
        let analysis = FlatAnalysis::new(&config);
        let measurements = MeasurementSet::new().with_read_noise(Channel::Low, 3.);
        let (once, _) = analysis
            .analyze(&[ramp(GainMode::Low, 2.5)], measurements)
            .unwrap();
        let (twice, _) = analysis
            .analyze(&[ramp(GainMode::Low, 2.5)], once.clone())
            .unwrap();
        assert_eq!(once, twice);
        let k = once.gain(Channel::Low).unwrap();
        assert_relative_eq!(once.read_noise(Channel::Low).unwrap().value, 3. * k);
    }

    /// Ramp which only exposure above 4500 ADU below saturation has a median of `signal`
    fn single_candidate_ramp(signal: f64) -> FlatRamp {
        let mut exposures: Vec<_> = (1..=9)
            .map(|i| {
                let t = i as f64;
                flat(GainMode::High, t, 500. * t, 250. * t + 4.)
            })
            .collect();
        exposures.push(flat(GainMode::High, 30., signal, 4096.));
        exposures.push(flat(GainMode::High, 40., 20000., 10.));
        FlatRamp::new(GainMode::High, exposures)
    }

    #[test]
    fn mid_range_upper_bound_is_excluded() {
        let config = AnalysisConfig::default();
        let analysis = FlatAnalysis::new(&config);
        assert!(matches!(
            analysis.analyze(&[single_candidate_ramp(15000.)], MeasurementSet::new()),
            Err(AnalysisError::DataInsufficiency {
                channel: Channel::High,
                ..
            })
        ));
        let (_, pages) = analysis
            .analyze(&[single_candidate_ramp(14999.5)], MeasurementSet::new())
            .unwrap();
        let Page::Histogram(mid) = &pages[0] else {
            panic!("expected a histogram page")
        };
        assert!(mid.caption.contains("Illuminated 30s exposure"));
        assert!(mid.caption.ends_with("Median pixel value: 14999.5 ADU"));
    }

    #[test]
    fn missing_mid_range_exposure() {
        let config = AnalysisConfig::default();
        let exposures = (1..=5)
            .map(|i| flat(GainMode::High, i as f64, 100. * i as f64, 50.))
            .collect();
        let result = FlatAnalysis::new(&config)
            .analyze(&[FlatRamp::new(GainMode::High, exposures)], MeasurementSet::new());
        assert!(matches!(
            result,
            Err(AnalysisError::DataInsufficiency {
                channel: Channel::High,
                ..
            })
        ));
    }
}
