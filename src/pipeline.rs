//! Standard analysis products of a data directory

use std::{
    path::{Path, PathBuf},
    time::Instant,
};
use strum::IntoEnumIterator;

use crate::{
    analysis::{BiasAnalysis, DarkAcquisition, DarkAnalysis, DarkMode, FlatAnalysis, FlatRamp},
    config::AnalysisConfig,
    exposure::ExposureSource,
    gain::GainMode,
    measurements::MeasurementSet,
    report::{Page, Report, TitlePage},
    scanner::Conditions,
    Error,
};

type Result<T> = std::result::Result<T, Error>;

/// Report and measurements of a data directory
#[derive(Debug, Clone)]
pub struct AnalysisProducts {
    pub conditions: Conditions,
    pub measurements: MeasurementSet,
    pub report: Report,
}
impl AnalysisProducts {
    /// `{camera}_{device}_analysis_report.pdf` inside `dir`
    pub fn report_path<P: AsRef<Path>>(&self, dir: P) -> PathBuf {
        dir.as_ref()
            .join(format!("{}_analysis_report.pdf", self.conditions.prefix()))
    }
    /// `{camera}_{device}_summary.csv` inside `dir`
    pub fn summary_path<P: AsRef<Path>>(&self, dir: P) -> PathBuf {
        dir.as_ref()
            .join(format!("{}_summary.csv", self.conditions.prefix()))
    }
    /// Writes the report and the summary table into `dir`
    ///
    /// Returns the path to the report.
    pub fn write<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        let report = self.report.write_pdf(self.report_path(dir))?;
        if !self.measurements.is_empty() {
            let path = self.summary_path(dir);
            self.measurements.to_csv(&path)?;
            log::info!("summary table written to {:?}", path);
        }
        Ok(report)
    }
}

/// Runs the standard analyses of a data directory
pub struct StandardAnalysis<'a, S: ExposureSource + ?Sized> {
    dir: PathBuf,
    source: &'a S,
    config: AnalysisConfig,
}
impl<'a, S: ExposureSource + ?Sized> StandardAnalysis<'a, S> {
    pub fn new<P: AsRef<Path>>(dir: P, source: &'a S) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            source,
            config: Default::default(),
        }
    }
    pub fn config(self, config: AnalysisConfig) -> Self {
        Self { config, ..self }
    }
    fn title_page(&self, conditions: &Conditions) -> Result<TitlePage> {
        let first = self.source.load_name(&self.dir, &conditions.first_file)?;
        Ok(TitlePage {
            camera: conditions.camera.clone(),
            device_id: conditions.device_id.clone(),
            dev_size: first.dev_size(),
            date: conditions.date.clone(),
            firmware: first.firmware.clone(),
            temperature: first.temperature,
            generated: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            bias: conditions.bias,
            dark: conditions.dark,
            flat: conditions.flat,
        })
    }
    fn bias(&self, conditions: &Conditions, measurements: MeasurementSet) -> Result<(MeasurementSet, Vec<Page>)> {
        let prefix = format!("{}_bias", conditions.prefix());
        let exposures = self.source.load_by_prefix(&self.dir, &prefix)?;
        if exposures.is_empty() {
            log::warn!("no bias exposure with prefix {prefix}, skipping");
            return Ok((measurements, vec![]));
        }
        Ok(BiasAnalysis::new(&self.config).analyze(&exposures, measurements)?)
    }
    fn dark(&self, conditions: &Conditions, mut measurements: MeasurementSet) -> Result<(MeasurementSet, Vec<Page>)> {
        let analysis = DarkAnalysis::new(&self.config);
        let mut pages = vec![];
        for mode in DarkMode::iter() {
            log::info!("loading {mode} exposures ...");
            let acquisitions = mode
                .prefixes(&conditions.camera, &conditions.device_id)
                .into_iter()
                .map(|(long, short)| -> Result<DarkAcquisition> {
                    Ok(DarkAcquisition {
                        long: self.source.load_first(&self.dir, &long)?,
                        short: self.source.load_first(&self.dir, &short)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let (updated, mode_pages) = analysis.analyze(mode, &acquisitions, measurements)?;
            measurements = updated;
            pages.extend(mode_pages);
        }
        Ok((measurements, pages))
    }
    fn flat(&self, conditions: &Conditions, measurements: MeasurementSet) -> Result<(MeasurementSet, Vec<Page>)> {
        let ramps = GainMode::iter()
            .map(|gain| -> Result<FlatRamp> {
                let prefix = format!("{}_flat_{gain}", conditions.prefix());
                Ok(FlatRamp::new(gain, self.source.load_by_prefix(&self.dir, &prefix)?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(FlatAnalysis::new(&self.config).analyze(&ramps, measurements)?)
    }
    /// Scans the data directory and runs the analyses of the conditions found
    pub fn run(&self) -> Result<AnalysisProducts> {
        let now = Instant::now();
        let conditions = Conditions::scan(&self.dir, self.source)?;
        let mut report = Report::new();
        report.push(Page::Title(self.title_page(&conditions)?));

        let mut measurements = MeasurementSet::new();
        if conditions.bias {
            let (updated, pages) = self.bias(&conditions, measurements)?;
            measurements = updated;
            report.extend(pages);
        }
        if conditions.dark {
            let (updated, pages) = self.dark(&conditions, measurements)?;
            measurements = updated;
            report.extend(pages);
        }
        if conditions.flat {
            let (updated, pages) = self.flat(&conditions, measurements)?;
            measurements = updated;
            report.extend(pages);
        }
        if conditions.bias && conditions.dark && conditions.flat {
            report.push(Page::Summary(measurements.summary()));
        }
        log::info!(
            "{}: {} report pages in {}s",
            conditions.prefix(),
            report.len(),
            now.elapsed().as_secs()
        );
        Ok(AnalysisProducts {
            conditions,
            measurements,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exposure::{write_archive, MemorySource, NpzLoader, RawExposure},
        gain::Channel,
        measurements::Unit,
        scanner::ScanError,
    };
    use approx::assert_relative_eq;
    use chrono::DateTime;
    use nalgebra::DMatrix;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    const SHAPE: (usize, usize) = (4, 8);

    fn exposure(gain: GainMode, exp_time: f64, timestamp: i64, frames: Vec<f64>) -> RawExposure {
        let date = DateTime::from_timestamp(timestamp, 0).unwrap().naive_utc();
        let frames = frames
            .into_iter()
            .map(|value| {
                gain.channels()
                    .iter()
                    .map(|_| DMatrix::from_element(SHAPE.0, SHAPE.1, value))
                    .collect()
            })
            .collect();
        RawExposure::new(gain, exp_time, date, frames).unwrap()
    }

    fn noisy_bias(rng: &mut StdRng, n_frame: usize) -> RawExposure {
        let normal = Normal::new(10., 2.).unwrap();
        let date = DateTime::from_timestamp(0, 0).unwrap().naive_utc();
        let frames = (0..n_frame)
            .map(|_| {
                (0..2)
                    .map(|_| DMatrix::from_fn(SHAPE.0, SHAPE.1, |_, _| normal.sample(rng)))
                    .collect()
            })
            .collect();
        RawExposure::new(GainMode::Hdr, 0., date, frames)
            .unwrap()
            .temperature(141.)
    }

    fn add_bias(source: &mut MemorySource) {
        let mut rng = StdRng::seed_from_u64(42);
        source.insert("cmost_d42_bias_hdr_20240413T100000.npz", noisy_bias(&mut rng, 5));
    }

    fn add_darks(source: &mut MemorySource, value: f64) {
        for mode in DarkMode::iter() {
            let (short, long) = mode.durations();
            for (i, (long_prefix, short_prefix)) in mode.prefixes("cmost", "d42").into_iter().enumerate() {
                let t = 1000 * i as i64;
                source.insert(
                    format!("{long_prefix}_20240413T100000.npz"),
                    exposure(GainMode::Hdr, long, t, vec![value]),
                );
                source.insert(
                    format!("{short_prefix}_20240413T100000.npz"),
                    exposure(GainMode::Hdr, short, t + 900, vec![value]),
                );
            }
        }
    }

    /// Flat ramp of 500 ADU/s with a shot noise of gain `k`, saturating at 20000 ADU
    fn add_flats(source: &mut MemorySource, gain: GainMode, k: f64) {
        let mut exp_times = vec![0.01];
        exp_times.extend((1..=40).map(|i| i as f64));
        for t in exp_times {
            let signal = (500. * t).min(20000.);
            let d = (signal / k + 2.).sqrt();
            source.insert(
                format!("cmost_d42_flat_{gain}_{t:06.2}s_20240413T100000.npz"),
                exposure(gain, t, 0, vec![signal - d, signal + d]),
            );
        }
    }

    #[test]
    fn bias_only() {
        let mut source = MemorySource::new();
        add_bias(&mut source);
        let products = StandardAnalysis::new("data", &source).run().unwrap();
        assert_eq!(products.conditions.date, "2024-04-13");
        assert!(products.measurements.read_noise(Channel::DualHigh).is_some());
        assert!(products.measurements.read_noise(Channel::DualLow).is_some());
        let bias_pages: Vec<_> = products.report.pages_titled("Bias frames").collect();
        assert_eq!(bias_pages.len(), 2);
        assert!(bias_pages.iter().all(|page| page.is_histogram()));
        // title page only, no summary table
        assert_eq!(products.report.len(), 3);
        let Page::Title(title) = &products.report.pages()[0] else {
            panic!("expected the title page")
        };
        assert_eq!(title.temperature, Some(141.));
        assert_eq!(title.dev_size, (SHAPE.1, SHAPE.0));
    }

    #[test]
    fn bias_only_from_npz_archives() {
        let dir = std::env::temp_dir().join("sensor-report-pipeline-npz");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let shape = [5, 2, SHAPE.0 as u64, SHAPE.1 as u64];
        let n = shape.iter().product::<u64>() as usize;
        let reset = vec![100u16; n];
        let signal: Vec<u16> = (0..n).map(|i| 110 + (i % 7) as u16).collect();
        write_archive(
            &dir.join("cmost_d42_bias_hdr_20240413T100000.npz"),
            (&shape, &reset),
            (&shape, &signal),
            0.,
            1_712_966_400.,
            Some((141., 2)),
        )
        .unwrap();

        let loader = NpzLoader::new().unwrap();
        let products = StandardAnalysis::new(&dir, &loader).run().unwrap();
        assert_eq!(products.report.len(), 3);
        assert!(products.measurements.read_noise(Channel::DualLow).is_some());
        let Page::Title(title) = &products.report.pages()[0] else {
            panic!("expected the title page")
        };
        assert_eq!(title.dev_size, (SHAPE.1, SHAPE.0));
        assert_eq!(title.temperature, Some(141.));
        assert_eq!(title.firmware.as_deref(), Some("2"));
    }

    #[test]
    fn dark_current_before_gain_conversion() {
        let mut source = MemorySource::new();
        add_darks(&mut source, 27.);
        let products = StandardAnalysis::new("data", &source).run().unwrap();
        for channel in [Channel::DualLow, Channel::DualHigh] {
            let dark_current = products.measurements.dark_current(channel).unwrap();
            assert_eq!(dark_current.unit, Unit::Adu);
            assert_relative_eq!(dark_current.value, 27. / 900.);
        }
        // 4 histograms and 1 time series per mode
        assert_eq!(products.report.pages_titled("Dark frames").count(), 15);
    }

    #[test]
    fn missing_dark_acquisition_aborts() {
        let mut source = MemorySource::new();
        add_darks(&mut source, 27.);
        let source: MemorySource = source
            .list(Path::new("data"))
            .unwrap()
            .into_iter()
            .filter(|name| !name.starts_with("cmost_d42_NUVdark4_300_"))
            .map(|name| {
                let exposure = source.load_name(Path::new("data"), &name).unwrap();
                (name, exposure)
            })
            .collect();
        assert!(matches!(
            StandardAnalysis::new("data", &source).run(),
            Err(Error::Exposure(_))
        ));
    }

    #[test]
    fn full_report() {
        let mut source = MemorySource::new();
        add_bias(&mut source);
        add_darks(&mut source, 27.);
        add_flats(&mut source, GainMode::Hdr, 1.8);
        add_flats(&mut source, GainMode::Low, 3.5);
        let products = StandardAnalysis::new("data", &source).run().unwrap();
        let measurements = &products.measurements;

        let k = measurements.gain(Channel::DualHigh).unwrap();
        assert_relative_eq!(k, 1.8, max_relative = 0.01);
        assert_relative_eq!(measurements.gain(Channel::Low).unwrap(), 3.5, max_relative = 0.01);
        let read_noise = measurements.read_noise(Channel::DualHigh).unwrap();
        assert_eq!(read_noise.unit, Unit::Electron);
        let dark_current = measurements.dark_current(Channel::DualHigh).unwrap();
        assert_relative_eq!(dark_current.value, 27. / 900. * k);

        // title, bias, dark, flat (3 mid-range, 3 well depth, 1 PTC) and summary pages
        let pages = products.report.pages();
        assert_eq!(pages.len(), 1 + 2 + 15 + 7 + 1);
        assert_eq!(products.report.pages_titled("Mid-range flat frame").count(), 3);
        let Some(Page::Summary(rows)) = pages.last() else {
            panic!("expected the summary table")
        };
        let labels: Vec<_> = rows.iter().map(|row| row.gain_mode.as_str()).collect();
        assert_eq!(labels, vec!["high (dual-gain)", "low (dual-gain)", "low"]);
        let cells = rows[2].cells();
        assert!(cells[2].is_empty() && cells[3].is_empty());
        assert!(!cells[1].is_empty() && !cells[4].is_empty());
    }

    #[test]
    fn empty_directory() {
        let source = MemorySource::new();
        assert!(matches!(
            StandardAnalysis::new("data", &source).run(),
            Err(Error::Scan(ScanError::DirectoryEmpty(_)))
        ));
    }

    #[test]
    fn output_paths() {
        let mut source = MemorySource::new();
        add_bias(&mut source);
        let products = StandardAnalysis::new("data", &source).run().unwrap();
        assert_eq!(
            products.report_path("data"),
            Path::new("data/cmost_d42_analysis_report.pdf")
        );
        assert_eq!(products.summary_path("data"), Path::new("data/cmost_d42_summary.csv"));
    }
}
