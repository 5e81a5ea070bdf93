//! Calibration exposures and the sources they are loaded from

use chrono::NaiveDateTime;
use nalgebra::DMatrix;
use std::{io, path::Path};

use crate::gain::{Channel, GainMode};

mod memory;
mod npz;
pub use memory::MemorySource;
pub use npz::NpzLoader;
#[cfg(test)]
pub(crate) use npz::write_archive;

#[derive(Debug, thiserror::Error)]
pub enum ExposureError {
    #[error("failed to read {0}")]
    Io(String, #[source] io::Error),
    #[error("invalid file name pattern")]
    Regex(#[from] regex::Error),
    #[error("invalid file pattern")]
    Pattern(#[from] glob::PatternError),
    #[error("failed to list directory entries")]
    Glob(#[from] glob::GlobError),
    #[error("no exposure found with prefix {0:?}")]
    Missing(String),
    #[error("array {name:?} is missing from {file}")]
    MissingArray { file: String, name: String },
    #[error("array {name:?} of {file} has shape {shape:?}, expected {expected}")]
    Shape {
        file: String,
        name: String,
        shape: Vec<u64>,
        expected: String,
    },
    #[error("no gain mode token in {0}")]
    GainToken(String),
    #[error("invalid acquisition timestamp {0}")]
    Timestamp(f64),
    #[error("exposure has no frame")]
    Empty,
    #[error("exposure frames have {found} channel(s), gain mode {mode} expects {expected}")]
    Channels {
        mode: GainMode,
        found: usize,
        expected: usize,
    },
    #[error("exposure frames have inconsistent shapes")]
    FrameShape,
}
type Result<T> = std::result::Result<T, ExposureError>;

/// Rectangular region of interest, `[x0,x1)` columns by `[y0,y1)` rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x0: usize,
    pub x1: usize,
    pub y0: usize,
    pub y1: usize,
}
impl Roi {
    pub fn new(x0: usize, x1: usize, y0: usize, y1: usize) -> Self {
        Self { x0, x1, y0, y1 }
    }
    /// The whole `width` x `height` frame
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, width, 0, height)
    }
    pub fn width(&self) -> usize {
        self.x1.saturating_sub(self.x0)
    }
    pub fn height(&self) -> usize {
        self.y1.saturating_sub(self.y0)
    }
    pub fn len(&self) -> usize {
        self.width() * self.height()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Checks that the region lies inside a `width` x `height` frame
    pub fn fits(&self, width: usize, height: usize) -> bool {
        !self.is_empty() && self.x1 <= width && self.y1 <= height
    }
}

/// One acquired frame set for a single condition and gain mode
///
/// Each frame holds one correlated double sampled pixel array per readout
/// channel of the gain mode (`[high, low]` for hdr).
/// Pixel arrays are `height` rows by `width` columns.
#[derive(Debug, Clone)]
pub struct RawExposure {
    pub gain: GainMode,
    /// exposure time [s]
    pub exp_time: f64,
    /// acquisition start
    pub date: NaiveDateTime,
    /// sensor temperature [K]
    pub temperature: Option<f64>,
    pub firmware: Option<String>,
    cds_frames: Vec<Vec<DMatrix<f64>>>,
}
impl RawExposure {
    pub fn new(
        gain: GainMode,
        exp_time: f64,
        date: NaiveDateTime,
        cds_frames: Vec<Vec<DMatrix<f64>>>,
    ) -> Result<Self> {
        let first = cds_frames
            .first()
            .and_then(|frame| frame.first())
            .ok_or(ExposureError::Empty)?
            .shape();
        for frame in &cds_frames {
            if frame.len() != gain.n_channel() {
                return Err(ExposureError::Channels {
                    mode: gain,
                    found: frame.len(),
                    expected: gain.n_channel(),
                });
            }
            if frame.iter().any(|array| array.shape() != first) {
                return Err(ExposureError::FrameShape);
            }
        }
        Ok(Self {
            gain,
            exp_time,
            date,
            temperature: None,
            firmware: None,
            cds_frames,
        })
    }
    pub fn temperature(self, temperature: f64) -> Self {
        Self {
            temperature: Some(temperature),
            ..self
        }
    }
    pub fn firmware<S: Into<String>>(self, firmware: S) -> Self {
        Self {
            firmware: Some(firmware.into()),
            ..self
        }
    }
    /// Device size as (width, height)
    pub fn dev_size(&self) -> (usize, usize) {
        let (rows, cols) = self.cds_frames[0][0].shape();
        (cols, rows)
    }
    pub fn n_frame(&self) -> usize {
        self.cds_frames.len()
    }
    /// Full frame region of interest
    pub fn full_roi(&self) -> Roi {
        let (width, height) = self.dev_size();
        Roi::full(width, height)
    }
    /// Pixel array of `channel` in frame # `frame`
    pub fn frame(&self, frame: usize, channel: Channel) -> Option<&DMatrix<f64>> {
        self.cds_frames
            .get(frame)
            .and_then(|arrays| arrays.get(channel.index()))
    }
    /// Pixel arrays of `channel` across all frames
    pub fn channel_frames(&self, channel: Channel) -> Vec<&DMatrix<f64>> {
        self.cds_frames
            .iter()
            .filter_map(|arrays| arrays.get(channel.index()))
            .collect()
    }
}

/// Loader of the exposures stored in a data directory
pub trait ExposureSource {
    /// File names of the frame files in `dir`
    fn list(&self, dir: &Path) -> Result<Vec<String>>;
    /// All the exposures which file name starts with `prefix`, sorted by file name
    fn load_by_prefix(&self, dir: &Path, prefix: &str) -> Result<Vec<RawExposure>>;
    /// Loads the exposures starting with `prefix`, failing if there is none
    fn load_required(&self, dir: &Path, prefix: &str) -> Result<Vec<RawExposure>> {
        let exposures = self.load_by_prefix(dir, prefix)?;
        if exposures.is_empty() {
            Err(ExposureError::Missing(prefix.to_string()))
        } else {
            Ok(exposures)
        }
    }
    /// Loads the first exposure, by file name, starting with `prefix`
    fn load_first(&self, dir: &Path, prefix: &str) -> Result<RawExposure> {
        self.load_required(dir, prefix)?
            .into_iter()
            .next()
            .ok_or_else(|| ExposureError::Missing(prefix.to_string()))
    }
    /// Loads the exposure of the file `name`, as returned by [ExposureSource::list]
    fn load_name(&self, dir: &Path, name: &str) -> Result<RawExposure>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn date() -> NaiveDateTime {
        DateTime::from_timestamp(1_712_966_400, 0).unwrap().naive_utc()
    }

    #[test]
    fn hdr_exposure_has_two_channels() {
        let frame = vec![DMatrix::from_element(4, 6, 1f64), DMatrix::from_element(4, 6, 2f64)];
        let exposure = RawExposure::new(GainMode::Hdr, 1., date(), vec![frame.clone(), frame]).unwrap();
        assert_eq!(exposure.dev_size(), (6, 4));
        assert_eq!(exposure.n_frame(), 2);
        let low = exposure.channel_frames(Channel::DualLow);
        assert_eq!(low.len(), 2);
        assert!(low.iter().all(|array| array[(0, 0)] == 2.));
    }

    #[test]
    fn channel_count_must_match_gain_mode() {
        let frame = vec![DMatrix::from_element(4, 6, 1f64)];
        let err = RawExposure::new(GainMode::Hdr, 1., date(), vec![frame]).unwrap_err();
        assert!(matches!(err, ExposureError::Channels { found: 1, expected: 2, .. }));
    }

    #[test]
    fn inconsistent_shapes_are_rejected() {
        let frames = vec![
            vec![DMatrix::from_element(4, 6, 1f64)],
            vec![DMatrix::from_element(4, 5, 1f64)],
        ];
        assert!(matches!(
            RawExposure::new(GainMode::Low, 1., date(), frames),
            Err(ExposureError::FrameShape)
        ));
    }

    #[test]
    fn roi_bounds() {
        let roi = Roi::new(2, 6, 0, 3);
        assert_eq!(roi.len(), 12);
        assert!(roi.fits(6, 3));
        assert!(!roi.fits(5, 3));
        assert!(!Roi::new(3, 3, 0, 2).fits(8, 8));
    }
}
