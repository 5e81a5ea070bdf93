//! Exposures stored as numpy `.npz` archives
//!
//! Each archive holds one exposure:
//!  - `reset`, `signal`: raw `u16` samples with shape `[n_frames, n_channels, height, width]`
//!  - `exp_time`: exposure time [s]
//!  - `timestamp`: acquisition start [Unix s]
//!  - `temperature` (optional): sensor temperature [K]
//!  - `firmware` (optional): firmware version number

use chrono::{DateTime, NaiveDateTime};
use glob::glob;
use indicatif::ProgressBar;
use nalgebra::DMatrix;
use npyz::npz::NpzArchive;
use regex::Regex;
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use super::{ExposureError, ExposureSource, RawExposure, Result};
use crate::gain::GainMode;

/// Converts a gray-coded sample back to binary
pub fn gray_decode(sample: u16) -> u16 {
    let mut value = sample;
    let mut mask = sample >> 1;
    while mask != 0 {
        value ^= mask;
        mask >>= 1;
    }
    value
}

struct Array {
    shape: Vec<u64>,
    data: Vec<u16>,
}

/// [ExposureSource] reading `.npz` frame archives
#[derive(Debug, Clone)]
pub struct NpzLoader {
    graycode: bool,
    gain_token: Regex,
}
impl NpzLoader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            graycode: false,
            gain_token: Regex::new(r"_(hdr|high|low)(_|\.|$)")?,
        })
    }
    /// Gray-decodes the raw samples before the correlated double sampling
    pub fn graycode(self, graycode: bool) -> Self {
        Self { graycode, ..self }
    }
    /// Gain mode encoded in a frame file name
    ///
    /// Dark frames are always acquired in dual-gain mode and carry no gain token.
    pub fn gain_mode(&self, name: &str) -> Result<GainMode> {
        match self.gain_token.captures(name).and_then(|capts| capts.get(1)) {
            Some(token) => {
                GainMode::try_from(token.as_str()).map_err(|_| ExposureError::GainToken(name.into()))
            }
            None if name.contains("dark") => Ok(GainMode::Hdr),
            None => Err(ExposureError::GainToken(name.into())),
        }
    }
    fn open(path: &Path) -> Result<NpzArchive<BufReader<File>>> {
        NpzArchive::open(path).map_err(|e| ExposureError::Io(path.display().to_string(), e))
    }
    fn raw_array(
        npz: &mut NpzArchive<BufReader<File>>,
        file: &str,
        name: &str,
    ) -> Result<Array> {
        let npy = npz
            .by_name(name)
            .map_err(|e| ExposureError::Io(file.to_string(), e))?
            .ok_or_else(|| ExposureError::MissingArray {
                file: file.to_string(),
                name: name.to_string(),
            })?;
        let shape = npy.shape().to_vec();
        if shape.len() != 4 {
            return Err(ExposureError::Shape {
                file: file.to_string(),
                name: name.to_string(),
                shape,
                expected: "[n_frames, n_channels, height, width]".into(),
            });
        }
        let data = npy
            .into_vec::<u16>()
            .map_err(|e| ExposureError::Io(file.to_string(), e))?;
        Ok(Array { shape, data })
    }
    fn scalar<T: npyz::Deserialize>(
        npz: &mut NpzArchive<BufReader<File>>,
        file: &str,
        name: &str,
    ) -> Result<Option<T>> {
        match npz
            .by_name(name)
            .map_err(|e| ExposureError::Io(file.to_string(), e))?
        {
            Some(npy) => Ok(npy
                .into_vec::<T>()
                .map_err(|e| ExposureError::Io(file.to_string(), e))?
                .into_iter()
                .next()),
            None => Ok(None),
        }
    }
    /// Loads the exposure stored in `path`
    pub fn load(&self, path: &Path) -> Result<RawExposure> {
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let gain = self.gain_mode(&file)?;
        let mut npz = Self::open(path)?;

        let reset = Self::raw_array(&mut npz, &file, "reset")?;
        let signal = Self::raw_array(&mut npz, &file, "signal")?;
        if reset.shape != signal.shape {
            return Err(ExposureError::Shape {
                file,
                name: "signal".into(),
                shape: signal.shape,
                expected: format!("{:?}", reset.shape),
            });
        }
        let exp_time = Self::scalar::<f64>(&mut npz, &file, "exp_time")?.ok_or_else(|| {
            ExposureError::MissingArray {
                file: file.clone(),
                name: "exp_time".into(),
            }
        })?;
        let timestamp = Self::scalar::<f64>(&mut npz, &file, "timestamp")?.ok_or_else(|| {
            ExposureError::MissingArray {
                file: file.clone(),
                name: "timestamp".into(),
            }
        })?;
        let date = to_date(timestamp)?;

        let dims: Vec<usize> = reset.shape.iter().map(|&n| n as usize).collect();
        let (n_frame, n_channel, height, width) = (dims[0], dims[1], dims[2], dims[3]);
        let graycode = self.graycode;
        let decode = move |x: u16| -> f64 {
            if graycode {
                gray_decode(x) as f64
            } else {
                x as f64
            }
        };
        let n_px = height * width;
        let cds_frames: Vec<Vec<DMatrix<f64>>> = (0..n_frame)
            .map(|i| {
                (0..n_channel)
                    .map(|j| {
                        let offset = (i * n_channel + j) * n_px;
                        // numpy arrays are row-major
                        DMatrix::from_row_iterator(
                            height,
                            width,
                            reset.data[offset..offset + n_px]
                                .iter()
                                .zip(&signal.data[offset..offset + n_px])
                                .map(|(&r, &s)| decode(s) - decode(r)),
                        )
                    })
                    .collect()
            })
            .collect();

        let mut exposure = RawExposure::new(gain, exp_time, date, cds_frames)?;
        if let Some(temperature) = Self::scalar::<f64>(&mut npz, &file, "temperature")? {
            exposure = exposure.temperature(temperature);
        }
        if let Some(firmware) = Self::scalar::<u32>(&mut npz, &file, "firmware")? {
            exposure = exposure.firmware(firmware.to_string());
        }
        Ok(exposure)
    }
    fn paths(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
        let pattern = dir.join(pattern);
        let mut paths = glob(&pattern.to_string_lossy())?.collect::<std::result::Result<Vec<_>, _>>()?;
        paths.sort();
        Ok(paths)
    }
}

fn to_date(timestamp: f64) -> Result<NaiveDateTime> {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9).round() as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
        .map(|date| date.naive_utc())
        .ok_or(ExposureError::Timestamp(timestamp))
}

impl ExposureSource for NpzLoader {
    fn list(&self, dir: &Path) -> Result<Vec<String>> {
        Ok(Self::paths(dir, "*.npz")?
            .into_iter()
            .filter_map(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().to_string())
            })
            .collect())
    }

    fn load_by_prefix(&self, dir: &Path, prefix: &str) -> Result<Vec<RawExposure>> {
        let paths = Self::paths(dir, &format!("{prefix}*.npz"))?;
        log::info!("Loading {} file(s) {:?}...", paths.len(), dir.join(prefix));
        let pb = ProgressBar::new(paths.len() as u64);
        let exposures = paths
            .iter()
            .map(|path| {
                pb.inc(1);
                self.load(path)
            })
            .collect::<Result<Vec<RawExposure>>>();
        pb.finish_and_clear();
        exposures
    }

    fn load_name(&self, dir: &Path, name: &str) -> Result<RawExposure> {
        self.load(&dir.join(name))
    }
}

/// Writes an exposure archive with `u16` `reset` and `signal` samples of shape
/// `[n_frames, n_channels, height, width]`
#[cfg(test)]
pub(crate) fn write_archive(
    path: &Path,
    reset: (&[u64], &[u16]),
    signal: (&[u64], &[u16]),
    exp_time: f64,
    timestamp: f64,
    metadata: Option<(f64, u32)>,
) -> std::io::Result<()> {
    use npyz::{npz::NpzWriter, AutoSerialize, WriterBuilder};

    fn array<T: AutoSerialize + Copy>(
        npz: &mut NpzWriter<std::io::BufWriter<File>>,
        name: &str,
        shape: &[u64],
        data: &[T],
    ) -> std::io::Result<()> {
        let mut writer = npz
            .array::<T>(name, Default::default())?
            .default_dtype()
            .shape(shape)
            .begin_nd()?;
        writer.extend(data.iter().copied())?;
        writer.finish()
    }

    let mut npz = NpzWriter::create(path)?;
    array(&mut npz, "reset", reset.0, reset.1)?;
    array(&mut npz, "signal", signal.0, signal.1)?;
    array(&mut npz, "exp_time", &[1], &[exp_time])?;
    array(&mut npz, "timestamp", &[1], &[timestamp])?;
    if let Some((temperature, firmware)) = metadata {
        array(&mut npz, "temperature", &[1], &[temperature])?;
        array(&mut npz, "firmware", &[1], &[firmware])?;
    }
    npz.zip_writer().finish()?;
    Ok(())
}
