use std::{collections::BTreeMap, path::Path};

use super::{ExposureError, ExposureSource, RawExposure, Result};

/// Exposures decoded by the caller, indexed by file name
///
/// The data directory passed to [ExposureSource] methods is ignored.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    exposures: BTreeMap<String, RawExposure>,
}
impl MemorySource {
    pub fn new() -> Self {
        Default::default()
    }
    /// Adds an exposure under the file name `name`
    pub fn insert<S: Into<String>>(&mut self, name: S, exposure: RawExposure) -> &mut Self {
        self.exposures.insert(name.into(), exposure);
        self
    }
    pub fn len(&self) -> usize {
        self.exposures.len()
    }
    pub fn is_empty(&self) -> bool {
        self.exposures.is_empty()
    }
}
impl FromIterator<(String, RawExposure)> for MemorySource {
    fn from_iter<T: IntoIterator<Item = (String, RawExposure)>>(iter: T) -> Self {
        Self {
            exposures: iter.into_iter().collect(),
        }
    }
}
impl ExposureSource for MemorySource {
    fn list(&self, _dir: &Path) -> Result<Vec<String>> {
        Ok(self.exposures.keys().cloned().collect())
    }

    fn load_by_prefix(&self, _dir: &Path, prefix: &str) -> Result<Vec<RawExposure>> {
        Ok(self
            .exposures
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(_, exposure)| exposure.clone())
            .collect())
    }

    fn load_name(&self, _dir: &Path, name: &str) -> Result<RawExposure> {
        self.exposures
            .get(name)
            .cloned()
            .ok_or_else(|| ExposureError::Missing(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gain::GainMode;
    use chrono::DateTime;
    use nalgebra::DMatrix;

    fn exposure(exp_time: f64) -> RawExposure {
        let date = DateTime::from_timestamp(0, 0).unwrap().naive_utc();
        RawExposure::new(
            GainMode::High,
            exp_time,
            date,
            vec![vec![DMatrix::zeros(2, 2)]],
        )
        .unwrap()
    }

    #[test]
    fn prefix_selection_is_sorted_by_name() {
        let mut source = MemorySource::new();
        source
            .insert("cam_dev_flat_high_2_20240413", exposure(2.))
            .insert("cam_dev_bias_high_20240413", exposure(0.))
            .insert("cam_dev_flat_high_1_20240413", exposure(1.));
        let flats = source
            .load_by_prefix(Path::new("."), "cam_dev_flat_high")
            .unwrap();
        let times: Vec<_> = flats.iter().map(|e| e.exp_time).collect();
        assert_eq!(times, vec![1., 2.]);
    }

    #[test]
    fn required_exposure_is_missing() {
        let source = MemorySource::new();
        assert!(matches!(
            source.load_required(Path::new("."), "cam_dev_dark"),
            Err(ExposureError::Missing(_))
        ));
    }

    #[test]
    fn file_name_is_not_a_prefix() {
        let mut source = MemorySource::new();
        source.insert("cam_dev_bias_high_20240413.npz", exposure(0.));
        let dir = Path::new(".");
        assert!(source.load_name(dir, "cam_dev_bias_high_20240413.npz").is_ok());
        assert!(matches!(
            source.load_name(dir, "cam_dev_bias"),
            Err(ExposureError::Missing(_))
        ));
    }
}
