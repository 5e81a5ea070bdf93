//! Discovery of the test conditions present in a data directory

use std::path::Path;

use crate::exposure::{ExposureError, ExposureSource};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("no frame file found in {0:?}")]
    DirectoryEmpty(String),
    #[error("cannot read the acquisition date from file name {0:?}")]
    InvalidFileName(String),
    #[error("failed to list the frame files")]
    Exposure(#[from] ExposureError),
}
type Result<T> = std::result::Result<T, ScanError>;

/// Device identification and test conditions of a data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditions {
    pub camera: String,
    pub device_id: String,
    /// acquisition date as `YYYY-MM-DD`
    pub date: String,
    pub bias: bool,
    pub dark: bool,
    pub flat: bool,
    /// first frame file in name order
    pub first_file: String,
}
impl Conditions {
    /// Builds the conditions from a list of frame file names
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut names: Vec<&str> = names.iter().map(|name| name.as_ref()).collect();
        names.sort_unstable();
        let first_file = names
            .first()
            .ok_or_else(|| ScanError::DirectoryEmpty(String::new()))?
            .to_string();

        let stem = first_file
            .rsplit_once('.')
            .map_or(first_file.as_str(), |(stem, _)| stem);
        let fields: Vec<&str> = stem.split('_').collect();
        let camera = fields[0].to_string();
        let device_id = fields
            .get(1)
            .ok_or_else(|| ScanError::InvalidFileName(first_file.clone()))?
            .to_string();
        let date = fields
            .last()
            .and_then(|field| field.get(..8))
            .filter(|date| date.bytes().all(|b| b.is_ascii_digit()))
            .map(|date| format!("{}-{}-{}", &date[..4], &date[4..6], &date[6..]))
            .ok_or_else(|| ScanError::InvalidFileName(first_file.clone()))?;

        let any = |condition: &str| names.iter().any(|name| name.contains(condition));
        Ok(Self {
            camera,
            device_id,
            date,
            bias: any("bias"),
            dark: any("dark"),
            flat: any("flat"),
            first_file,
        })
    }
    /// Scans the frame files of `dir`
    pub fn scan<S: ExposureSource + ?Sized>(dir: &Path, source: &S) -> Result<Self> {
        let names = source.list(dir)?;
        if names.is_empty() {
            return Err(ScanError::DirectoryEmpty(dir.display().to_string()));
        }
        let conditions = Self::from_names(&names)?;
        log::info!(
            "{} {}: {} frame files (bias: {}, dark: {}, flat: {})",
            conditions.camera,
            conditions.device_id,
            names.len(),
            conditions.bias,
            conditions.dark,
            conditions.flat
        );
        Ok(conditions)
    }
    /// Checks whether there is anything to analyze
    pub fn any(&self) -> bool {
        self.bias || self.dark || self.flat
    }
    /// `{camera}_{device}` prefix shared by all the frame files
    pub fn prefix(&self) -> String {
        format!("{}_{}", self.camera, self.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposure::MemorySource;

    #[test]
    fn conditions_from_file_names() {
        let names = [
            "cmost_d42_flat_hdr_1.0s_20240413T120000.npz",
            "cmost_d42_bias_hdr_20240412T080000.npz",
        ];
        let conditions = Conditions::from_names(&names).unwrap();
        assert_eq!(conditions.camera, "cmost");
        assert_eq!(conditions.device_id, "d42");
        assert_eq!(conditions.date, "2024-04-12");
        assert_eq!(conditions.first_file, names[1]);
        assert!(conditions.bias && conditions.flat && !conditions.dark);
        assert_eq!(conditions.prefix(), "cmost_d42");
    }

    #[test]
    fn no_matching_condition_is_not_an_error() {
        let conditions = Conditions::from_names(&["cam_dev_focus_20240101.npz"]).unwrap();
        assert!(!conditions.any());
    }

    #[test]
    fn invalid_date_field() {
        assert!(matches!(
            Conditions::from_names(&["cam_dev_bias_hdr_2024.npz"]),
            Err(ScanError::InvalidFileName(_))
        ));
        assert!(matches!(
            Conditions::from_names(&["cam_dev_bias_hdr_notadate.npz"]),
            Err(ScanError::InvalidFileName(_))
        ));
    }

    #[test]
    fn empty_directory() {
        let source = MemorySource::new();
        assert!(matches!(
            Conditions::scan(Path::new("."), &source),
            Err(ScanError::DirectoryEmpty(_))
        ));
    }
}
