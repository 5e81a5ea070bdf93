use crate::exposure::Roi;

/// Thresholds and constants of the standard analysis
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// bias pixels above that level [ADU] are flagged
    pub bias_threshold: f64,
    /// open interval of median signal [ADU] a mid-range flat lies in
    pub mid_range: (f64, f64),
    /// saturated flat pixels below that level [ADU] are flagged
    pub saturation_threshold: f64,
    /// PTC samples are fitted below that median signal [ADU]
    pub ptc_cutoff: f64,
    /// signal level [ADU] the conversion gain is evaluated at
    pub gain_anchor: f64,
    /// width of the column segments of the dark time series [pixel]
    pub segment_width: usize,
    /// maximum number of iterations of the PTC fit
    pub max_iterations: usize,
    pub roi: Option<Roi>,
}
impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bias_threshold: 50.,
            mid_range: (5000., 15000.),
            saturation_threshold: 5000.,
            ptc_cutoff: 15000.,
            gain_anchor: 5000.,
            segment_width: 256,
            max_iterations: 100,
            roi: None,
        }
    }
}
impl AnalysisConfig {
    pub fn bias_threshold(self, bias_threshold: f64) -> Self {
        Self {
            bias_threshold,
            ..self
        }
    }
    pub fn mid_range(self, low: f64, high: f64) -> Self {
        Self {
            mid_range: (low, high),
            ..self
        }
    }
    pub fn saturation_threshold(self, saturation_threshold: f64) -> Self {
        Self {
            saturation_threshold,
            ..self
        }
    }
    pub fn ptc_cutoff(self, ptc_cutoff: f64) -> Self {
        Self { ptc_cutoff, ..self }
    }
    pub fn segment_width(self, segment_width: usize) -> Self {
        Self {
            segment_width,
            ..self
        }
    }
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }
    /// Restricts the frame statistics to a region of interest
    pub fn roi(self, roi: Roi) -> Self {
        Self {
            roi: Some(roi),
            ..self
        }
    }
    /// Checks whether a median signal lies strictly inside the mid-range band
    pub fn is_mid_range(&self, signal: f64) -> bool {
        signal > self.mid_range.0 && signal < self.mid_range.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_range_bounds_are_open() {
        let config = AnalysisConfig::default();
        assert!(!config.is_mid_range(5000.));
        assert!(config.is_mid_range(5000.1));
        assert!(config.is_mid_range(14999.9));
        assert!(!config.is_mid_range(15000.));
    }

    #[test]
    fn custom_mid_range() {
        let config = AnalysisConfig::default().mid_range(100., 200.);
        assert!(config.is_mid_range(150.));
        assert!(!config.is_mid_range(5000.1));
    }
}
