//! Reduction of a stack of exposures of one condition to summary statistics

use nalgebra::DMatrix;

use crate::exposure::Roi;

#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    #[error("cannot reduce an empty stack of frames")]
    Empty,
    #[error("frame #{index} has shape {found:?}, expected {expected:?}")]
    Shape {
        index: usize,
        found: (usize, usize),
        expected: (usize, usize),
    },
    #[error("region of interest {roi:?} does not fit into a {width}x{height} frame")]
    Roi {
        roi: Roi,
        width: usize,
        height: usize,
    },
}
type Result<T> = std::result::Result<T, ReduceError>;

/// Median of a slice, averaging the two middle values for even lengths
///
/// Returns `None` for an empty slice; the slice is reordered.
pub fn median(values: &mut [f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Some(if n % 2 == 0 {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    } else {
        values[n / 2]
    })
}

/// Arithmetic mean
pub fn mean<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> f64 {
    let (n, sum) = values
        .into_iter()
        .fold((0usize, 0f64), |(n, sum), x| (n + 1, sum + x));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Population variance (mean squared deviation from the mean)
pub fn variance<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
    I::IntoIter: Clone,
{
    let values = values.into_iter();
    let m = mean(values.clone());
    let (n, ss) = values.fold((0usize, 0f64), |(n, ss), x| (n + 1, ss + (x - m).powi(2)));
    if n == 0 {
        f64::NAN
    } else {
        ss / n as f64
    }
}

/// Iterator over the values of `array` inside `roi`
pub fn roi_values<'a>(array: &'a DMatrix<f64>, roi: &Roi) -> impl Iterator<Item = &'a f64> + Clone + 'a {
    let roi = *roi;
    (roi.x0..roi.x1).flat_map(move |col| (roi.y0..roi.y1).map(move |row| &array[(row, col)]))
}

/// Summary statistics of a stack of frames of one condition and channel
#[derive(Debug, Clone)]
pub struct ReducedFrame {
    /// pixel-wise median across the stack
    pub median_frame: DMatrix<f64>,
    /// variance of the stacked raw values within the region of interest
    pub variance: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub median_value: f64,
    pub n_frame: usize,
    pub roi: Roi,
}
impl ReducedFrame {
    /// Number of median frame pixels, within the region of interest, strictly above `threshold`
    pub fn count_above(&self, threshold: f64) -> usize {
        roi_values(&self.median_frame, &self.roi)
            .filter(|&&x| x > threshold)
            .count()
    }
    /// Number of median frame pixels, within the region of interest, strictly below `threshold`
    pub fn count_below(&self, threshold: f64) -> usize {
        roi_values(&self.median_frame, &self.roi)
            .filter(|&&x| x < threshold)
            .count()
    }
    /// Percentage of the region of interest pixels a count stands for
    pub fn percent(&self, count: usize) -> f64 {
        100. * count as f64 / self.roi.len() as f64
    }
    /// Standard deviation of the stacked raw values
    pub fn std(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Builder of [ReducedFrame]s
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameReducer {
    roi: Option<Roi>,
}
impl FrameReducer {
    pub fn new() -> Self {
        Default::default()
    }
    /// Restricts the scalar statistics to a region of interest (default: full frame)
    pub fn roi(self, roi: Roi) -> Self {
        Self { roi: Some(roi) }
    }
    pub fn maybe_roi(self, roi: Option<Roi>) -> Self {
        Self { roi }
    }
    /// Reduces a stack of frames
    pub fn reduce(&self, frames: &[&DMatrix<f64>]) -> Result<ReducedFrame> {
        let first = frames.first().ok_or(ReduceError::Empty)?;
        let (height, width) = first.shape();
        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, frame)| frame.shape() != (height, width))
        {
            return Err(ReduceError::Shape {
                index,
                found: frame.shape(),
                expected: (height, width),
            });
        }
        let roi = self.roi.unwrap_or_else(|| Roi::full(width, height));
        if !roi.fits(width, height) {
            return Err(ReduceError::Roi { roi, width, height });
        }

        let mut column = vec![0f64; frames.len()];
        let median_frame = DMatrix::from_fn(height, width, |row, col| {
            column
                .iter_mut()
                .zip(frames)
                .for_each(|(x, frame)| *x = frame[(row, col)]);
            median(&mut column).unwrap_or(f64::NAN)
        });

        let variance = variance(frames.iter().flat_map(|frame| roi_values(frame, &roi)));

        let mut roi_median: Vec<f64> = roi_values(&median_frame, &roi).cloned().collect();
        let min_value = roi_median.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_value = roi_median.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let median_value = median(&mut roi_median).unwrap_or(f64::NAN);

        Ok(ReducedFrame {
            median_frame,
            variance,
            min_value,
            max_value,
            median_value,
            n_frame: frames.len(),
            roi,
        })
    }
}
