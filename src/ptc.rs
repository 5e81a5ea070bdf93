//! Photon transfer curve and conversion gain
//!
//! The shot noise part of the photon transfer curve is modeled with the power law
//! `f(x) = A (x/x_ref)^(-alpha)`, with the exponent fixed to `alpha=-1` and the
//! reference fixed to `x_ref=1`; only the amplitude `A` is fitted, with
//! Levenberg-Marquardt, after subtracting the noise floor of the samples.
//! The conversion gain is the inverse of the model slope at a fixed signal level:
//! `k = x_anchor / f(x_anchor)`.

use nalgebra::{DMatrix, DVector};

use crate::config::AnalysisConfig;

#[derive(Debug, thiserror::Error)]
pub enum PtcError {
    #[error("no PTC sample left to fit below {cutoff} ADU (exposure time > 0)")]
    NoSample { cutoff: f64 },
    #[error("PTC fit is singular")]
    Singular,
    #[error("PTC fit did not converge within {0} iterations")]
    NotConverged(usize),
    #[error("PTC model is not positive at {anchor} ADU ({value})")]
    NonPositive { anchor: f64, value: f64 },
}
type Result<T> = std::result::Result<T, PtcError>;

/// A point of the photon transfer curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PtcPoint {
    /// exposure time [s]
    pub exp_time: f64,
    /// median signal [ADU]
    pub signal: f64,
    /// signal variance [ADU^2]
    pub variance: f64,
}

/// Photon transfer curve samples of one readout channel
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PtcSample(Vec<PtcPoint>);
impl PtcSample {
    pub fn new() -> Self {
        Default::default()
    }
    pub fn push(&mut self, exp_time: f64, signal: f64, variance: f64) {
        self.0.push(PtcPoint {
            exp_time,
            signal,
            variance,
        });
    }
    pub fn points(&self) -> &[PtcPoint] {
        &self.0
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Illuminated samples (exposure time > 0) with a median signal strictly below `cutoff`
    pub fn unsaturated(&self, cutoff: f64) -> Self {
        self.0
            .iter()
            .filter(|p| p.exp_time > 0. && p.signal < cutoff)
            .cloned()
            .collect()
    }
    /// Signal versus exposure time (exposure time > 0)
    pub fn linearity(&self) -> Vec<(f64, f64)> {
        self.0
            .iter()
            .filter(|p| p.exp_time > 0.)
            .map(|p| (p.exp_time, p.signal))
            .collect()
    }
}
impl FromIterator<PtcPoint> for PtcSample {
    fn from_iter<T: IntoIterator<Item = PtcPoint>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Model which parameters are fitted by [levenberg_marquardt]
pub trait Model {
    fn n_parameter(&self) -> usize;
    fn eval(&self, parameters: &DVector<f64>, x: f64) -> f64;
    /// Partial derivatives of the model with respect to the parameters
    fn gradient(&self, parameters: &DVector<f64>, x: f64) -> DVector<f64>;
}

/// Power law with a free amplitude and a fixed exponent and reference
#[derive(Debug, Clone, Copy)]
pub struct PowerLaw {
    pub alpha: f64,
    pub x_ref: f64,
}
impl Default for PowerLaw {
    fn default() -> Self {
        Self {
            alpha: -1.,
            x_ref: 1.,
        }
    }
}
impl PowerLaw {
    fn shape(&self, x: f64) -> f64 {
        (x / self.x_ref).powf(-self.alpha)
    }
}
impl Model for PowerLaw {
    fn n_parameter(&self) -> usize {
        1
    }
    fn eval(&self, parameters: &DVector<f64>, x: f64) -> f64 {
        parameters[0] * self.shape(x)
    }
    fn gradient(&self, _parameters: &DVector<f64>, x: f64) -> DVector<f64> {
        DVector::from_element(1, self.shape(x))
    }
}

/// Outcome of [levenberg_marquardt]
#[derive(Debug, Clone)]
pub struct LevMar {
    pub parameters: DVector<f64>,
    pub iterations: usize,
    /// sum of squared residuals
    pub cost: f64,
}

const XTOL: f64 = 1e-10;
const FTOL: f64 = 1e-12;

/// Least-squares fit of `model` to `(x,y)` data with the Levenberg-Marquardt algorithm
///
/// The damping follows Marquardt's scaling of the normal equations diagonal.
pub fn levenberg_marquardt<M: Model>(
    model: &M,
    data: &[(f64, f64)],
    initial: DVector<f64>,
    max_iterations: usize,
) -> Result<LevMar> {
    let n = model.n_parameter();
    let cost_of = |p: &DVector<f64>| -> f64 {
        data.iter()
            .map(|&(x, y)| (y - model.eval(p, x)).powi(2))
            .sum()
    };
    let mut parameters = initial;
    let mut cost = cost_of(&parameters);
    let mut lambda = 1e-3;
    for iteration in 1..=max_iterations {
        let mut jtj = DMatrix::<f64>::zeros(n, n);
        let mut jtr = DVector::<f64>::zeros(n);
        for &(x, y) in data {
            let g = model.gradient(&parameters, x);
            let r = y - model.eval(&parameters, x);
            jtj += &g * g.transpose();
            jtr += &g * r;
        }
        if jtj.diagonal().iter().all(|&d| d <= 0.) {
            return Err(PtcError::Singular);
        }
        loop {
            let mut damped = jtj.clone();
            for i in 0..n {
                damped[(i, i)] += lambda * jtj[(i, i)].max(f64::EPSILON);
            }
            let step = damped.lu().solve(&jtr).ok_or(PtcError::Singular)?;
            let small_step = step.norm() <= XTOL * (parameters.norm() + XTOL);
            let trial = &parameters + &step;
            let trial_cost = cost_of(&trial);
            log::debug!(
                "LM #{iteration}: lambda={lambda:e}, cost={cost:e} -> {trial_cost:e}, parameters={:?}",
                trial.as_slice()
            );
            if trial_cost <= cost {
                let converged = small_step || (cost - trial_cost) <= FTOL * cost;
                parameters = trial;
                cost = trial_cost;
                lambda = (lambda / 10.).max(1e-12);
                if converged {
                    return Ok(LevMar {
                        parameters,
                        iterations: iteration,
                        cost,
                    });
                }
                break;
            }
            if small_step {
                return Ok(LevMar {
                    parameters,
                    iterations: iteration,
                    cost,
                });
            }
            lambda *= 10.;
            if lambda > 1e16 {
                return Err(PtcError::NotConverged(iteration));
            }
        }
    }
    Err(PtcError::NotConverged(max_iterations))
}

/// Fitted photon transfer curve of a channel
#[derive(Debug, Clone)]
pub struct PtcFit {
    pub model: PowerLaw,
    /// amplitude of the shot noise power law
    pub amplitude: f64,
    /// minimum variance of the fitted samples [ADU^2]
    pub noise_floor: f64,
    /// conversion gain [e-/ADU]
    pub gain: f64,
    pub iterations: usize,
    /// number of fitted samples
    pub n_sample: usize,
}
impl PtcFit {
    /// Shot noise variance [ADU^2] at signal `x` [ADU]
    pub fn eval(&self, x: f64) -> f64 {
        self.model
            .eval(&DVector::from_element(1, self.amplitude), x)
    }
}

/// Photon transfer curve fitter
#[derive(Debug, Clone, Copy)]
pub struct PtcFitter {
    cutoff: f64,
    anchor: f64,
    max_iterations: usize,
}
impl Default for PtcFitter {
    fn default() -> Self {
        (&AnalysisConfig::default()).into()
    }
}
impl From<&AnalysisConfig> for PtcFitter {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            cutoff: config.ptc_cutoff,
            anchor: config.gain_anchor,
            max_iterations: config.max_iterations,
        }
    }
}
impl PtcFitter {
    /// Fits the shot noise model to the unsaturated samples
    pub fn fit(&self, sample: &PtcSample) -> Result<PtcFit> {
        let unsaturated = sample.unsaturated(self.cutoff);
        let noise_floor = unsaturated
            .points()
            .iter()
            .map(|p| p.variance)
            .fold(f64::INFINITY, f64::min);
        if unsaturated.is_empty() {
            return Err(PtcError::NoSample {
                cutoff: self.cutoff,
            });
        }
        let data: Vec<_> = unsaturated
            .points()
            .iter()
            .map(|p| (p.signal, p.variance - noise_floor))
            .collect();
        let model = PowerLaw::default();
        let solution = levenberg_marquardt(
            &model,
            &data,
            DVector::from_element(1, 1.),
            self.max_iterations,
        )?;
        let amplitude = solution.parameters[0];
        let value = model.eval(&solution.parameters, self.anchor);
        if !(value > 0.) {
            return Err(PtcError::NonPositive {
                anchor: self.anchor,
                value,
            });
        }
        let gain = self.anchor / value;
        log::info!(
            "PTC fit: {} samples, floor={noise_floor:.3} ADU^2, amplitude={amplitude:.6}, gain={gain:.3} e-/ADU ({} iterations)",
            data.len(),
            solution.iterations
        );
        Ok(PtcFit {
            model,
            amplitude,
            noise_floor,
            gain,
            iterations: solution.iterations,
            n_sample: data.len(),
        })
    }
}
