//! Classifier capability traits and the logistic regression reference model
//!
//! The rest of the pipeline only sees [`Fittable`] and [`Scorable`], so the
//! concrete classifier can be swapped without touching the transformer,
//! trainer, scorer or explainer.

use std::fmt;

use faer::prelude::*;
use faer::{Mat, Side};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ClassWeight, ModelConfig};

use super::error::{PipelineError, PipelineResult};
use super::preprocess::DesignMatrix;

/// A fitted model that produces churn probabilities
pub trait Scorable {
    /// Number of input columns the model expects
    fn n_features(&self) -> usize;

    /// Probability of the positive (churn) class for each row, in [0, 1]
    fn predict_proba(&self, x: &DesignMatrix) -> PipelineResult<Vec<f64>>;
}

/// Untrained model hyperparameters
pub trait Fittable {
    type Model: Scorable;

    /// Fit on design matrix `x` and binary labels `y` (1.0 = churned)
    fn fit(&self, x: &DesignMatrix, y: &[f64]) -> PipelineResult<(Self::Model, FitReport)>;
}

/// Non-fatal solver diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FitWarning {
    /// The iteration cap was reached before the step tolerance was met
    Convergence {
        iterations: usize,
        max_iter: usize,
        last_step: f64,
    },
    /// No step along the Newton direction lowered the loss; the previous
    /// coefficients were kept
    LineSearch { iterations: usize, loss: f64 },
}

impl fmt::Display for FitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitWarning::Convergence {
                iterations,
                max_iter,
                last_step,
            } => write!(
                f,
                "solver did not converge after {}/{} iterations (last step {:.3e}); increase model.max_iter",
                iterations, max_iter, last_step
            ),
            FitWarning::LineSearch { iterations, loss } => write!(
                f,
                "solver stalled at iteration {} (loss {:.6}): line search found no descent; try a smaller model.c",
                iterations, loss
            ),
        }
    }
}

/// Outcome of a fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub iterations: usize,
    pub converged: bool,
    /// Penalized log-loss at the final coefficients
    pub final_loss: f64,
    pub warnings: Vec<FitWarning>,
}

/// L2-regularized logistic regression solved with damped Newton steps.
///
/// Columns are standardized internally before solving, so the penalty does
/// not depend on the scale of the raw features. The returned coefficients are
/// expressed on the original scale.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub class_weight: ClassWeight,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for LogisticRegression {
    fn from(config: &ModelConfig) -> Self {
        Self {
            c: config.c,
            max_iter: config.max_iter,
            tol: config.tol,
            class_weight: config.class_weight,
        }
    }
}

/// Trained logistic regression coefficients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedLogistic {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// log(1 + e^z) without overflow
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Solve `a x = b` for symmetric positive-definite `a` via faer's Cholesky (LLT)
fn cholesky_solve(a: &Mat<f64>, b: &Mat<f64>) -> Option<Vec<f64>> {
    let llt = a.cholesky(Side::Lower).ok()?;
    let x = llt.solve(b.as_ref());
    let solution: Vec<f64> = (0..x.nrows()).map(|i| x[(i, 0)]).collect();
    if solution.iter().all(|v| v.is_finite()) {
        Some(solution)
    } else {
        None
    }
}

/// `z * beta` as a column of log-odds
fn linear_predictor(z: &Mat<f64>, beta: &[f64]) -> Mat<f64> {
    let b = Mat::from_fn(beta.len(), 1, |j, _| beta[j]);
    z * &b
}

/// Accepted step of the backtracking line search
struct LineStep {
    beta: Vec<f64>,
    loss: f64,
    /// Largest absolute coefficient change
    size: f64,
}

/// Column means and standard deviations (constant columns get scale 1)
fn standardization(x: &DesignMatrix) -> (Vec<f64>, Vec<f64>) {
    let n = x.nrows() as f64;
    let means = x.column_means();
    let scales = (0..x.ncols())
        .map(|j| {
            let var = (0..x.nrows())
                .map(|i| (x.get(i, j) - means[j]).powi(2))
                .sum::<f64>()
                / n;
            let sd = var.sqrt();
            if sd > 1e-12 {
                sd
            } else {
                1.0
            }
        })
        .collect();
    (means, scales)
}

impl LogisticRegression {
    fn sample_weights(&self, y: &[f64]) -> Vec<f64> {
        match self.class_weight {
            ClassWeight::None => vec![1.0; y.len()],
            ClassWeight::Balanced => {
                let n = y.len() as f64;
                let positives = y.iter().filter(|&&v| v > 0.5).count() as f64;
                let negatives = n - positives;
                y.iter()
                    .map(|&v| {
                        if v > 0.5 {
                            n / (2.0 * positives)
                        } else {
                            n / (2.0 * negatives)
                        }
                    })
                    .collect()
            }
        }
    }

    /// Penalized loss at `beta`; `z` carries a trailing column of ones for the intercept
    fn loss(&self, z: &Mat<f64>, y: &[f64], w: &[f64], beta: &[f64]) -> f64 {
        let p = z.ncols() - 1;
        let lambda = 1.0 / self.c;
        let eta = linear_predictor(z, beta);
        let data: f64 = (0..z.nrows())
            .map(|i| w[i] * (softplus(eta[(i, 0)]) - y[i] * eta[(i, 0)]))
            .sum();
        data + 0.5 * lambda * beta[..p].iter().map(|b| b * b).sum::<f64>()
    }

    /// Halve the Newton step until the penalized loss does not increase.
    ///
    /// Returns `None` when no step down to `1e-10` of the full step descends.
    fn line_search(
        &self,
        z: &Mat<f64>,
        y: &[f64],
        w: &[f64],
        beta: &[f64],
        direction: &[f64],
        loss: f64,
    ) -> Option<LineStep> {
        let mut t = 1.0;
        while t >= 1e-10 {
            let candidate: Vec<f64> = beta.iter().zip(direction).map(|(b, d)| b - t * d).collect();
            let candidate_loss = self.loss(z, y, w, &candidate);
            if candidate_loss <= loss {
                return Some(LineStep {
                    beta: candidate,
                    loss: candidate_loss,
                    size: direction.iter().map(|d| (t * d).abs()).fold(0.0, f64::max),
                });
            }
            t *= 0.5;
        }
        None
    }
}

impl Fittable for LogisticRegression {
    type Model = FittedLogistic;

    fn fit(&self, x: &DesignMatrix, y: &[f64]) -> PipelineResult<(FittedLogistic, FitReport)> {
        let n = x.nrows();
        let p = x.ncols();

        if n != y.len() {
            return Err(PipelineError::InvalidData(format!(
                "design matrix has {} rows but {} labels",
                n,
                y.len()
            )));
        }
        let positives = y.iter().filter(|&&v| v > 0.5).count();
        if positives == 0 || positives == n {
            return Err(PipelineError::InvalidData(
                "training labels contain a single class".to_string(),
            ));
        }

        let (means, scales) = standardization(x);
        // Standardized columns followed by a ones column for the intercept
        let z = Mat::from_fn(n, p + 1, |i, j| {
            if j < p {
                (x.get(i, j) - means[j]) / scales[j]
            } else {
                1.0
            }
        });
        let w = self.sample_weights(y);
        let lambda = 1.0 / self.c;

        // beta[0..p] are coefficients, beta[p] the unpenalized intercept
        let mut beta = vec![0.0; p + 1];
        let mut loss = self.loss(&z, y, &w, &beta);
        let mut converged = false;
        let mut stalled = false;
        let mut iterations = 0;
        let mut last_step = f64::INFINITY;

        while iterations < self.max_iter {
            iterations += 1;

            let eta = linear_predictor(&z, &beta);
            let mut residual = Mat::<f64>::zeros(n, 1);
            let mut curvature = vec![0.0; n];
            for i in 0..n {
                let mu = sigmoid(eta[(i, 0)]);
                residual[(i, 0)] = w[i] * (mu - y[i]);
                curvature[i] = (w[i] * mu * (1.0 - mu)).sqrt();
            }

            // H = Z^T W Z over the row-scaled design, g = Z^T r
            let scaled = Mat::from_fn(n, p + 1, |i, j| curvature[i] * z[(i, j)]);
            let mut hess = scaled.transpose() * &scaled;
            let mut grad = z.transpose() * &residual;
            for j in 0..p {
                grad[(j, 0)] += lambda * beta[j];
                hess[(j, j)] += lambda;
            }

            let direction = match cholesky_solve(&hess, &grad) {
                Some(d) => d,
                None => {
                    // Near-singular Hessian: add a small ridge and retry
                    for j in 0..=p {
                        hess[(j, j)] += 1e-8;
                    }
                    cholesky_solve(&hess, &grad).ok_or_else(|| {
                        PipelineError::InvalidData("Hessian is not positive definite".to_string())
                    })?
                }
            };

            let scale = 1.0 + beta.iter().map(|b| b.abs()).fold(0.0, f64::max);
            let full_step = direction.iter().map(|d| d.abs()).fold(0.0, f64::max);
            if full_step <= self.tol * scale {
                for (b, d) in beta.iter_mut().zip(&direction) {
                    *b -= d;
                }
                loss = self.loss(&z, y, &w, &beta);
                last_step = full_step;
                converged = true;
                break;
            }

            let Some(step) = self.line_search(&z, y, &w, &beta, &direction, loss) else {
                // Keep the last coefficients that lowered the loss
                stalled = true;
                break;
            };

            last_step = step.size;
            let previous = loss;
            beta = step.beta;
            loss = step.loss;

            debug!(iteration = iterations, loss, step = last_step, "Newton step");

            if last_step <= self.tol * scale || (previous - loss).abs() <= self.tol * 1e-3 * (1.0 + loss.abs()) {
                converged = true;
                break;
            }
        }

        let mut warnings = Vec::new();
        if !converged {
            let warning = if stalled {
                FitWarning::LineSearch { iterations, loss }
            } else {
                FitWarning::Convergence {
                    iterations,
                    max_iter: self.max_iter,
                    last_step,
                }
            };
            warn!("{}", warning);
            warnings.push(warning);
        }

        // Back to the original feature scale
        let coefficients: Vec<f64> = (0..p).map(|j| beta[j] / scales[j]).collect();
        let intercept = beta[p] - (0..p).map(|j| coefficients[j] * means[j]).sum::<f64>();

        let report = FitReport {
            iterations,
            converged,
            final_loss: loss,
            warnings,
        };
        Ok((
            FittedLogistic {
                coefficients,
                intercept,
            },
            report,
        ))
    }
}

impl FittedLogistic {
    /// Linear predictor (log-odds) for each row
    pub fn decision_function(&self, x: &DesignMatrix) -> PipelineResult<Vec<f64>> {
        if x.ncols() != self.coefficients.len() {
            return Err(PipelineError::InvalidData(format!(
                "model expects {} features, got {}",
                self.coefficients.len(),
                x.ncols()
            )));
        }

        Ok((0..x.nrows())
            .map(|i| {
                self.intercept
                    + self
                        .coefficients
                        .iter()
                        .enumerate()
                        .map(|(j, c)| c * x.get(i, j))
                        .sum::<f64>()
            })
            .collect())
    }
}

impl Scorable for FittedLogistic {
    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict_proba(&self, x: &DesignMatrix) -> PipelineResult<Vec<f64>> {
        let scores = self.decision_function(x)?;
        scores
            .into_iter()
            .enumerate()
            .map(|(row, z)| {
                if z.is_nan() {
                    Err(PipelineError::InvalidData(format!(
                        "non-numeric score at row {}",
                        row
                    )))
                } else {
                    Ok(sigmoid(z))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[f64]], names: &[&str]) -> DesignMatrix {
        let values = Mat::from_fn(rows.len(), names.len(), |i, j| rows[i][j]);
        DesignMatrix::new(values, names.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_sigmoid_bounds() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((softplus(0.0) - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_solve() {
        let a = Mat::from_fn(2, 2, |i, j| [[4.0, 2.0], [2.0, 3.0]][i][j]);
        let b = Mat::from_fn(2, 1, |i, _| [2.0, 1.0][i]);
        let x = cholesky_solve(&a, &b).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);

        let indefinite = Mat::from_fn(2, 2, |i, j| [[1.0, 2.0], [2.0, 1.0]][i][j]);
        assert!(cholesky_solve(&indefinite, &b).is_none());
    }

    #[test]
    fn test_line_search_rejects_ascent_direction() {
        let model = LogisticRegression::default();
        let z = Mat::from_fn(4, 2, |i, j| if j == 0 { [1.0, 2.0, 3.0, 4.0][i] } else { 1.0 });
        let y = [1.0, 1.0, 1.0, 0.0];
        let w = [1.0; 4];
        let beta = [0.0, 0.0];
        let loss = model.loss(&z, &y, &w, &beta);

        // Gradient of the loss at zero: z^T (0.5 - y)
        let grad: Vec<f64> = (0..2)
            .map(|j| (0..4).map(|i| z[(i, j)] * (0.5 - y[i])).sum())
            .collect();

        // Stepping against the descent direction never lowers a convex loss
        let uphill: Vec<f64> = grad.iter().map(|g| -g).collect();
        assert!(model.line_search(&z, &y, &w, &beta, &uphill, loss).is_none());

        let step = model.line_search(&z, &y, &w, &beta, &grad, loss).unwrap();
        assert!(step.loss <= loss);
        assert!(step.size > 0.0);
    }

    #[test]
    fn test_line_search_warning_is_reported() {
        let warning = FitWarning::LineSearch {
            iterations: 3,
            loss: 1.25,
        };
        assert!(warning.to_string().contains("line search found no descent"));
    }

    #[test]
    fn test_fit_separates_classes() {
        let x = matrix(
            &[&[1.0], &[2.0], &[3.0], &[4.0], &[6.0], &[7.0], &[8.0], &[9.0]],
            &["tenure"],
        );
        let y = [1.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0];

        let (model, report) = LogisticRegression::default().fit(&x, &y).unwrap();
        assert!(report.converged);
        assert!(report.warnings.is_empty());
        assert!(model.coefficients[0] < 0.0, "longer tenure should lower churn");

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[0] > proba[7]);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_single_class_rejected() {
        let x = matrix(&[&[1.0], &[2.0]], &["a"]);
        let result = LogisticRegression::default().fit(&x, &[0.0, 0.0]);
        assert!(matches!(result, Err(PipelineError::InvalidData(_))));
    }

    #[test]
    fn test_iteration_cap_reports_convergence_warning() {
        let x = matrix(&[&[1.0], &[2.0], &[3.0], &[4.0]], &["a"]);
        let model = LogisticRegression {
            max_iter: 1,
            tol: 1e-12,
            ..Default::default()
        };

        let (_, report) = model.fit(&x, &[0.0, 1.0, 0.0, 1.0]).unwrap();
        assert!(!report.converged);
        assert!(matches!(report.warnings[0], FitWarning::Convergence { max_iter: 1, .. }));
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let model = FittedLogistic {
            coefficients: vec![1.0, 2.0],
            intercept: 0.0,
        };
        let x = matrix(&[&[1.0]], &["a"]);
        assert!(model.predict_proba(&x).is_err());
    }
}
