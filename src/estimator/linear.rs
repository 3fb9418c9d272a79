//! Ridge-regularized linear estimator
//!
//! A self-contained least-squares estimator solving the normal equations
//! with a Cholesky factorization. It exposes its coefficients as the
//! importance signal, which makes it a natural default for recursive
//! feature elimination.

use crate::error::{Result, RfeError};
use crate::estimator::{Capability, Estimator, ImportanceSignal};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve the symmetric positive-definite system `A x = b` via Cholesky.
///
/// `ridge` is added to the diagonal before factorization; a zero ridge is
/// retried once with a small diagonal bump when `A` is near-singular.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>, ridge: f64) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    // A = L * L^T
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] + ridge - sum;
                if diag <= 0.0 {
                    if ridge == 0.0 {
                        let bump =
                            1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
                        return cholesky_solve(a, b, bump.max(1e-12));
                    }
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Linear least-squares estimator with optional ridge penalty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearEstimator {
    /// Ridge penalty added to the normal equations (0.0 = plain OLS)
    pub alpha: f64,
    /// Whether to fit an intercept term
    pub fit_intercept: bool,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl Default for LinearEstimator {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl LinearEstimator {
    /// Create an estimator with the given ridge penalty
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            fit_intercept: true,
            coefficients: None,
            intercept: 0.0,
        }
    }

    /// Disable or enable the intercept term
    pub fn with_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    /// Fitted coefficients, one per feature
    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    /// Fitted intercept
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    fn design_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        if !self.fit_intercept {
            return x.to_owned();
        }
        let mut design = Array2::<f64>::ones((x.nrows(), x.ncols() + 1));
        design.slice_mut(ndarray::s![.., ..x.ncols()]).assign(x);
        design
    }
}

impl Estimator for LinearEstimator {
    fn fresh(&self) -> Box<dyn Estimator> {
        Box::new(Self {
            alpha: self.alpha,
            fit_intercept: self.fit_intercept,
            coefficients: None,
            intercept: 0.0,
        })
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(RfeError::ShapeError(format!(
                "X has {} rows but y has {} entries",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(RfeError::ShapeError("empty training data".to_string()));
        }

        let design = self.design_matrix(x);
        let xtx = design.t().dot(&design);
        let xty = design.t().dot(y);

        // The intercept column is not penalized
        let mut a = xtx;
        if self.alpha > 0.0 {
            for i in 0..x.ncols() {
                a[[i, i]] += self.alpha;
            }
        }

        let solution = cholesky_solve(&a, &xty, 0.0).ok_or_else(|| {
            RfeError::ValidationError(
                "normal equations are singular; consider a ridge penalty".to_string(),
            )
        })?;

        if self.fit_intercept {
            self.intercept = solution[x.ncols()];
            self.coefficients = Some(solution.slice(ndarray::s![..x.ncols()]).to_owned());
        } else {
            self.intercept = 0.0;
            self.coefficients = Some(solution);
        }
        Ok(())
    }

    fn importance(&self) -> Option<ImportanceSignal> {
        self.coefficients
            .as_ref()
            .map(|coefs| ImportanceSignal::Coefficients(coefs.clone().insert_axis(Axis(0))))
    }

    fn cache_token(&self) -> String {
        format!(
            "LinearEstimator(alpha={},fit_intercept={})",
            self.alpha, self.fit_intercept
        )
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(capability, Capability::Predict | Capability::Score)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefs = self
            .coefficients
            .as_ref()
            .ok_or_else(|| RfeError::NotFitted("LinearEstimator".to_string()))?;
        if x.ncols() != coefs.len() {
            return Err(RfeError::ShapeError(format!(
                "X has {} columns but model was fit on {}",
                x.ncols(),
                coefs.len()
            )));
        }
        Ok(x.dot(coefs) + self.intercept)
    }

    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let predictions = self.predict(x)?;
        let mean = y.mean().unwrap_or(0.0);
        let ss_tot: f64 = y.iter().map(|&v| (v - mean).powi(2)).sum();
        let ss_res: f64 = y
            .iter()
            .zip(predictions.iter())
            .map(|(&t, &p)| (t - p).powi(2))
            .sum();
        if ss_tot == 0.0 {
            return Ok(0.0);
        }
        Ok(1.0 - ss_res / ss_tot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_recovers_linear_relationship() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 0.0]];
        let y = array![3.0, 6.0, 7.0, 10.0, 11.0]; // y = 2*x0 + 1*x1 + 1

        let mut model = LinearEstimator::default();
        model.fit(&x, &y).unwrap();

        let coefs = model.coefficients().unwrap();
        assert!((coefs[0] - 2.0).abs() < 1e-6);
        assert!((coefs[1] - 1.0).abs() < 1e-6);
        assert!((model.intercept() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_score_is_r_squared() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let mut model = LinearEstimator::default();
        model.fit(&x, &y).unwrap();
        let score = model.score(&x, &y).unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_importance_is_coefficient_matrix() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 3.0], [4.0, 1.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let mut model = LinearEstimator::new(0.1);
        model.fit(&x, &y).unwrap();
        match model.importance().unwrap() {
            ImportanceSignal::Coefficients(coefs) => {
                assert_eq!(coefs.shape(), &[1, 2]);
            }
            _ => panic!("expected coefficients"),
        }
    }

    #[test]
    fn test_delegates_unavailable_are_typed() {
        let model = LinearEstimator::default();
        assert!(!model.supports(Capability::PredictProba));
        assert!(matches!(
            model.predict_proba(&array![[1.0]]),
            Err(RfeError::DelegateUnavailable(_))
        ));
    }
}
