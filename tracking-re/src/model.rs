use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{Result, TrackingError};
use crate::run::{ParamValue, Params};

/// Optimisation strategy for [`LogisticRegression::fit`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Solver {
    /// Full-batch gradient descent.
    Gd,
    /// Mini-batch stochastic gradient descent with seeded shuffling.
    Sgd,
}

impl Solver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Solver::Gd => "gd",
            Solver::Sgd => "sgd",
        }
    }
}

/// Hyperparameters for the logistic regression classifier.
#[derive(Clone, Debug)]
pub struct LogisticRegressionParams {
    pub solver: Solver,
    /// Number of passes over the training data.
    pub max_iter: usize,
    pub learning_rate: f64,
    /// L2 penalty strength on the weights.
    pub l2: f64,
    /// Mini-batch size, only used by [`Solver::Sgd`].
    pub batch_size: usize,
    /// Seed for mini-batch shuffling.
    pub random_state: u64,
    /// Full-batch training stops once the largest gradient entry drops below this.
    pub tol: f64,
}

impl Default for LogisticRegressionParams {
    fn default() -> Self {
        Self {
            solver: Solver::Gd,
            max_iter: 1000,
            learning_rate: 0.1,
            l2: 0.0,
            batch_size: 16,
            random_state: 8888,
            tol: 1e-6,
        }
    }
}

impl LogisticRegressionParams {
    /// Build from a logged hyperparameter map. Unknown names and
    /// out-of-range values are training errors.
    pub fn from_params(params: &Params) -> Result<Self> {
        let mut out = Self::default();
        for (key, value) in params {
            match key.as_str() {
                "solver" => {
                    out.solver = match value.as_str() {
                        Some("gd") => Solver::Gd,
                        Some("sgd") => Solver::Sgd,
                        _ => return Err(invalid(key, value, "expected \"gd\" or \"sgd\"")),
                    }
                }
                "max_iter" => out.max_iter = positive_usize(key, value)?,
                "batch_size" => out.batch_size = positive_usize(key, value)?,
                "random_state" => {
                    out.random_state = value
                        .as_i64()
                        .and_then(|v| u64::try_from(v).ok())
                        .ok_or_else(|| invalid(key, value, "expected a non-negative integer"))?
                }
                "learning_rate" => {
                    out.learning_rate = value
                        .as_f64()
                        .filter(|v| v.is_finite() && *v > 0.0)
                        .ok_or_else(|| invalid(key, value, "expected a positive number"))?
                }
                "l2" => {
                    out.l2 = value
                        .as_f64()
                        .filter(|v| v.is_finite() && *v >= 0.0)
                        .ok_or_else(|| invalid(key, value, "expected a non-negative number"))?
                }
                "tol" => {
                    out.tol = value
                        .as_f64()
                        .filter(|v| v.is_finite() && *v >= 0.0)
                        .ok_or_else(|| invalid(key, value, "expected a non-negative number"))?
                }
                other => {
                    return Err(TrackingError::training(format!(
                        "unknown hyperparameter '{other}'"
                    )))
                }
            }
        }
        Ok(out)
    }
}

fn invalid(key: &str, value: &ParamValue, expected: &str) -> TrackingError {
    TrackingError::training(format!("invalid value '{value}' for '{key}': {expected}"))
}

fn positive_usize(key: &str, value: &ParamValue) -> Result<usize> {
    value
        .as_i64()
        .filter(|v| *v > 0)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| invalid(key, value, "expected a positive integer"))
}

/// Fully connected layer.
#[derive(Clone, Debug)]
pub struct Linear {
    weight: Array2<f64>, // out x in
    bias: Array1<f64>,
}

impl Linear {
    pub fn zeros(in_features: usize, out_features: usize) -> Self {
        Self {
            weight: Array2::zeros((out_features, in_features)),
            bias: Array1::zeros(out_features),
        }
    }

    pub fn from_parts(weight: Array2<f64>, bias: Array1<f64>) -> Result<Self> {
        if weight.nrows() != bias.len() {
            return Err(TrackingError::artifact(format!(
                "weight has {} rows but bias has {} entries",
                weight.nrows(),
                bias.len()
            )));
        }
        Ok(Self { weight, bias })
    }

    pub fn weight(&self) -> &Array2<f64> {
        &self.weight
    }

    pub fn bias(&self) -> &Array1<f64> {
        &self.bias
    }

    pub fn forward(&self, x: &ArrayView2<f64>) -> Array2<f64> {
        let mut y = x.dot(&self.weight.t());
        y += &self.bias.view().insert_axis(Axis(0));
        y
    }
}

/// Row-wise softmax, shifted by the row maximum for stability.
pub fn softmax(logits: &mut Array2<f64>) {
    for mut row in logits.axis_iter_mut(Axis(0)) {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
}

/// Multinomial logistic regression over standardized features.
#[derive(Clone, Debug)]
pub struct LogisticRegression {
    classes: Vec<i64>,
    mean: Array1<f64>,
    scale: Array1<f64>,
    linear: Linear,
}

impl LogisticRegression {
    /// Fit on `x` (rows x features) against integer labels `y`.
    pub fn fit(x: &Array2<f64>, y: &Array1<i64>, params: &LogisticRegressionParams) -> Result<Self> {
        let (n, d) = x.dim();
        if n == 0 || d == 0 {
            return Err(TrackingError::training("cannot fit on an empty feature matrix"));
        }
        if y.len() != n {
            return Err(TrackingError::training(format!(
                "{n} feature rows but {} labels",
                y.len()
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(TrackingError::training("feature matrix contains non-finite values"));
        }
        let classes: Vec<i64> = y.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if classes.len() < 2 {
            return Err(TrackingError::training(
                "training labels must contain at least two classes",
            ));
        }
        let k = classes.len();

        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(d));
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        let xs = (x - &mean.view().insert_axis(Axis(0))) / &scale.view().insert_axis(Axis(0));

        let mut onehot = Array2::<f64>::zeros((n, k));
        for (i, label) in y.iter().enumerate() {
            // classes is sorted and built from y
            if let Ok(c) = classes.binary_search(label) {
                onehot[[i, c]] = 1.0;
            }
        }

        let mut linear = Linear::zeros(d, k);
        match params.solver {
            Solver::Gd => {
                for _ in 0..params.max_iter {
                    let max_grad = gradient_step(&mut linear, &xs, &onehot, params);
                    if max_grad < params.tol {
                        break;
                    }
                }
            }
            Solver::Sgd => {
                let mut rng = StdRng::seed_from_u64(params.random_state);
                let mut order: Vec<usize> = (0..n).collect();
                for _ in 0..params.max_iter {
                    order.shuffle(&mut rng);
                    for chunk in order.chunks(params.batch_size) {
                        let xb = xs.select(Axis(0), chunk);
                        let yb = onehot.select(Axis(0), chunk);
                        gradient_step(&mut linear, &xb, &yb, params);
                    }
                }
            }
        }

        if linear.weight.iter().chain(linear.bias.iter()).any(|v| !v.is_finite()) {
            return Err(TrackingError::training(
                "optimisation diverged; lower the learning rate",
            ));
        }

        debug!(solver = params.solver.as_str(), samples = n, classes = k, "classifier fitted");
        Ok(Self {
            classes,
            mean,
            scale,
            linear,
        })
    }

    /// Rebuild a fitted model from its stored parts.
    pub fn from_parts(
        classes: Vec<i64>,
        mean: Array1<f64>,
        scale: Array1<f64>,
        weight: Array2<f64>,
        bias: Array1<f64>,
    ) -> Result<Self> {
        let d = mean.len();
        if scale.len() != d || weight.ncols() != d || weight.nrows() != classes.len() {
            return Err(TrackingError::artifact(format!(
                "inconsistent model shapes: {} classes, {} means, {} scales, weight {:?}",
                classes.len(),
                d,
                scale.len(),
                weight.dim()
            )));
        }
        Ok(Self {
            classes,
            mean,
            scale,
            linear: Linear::from_parts(weight, bias)?,
        })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    pub fn linear(&self) -> &Linear {
        &self.linear
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.n_features() {
            return Err(TrackingError::validation(format!(
                "expected {} features per row, got {}",
                self.n_features(),
                x.ncols()
            )));
        }
        Ok(())
    }

    /// Raw class scores, one column per class.
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x)?;
        let xs = (x - &self.mean.view().insert_axis(Axis(0)))
            / &self.scale.view().insert_axis(Axis(0));
        Ok(self.linear.forward(&xs.view()))
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut logits = self.decision_function(x)?;
        softmax(&mut logits);
        Ok(logits)
    }

    /// One class label per input row.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let scores = self.decision_function(x)?;
        Ok(scores
            .axis_iter(Axis(0))
            .map(|row| self.classes[argmax(row.iter())])
            .collect())
    }
}

/// One descent step on a batch. Returns the largest absolute gradient entry.
fn gradient_step(
    linear: &mut Linear,
    x: &Array2<f64>,
    onehot: &Array2<f64>,
    params: &LogisticRegressionParams,
) -> f64 {
    let m = x.nrows() as f64;
    let mut probs = linear.forward(&x.view());
    softmax(&mut probs);
    let residual = probs - onehot;
    let grad_w = residual.t().dot(x) / m + &(&linear.weight * params.l2);
    let grad_b = residual.sum_axis(Axis(0)) / m;

    linear.weight.scaled_add(-params.learning_rate, &grad_w);
    linear.bias.scaled_add(-params.learning_rate, &grad_b);

    grad_w
        .iter()
        .chain(grad_b.iter())
        .fold(0.0_f64, |acc, g| acc.max(g.abs()))
}

fn argmax<'a>(values: impl Iterator<Item = &'a f64>) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &v) in values.enumerate() {
        if v > best_val {
            best = i;
            best_val = v;
        }
    }
    best
}
