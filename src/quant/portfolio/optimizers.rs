//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf{w}} \ \mathbf{w}^\top \Sigma \mathbf{w}
//! \quad\text{s.t.}\quad \sum_i w_i = 1,\ 0 \le w_i \le 1
//! $$
//!
//! Long-only, fully invested minimum-variance allocation.
//!
//! Accelerated projected gradient over the simplex $\Delta$, restarted whenever the momentum
//! step raises the cost. With $\mathbf{g}=2\Sigma\mathbf{w}$ the search stops on the duality gap
//!
//! $$
//! \mathbf{g}^\top\mathbf{w} - \min_i g_i \;\ge\; f(\mathbf{w}) - f^\*,
//! $$
//!
//! which is zero exactly at the KKT point.

use argmin::core::Error;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::core::IterState;
use argmin::core::Problem;
use argmin::core::Solver;
use argmin::core::TerminationReason;
use argmin::core::TerminationStatus;
use argmin::core::KV;
use tracing::debug;

use super::data::CovarianceMatrix;
use super::types::OptimalWeights;
use crate::error::PortfolioError;
use crate::error::Result;

/// Solver settings for [`optimize_min_variance`].
#[derive(Clone, Debug)]
pub struct MinVarianceConfig {
  /// Iteration budget; exhausting it is an error.
  pub max_iters: u64,
  /// Duality gap at which the weights count as optimal, measured on the covariance scaled to
  /// unit mean variance.
  pub gap_tolerance: f64,
  /// Weights below this are treated as numerical noise and zeroed.
  pub weight_floor: f64,
}

impl Default for MinVarianceConfig {
  fn default() -> Self {
    Self {
      max_iters: 50_000,
      gap_tolerance: 1e-11,
      weight_floor: 1e-8,
    }
  }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn mat_vec_mul(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
  mat.iter().map(|row| dot(row, v)).collect()
}

/// Euclidean projection onto the probability simplex (sort-and-threshold).
pub(crate) fn project_simplex(x: &[f64]) -> Vec<f64> {
  let mut u = x.to_vec();
  u.sort_by(|a, b| b.total_cmp(a));

  let mut cumsum = 0.0;
  let mut theta = 0.0;
  for (j, &uj) in u.iter().enumerate() {
    cumsum += uj;
    let t = (cumsum - 1.0) / (j + 1) as f64;
    if uj - t > 0.0 {
      theta = t;
    }
  }

  x.iter().map(|&xi| (xi - theta).max(0.0)).collect()
}

/// Frank-Wolfe duality gap of a simplex point given the gradient there.
pub(crate) fn simplex_gap(w: &[f64], grad: &[f64]) -> f64 {
  let min = grad.iter().copied().fold(f64::INFINITY, f64::min);
  dot(grad, w) - min
}

/// Upper bound on the largest eigenvalue of a symmetric matrix.
fn spectral_bound(mat: &[Vec<f64>]) -> f64 {
  let frobenius = mat.iter().flatten().map(|v| v * v).sum::<f64>().sqrt();
  let gershgorin = mat
    .iter()
    .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
    .fold(0.0, f64::max);
  frobenius.min(gershgorin)
}

/// Zero out sub-floor weights and rescale so the vector sums to exactly one.
fn clip_and_normalize(mut w: Vec<f64>, floor: f64) -> Vec<f64> {
  for wi in w.iter_mut() {
    if *wi < floor {
      *wi = 0.0;
    }
  }

  let sum: f64 = w.iter().sum();
  if sum <= 0.0 {
    let n = w.len() as f64;
    return vec![1.0 / n; w.len()];
  }
  w.iter().map(|wi| (wi / sum).min(1.0)).collect()
}

/// `w' Σ w`, exposed through its gradient `2 Σ w`.
struct MinVarianceProblem {
  cov: Vec<Vec<f64>>,
}

impl Gradient for MinVarianceProblem {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, w: &Self::Param) -> std::result::Result<Self::Gradient, Error> {
    Ok(mat_vec_mul(&self.cov, w).into_iter().map(|v| 2.0 * v).collect())
  }
}

type SimplexState = IterState<Vec<f64>, Vec<f64>, (), (), (), f64>;

/// Accelerated projected gradient on the probability simplex for quadratic costs.
///
/// The cost is read off the gradient as `w' g / 2`, so only gradients are evaluated.
struct SimplexProjectedGradient {
  step: f64,
  gap_tolerance: f64,
  momentum: f64,
  prev: Vec<f64>,
  grad: Vec<f64>,
  cost: f64,
  gap: f64,
}

impl SimplexProjectedGradient {
  /// `lipschitz` must bound the gradient's Lipschitz constant from above.
  fn new(lipschitz: f64, gap_tolerance: f64) -> Self {
    Self {
      step: 1.0 / lipschitz,
      gap_tolerance,
      momentum: 1.0,
      prev: Vec::new(),
      grad: Vec::new(),
      cost: f64::INFINITY,
      gap: f64::INFINITY,
    }
  }

  fn descend(&self, point: &[f64], grad: &[f64]) -> Vec<f64> {
    let moved: Vec<f64> = point
      .iter()
      .zip(grad.iter())
      .map(|(p, g)| p - self.step * g)
      .collect();
    project_simplex(&moved)
  }
}

impl<O> Solver<O, SimplexState> for SimplexProjectedGradient
where
  O: Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  const NAME: &'static str = "SimplexProjectedGradient";

  fn init(
    &mut self,
    problem: &mut Problem<O>,
    mut state: SimplexState,
  ) -> std::result::Result<(SimplexState, Option<KV>), Error> {
    let start = state
      .take_param()
      .ok_or_else(|| Error::msg("initial weights are required"))?;
    let w = project_simplex(&start);
    let grad = problem.gradient(&w)?;

    self.cost = 0.5 * dot(&grad, &w);
    self.gap = simplex_gap(&w, &grad);
    self.grad = grad;
    self.prev = w.clone();
    Ok((state.param(w).cost(self.cost), None))
  }

  fn next_iter(
    &mut self,
    problem: &mut Problem<O>,
    mut state: SimplexState,
  ) -> std::result::Result<(SimplexState, Option<KV>), Error> {
    let w = state
      .take_param()
      .ok_or_else(|| Error::msg("solver state has no weights"))?;

    let next_momentum = 0.5 * (1.0 + (1.0 + 4.0 * self.momentum * self.momentum).sqrt());
    let beta = (self.momentum - 1.0) / next_momentum;
    let y: Vec<f64> = w
      .iter()
      .zip(self.prev.iter())
      .map(|(a, b)| a + beta * (a - b))
      .collect();

    let grad_y = problem.gradient(&y)?;
    let mut candidate = self.descend(&y, &grad_y);
    let mut grad = problem.gradient(&candidate)?;
    let mut cost = 0.5 * dot(&grad, &candidate);
    self.momentum = next_momentum;

    // Momentum overshot: restart with a plain step, which cannot increase the cost.
    if cost > self.cost {
      candidate = self.descend(&w, &self.grad);
      grad = problem.gradient(&candidate)?;
      cost = 0.5 * dot(&grad, &candidate);
      self.momentum = 1.0;
    }

    self.gap = simplex_gap(&candidate, &grad);
    self.grad = grad;
    self.cost = cost;
    self.prev = w;
    Ok((state.param(candidate).cost(cost), None))
  }

  fn terminate(&mut self, _state: &SimplexState) -> TerminationStatus {
    if self.gap <= self.gap_tolerance {
      TerminationStatus::Terminated(TerminationReason::SolverConverged)
    } else {
      TerminationStatus::NotTerminated
    }
  }
}

fn optimization_error(iterations: u64, reason: impl Into<String>) -> PortfolioError {
  PortfolioError::Optimization {
    iterations,
    reason: reason.into(),
  }
}

/// Minimum-variance weights for the tickers of `cov`, starting from equal weights.
pub fn optimize_min_variance(
  cov: &CovarianceMatrix,
  config: &MinVarianceConfig,
) -> Result<OptimalWeights> {
  let n = cov.len();
  if n == 0 {
    return Err(PortfolioError::validation("covariance matrix has no tickers"));
  }
  if cov.values.shape() != [n, n] {
    return Err(PortfolioError::validation(format!(
      "covariance matrix shape {:?} does not match {n} tickers",
      cov.values.shape()
    )));
  }
  if cov.values.iter().any(|v| !v.is_finite()) {
    return Err(PortfolioError::validation(
      "covariance matrix contains non-finite values",
    ));
  }

  if n == 1 {
    return Ok(OptimalWeights {
      tickers: cov.tickers.clone(),
      weights: vec![1.0],
      variance: cov.values[[0, 0]],
      iterations: 0,
    });
  }

  let equal = vec![1.0 / n as f64; n];
  // Scaling to unit mean variance makes the gap tolerance independent of return units.
  let scale = cov.values.diag().sum() / n as f64;
  if scale <= 0.0 {
    return Ok(OptimalWeights {
      tickers: cov.tickers.clone(),
      variance: cov.quadratic_form(&equal),
      weights: equal,
      iterations: 0,
    });
  }

  let normalized: Vec<Vec<f64>> = cov
    .values
    .rows()
    .into_iter()
    .map(|row| row.iter().map(|v| v / scale).collect())
    .collect();

  let lipschitz = 2.0 * spectral_bound(&normalized);
  let solver = SimplexProjectedGradient::new(lipschitz, config.gap_tolerance);
  let problem = MinVarianceProblem { cov: normalized };

  let res = Executor::new(problem, solver)
    .configure(|state| state.param(equal).max_iters(config.max_iters))
    .run()
    .map_err(|e| optimization_error(0, e.to_string()))?;

  let iterations = res.state.iter;
  debug!(
    iterations,
    gap = res.solver.gap,
    status = ?res.state.termination_status,
    "min-variance solver finished"
  );

  if let TerminationStatus::Terminated(TerminationReason::MaxItersReached) =
    res.state.termination_status
  {
    return Err(optimization_error(
      iterations,
      format!("duality gap {:.3e} still above tolerance", res.solver.gap),
    ));
  }

  let best = res
    .state
    .best_param
    .ok_or_else(|| optimization_error(iterations, "solver returned no parameters"))?;

  let weights = clip_and_normalize(best, config.weight_floor);
  let variance = cov.quadratic_form(&weights);

  Ok(OptimalWeights {
    tickers: cov.tickers.clone(),
    weights,
    variance,
    iterations,
  })
}
