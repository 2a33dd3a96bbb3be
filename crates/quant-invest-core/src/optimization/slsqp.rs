//! Sequential quadratic programming on the long-only simplex.
//!
//! Minimizes a smooth objective subject to `sum(w) = 1` and `w >= 0`. The
//! upper bound `w <= 1` is implied by the other two and never enters the
//! working set. Each iteration solves a quadratic model built from a damped
//! BFGS Hessian approximation with a primal active-set method, then takes an
//! Armijo backtracking step along the resulting direction. Every iterate is
//! feasible, so no merit function is needed.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::QuantInvestError;
use crate::optimization::linalg::{identity, mat_vec_multiply, max_abs, solve_linear_system, vec_dot};
use crate::optimization::objective::Objective;
use crate::QuantInvestResult;

/// A search direction this small means the KKT conditions hold.
const STEP_TOLERANCE: f64 = 1e-12;
/// QP sub-steps below this are roundoff of an already optimal working set.
const QP_STEP_TOLERANCE: f64 = 1e-13;
const MULTIPLIER_TOLERANCE: f64 = 1e-12;
const FEASIBILITY_TOLERANCE: f64 = 1e-9;
const ARMIJO_C1: f64 = 1e-4;
const MAX_BACKTRACKS: u32 = 40;
/// Powell damping threshold for the BFGS curvature condition.
const DAMPING_FACTOR: f64 = 0.2;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Iteration budget and stopping tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iterations: u32,
    /// Stop once an accepted step changes the objective by less than this.
    pub ftol: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            max_iterations: 500,
            ftol: 1e-9,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> QuantInvestResult<()> {
        if self.max_iterations == 0 {
            return Err(QuantInvestError::invalid(
                "solver.max_iterations",
                "Must be at least 1",
            ));
        }
        if !self.ftol.is_finite() || self.ftol <= 0.0 {
            return Err(QuantInvestError::invalid(
                "solver.ftol",
                format!("Must be a finite positive tolerance, got {}", self.ftol),
            ));
        }
        Ok(())
    }
}

/// A converged solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverReport {
    pub weights: Vec<f64>,
    pub objective: f64,
    pub iterations: u32,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Minimize `objective` over the unit simplex starting from `initial`.
///
/// `initial` must be feasible. Fails with `ConvergenceFailure` when the
/// iteration budget runs out or the line search cannot make progress, and
/// with `NumericalDegeneracy` when the objective turns non-finite or the
/// QP subproblem is singular.
pub fn minimize_on_simplex<O: Objective>(
    objective: &O,
    initial: &[f64],
    settings: &SolverSettings,
) -> QuantInvestResult<SolverReport> {
    settings.validate()?;
    let n = objective.dimension();
    validate_start(initial, n)?;

    let mut x = initial.to_vec();
    let mut f = objective.value(&x);
    let mut g = objective.gradient(&x);
    ensure_finite(f, &g)?;

    let mut hessian = identity(n);
    let mut fresh_model = true;
    let mut last_delta = f64::INFINITY;

    for iteration in 1..=settings.max_iterations {
        let direction = active_set_qp(&hessian, &g, &x)?;
        if max_abs(&direction) <= STEP_TOLERANCE {
            debug!(iteration, objective = f, "slsqp reached a KKT point");
            return Ok(SolverReport {
                weights: x,
                objective: f,
                iterations: iteration,
            });
        }

        let slope = vec_dot(&g, &direction);
        let step = if slope < 0.0 {
            backtrack(objective, &x, f, slope, &direction)
        } else {
            None
        };

        let (x_new, f_new) = match step {
            Some(accepted) => accepted,
            None if slope.abs() <= settings.ftol => {
                debug!(iteration, objective = f, "no measurable decrease left");
                return Ok(SolverReport {
                    weights: x,
                    objective: f,
                    iterations: iteration,
                });
            }
            None if !fresh_model => {
                // Quasi-Newton model went stale; restart it from the identity.
                trace!(iteration, "resetting BFGS model");
                hessian = identity(n);
                fresh_model = true;
                continue;
            }
            None => {
                return Err(QuantInvestError::ConvergenceFailure {
                    function: "slsqp line search".into(),
                    iterations: iteration,
                    last_delta,
                });
            }
        };

        let g_new = objective.gradient(&x_new);
        ensure_finite(f_new, &g_new)?;

        let s: Vec<f64> = x_new.iter().zip(x.iter()).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(g.iter()).map(|(a, b)| a - b).collect();
        damped_bfgs_update(&mut hessian, &s, &y);
        fresh_model = false;

        last_delta = (f - f_new).abs();
        x = x_new;
        f = f_new;
        g = g_new;
        trace!(iteration, objective = f, delta = last_delta, "slsqp step");

        if last_delta < settings.ftol {
            debug!(iteration, objective = f, "slsqp converged on function tolerance");
            return Ok(SolverReport {
                weights: x,
                objective: f,
                iterations: iteration,
            });
        }
    }

    Err(QuantInvestError::ConvergenceFailure {
        function: "slsqp".into(),
        iterations: settings.max_iterations,
        last_delta,
    })
}

// ---------------------------------------------------------------------------
// Line search
// ---------------------------------------------------------------------------

fn backtrack<O: Objective>(
    objective: &O,
    x: &[f64],
    f: f64,
    slope: f64,
    direction: &[f64],
) -> Option<(Vec<f64>, f64)> {
    let mut alpha = 1.0;
    for _ in 0..MAX_BACKTRACKS {
        let trial: Vec<f64> = x
            .iter()
            .zip(direction.iter())
            .map(|(xi, di)| (xi + alpha * di).max(0.0))
            .collect();
        let f_trial = objective.value(&trial);
        if f_trial.is_finite() && f_trial <= f + ARMIJO_C1 * alpha * slope {
            return Some((trial, f_trial));
        }
        alpha *= 0.5;
    }
    None
}

// ---------------------------------------------------------------------------
// QP subproblem
// ---------------------------------------------------------------------------

/// Solve `min g'd + 1/2 d'Bd  s.t.  sum(d) = 0, d >= -x` by a primal
/// active-set method starting from `d = 0`.
fn active_set_qp(hessian: &[Vec<f64>], gradient: &[f64], x: &[f64]) -> QuantInvestResult<Vec<f64>> {
    let n = x.len();
    let lower: Vec<f64> = x.iter().map(|xi| -xi).collect();
    let mut d = vec![0.0; n];
    let mut active: Vec<bool> = x.iter().map(|xi| *xi <= 0.0).collect();
    let max_iterations = 10 * n + 20;

    for _ in 0..max_iterations {
        let free: Vec<usize> = (0..n).filter(|&i| !active[i]).collect();
        if free.is_empty() {
            return Err(QuantInvestError::NumericalDegeneracy(
                "QP working set fixes every weight".into(),
            ));
        }

        // Gradient of the quadratic model at the current d.
        let q: Vec<f64> = mat_vec_multiply(hessian, &d)
            .iter()
            .zip(gradient.iter())
            .map(|(bd, gi)| bd + gi)
            .collect();
        let (p, budget_multiplier) = solve_equality_qp(hessian, &q, &free)?;

        if max_abs(&p) <= QP_STEP_TOLERANCE {
            // Optimal on this working set; release the bound whose
            // multiplier has the wrong sign, if any.
            let release = (0..n)
                .filter(|&i| active[i])
                .map(|i| (i, q[i] + budget_multiplier))
                .min_by(|a, b| a.1.total_cmp(&b.1));
            match release {
                Some((i, lambda)) if lambda < -MULTIPLIER_TOLERANCE => active[i] = false,
                _ => return Ok(d),
            }
            continue;
        }

        let mut alpha = 1.0;
        let mut blocking = None;
        for &i in &free {
            if p[i] < 0.0 {
                let ratio = ((lower[i] - d[i]) / p[i]).max(0.0);
                if ratio < alpha {
                    alpha = ratio;
                    blocking = Some(i);
                }
            }
        }
        for &i in &free {
            d[i] += alpha * p[i];
        }
        if let Some(i) = blocking {
            d[i] = lower[i];
            active[i] = true;
        }
    }

    Err(QuantInvestError::ConvergenceFailure {
        function: "active-set QP".into(),
        iterations: max_iterations as u32,
        last_delta: 0.0,
    })
}

/// Step `p` on the free variables with `sum(p) = 0`, plus the budget
/// multiplier, from the KKT system
/// `[B_FF 1; 1' 0] [p; mu] = [-q_F; 0]`.
fn solve_equality_qp(
    hessian: &[Vec<f64>],
    q: &[f64],
    free: &[usize],
) -> QuantInvestResult<(Vec<f64>, f64)> {
    let m = free.len();
    let mut kkt = vec![vec![0.0; m + 1]; m + 1];
    let mut rhs = vec![0.0; m + 1];
    for (a, &i) in free.iter().enumerate() {
        for (b, &j) in free.iter().enumerate() {
            kkt[a][b] = hessian[i][j];
        }
        kkt[a][m] = 1.0;
        kkt[m][a] = 1.0;
        rhs[a] = -q[i];
    }

    let solution = solve_linear_system(&kkt, &rhs)?;
    let mut p = vec![0.0; q.len()];
    for (a, &i) in free.iter().enumerate() {
        p[i] = solution[a];
    }
    Ok((p, solution[m]))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// BFGS update with Powell damping, which keeps the model positive definite
/// when the objective has negative curvature along the step.
fn damped_bfgs_update(hessian: &mut [Vec<f64>], s: &[f64], y: &[f64]) {
    let hs = mat_vec_multiply(hessian, s);
    let shs = vec_dot(s, &hs);
    if !shs.is_finite() || shs <= f64::EPSILON * f64::EPSILON {
        return;
    }
    let sy = vec_dot(s, y);
    let theta = if sy >= DAMPING_FACTOR * shs {
        1.0
    } else {
        (1.0 - DAMPING_FACTOR) * shs / (shs - sy)
    };
    let r: Vec<f64> = y
        .iter()
        .zip(hs.iter())
        .map(|(yi, hsi)| theta * yi + (1.0 - theta) * hsi)
        .collect();
    let sr = vec_dot(s, &r);
    if !sr.is_finite() || sr <= 0.0 {
        return;
    }
    for (i, row) in hessian.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell += r[i] * r[j] / sr - hs[i] * hs[j] / shs;
        }
    }
}

fn validate_start(initial: &[f64], n: usize) -> QuantInvestResult<()> {
    if n == 0 {
        return Err(QuantInvestError::invalid("initial", "Objective has no variables"));
    }
    if initial.len() != n {
        return Err(QuantInvestError::invalid(
            "initial",
            format!("Expected {} weights but got {}", n, initial.len()),
        ));
    }
    if initial.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(QuantInvestError::invalid(
            "initial",
            "Weights must be finite and non-negative",
        ));
    }
    let total: f64 = initial.iter().sum();
    if (total - 1.0).abs() > FEASIBILITY_TOLERANCE {
        return Err(QuantInvestError::invalid(
            "initial",
            format!("Weights must sum to 1, got {}", total),
        ));
    }
    Ok(())
}

fn ensure_finite(value: f64, gradient: &[f64]) -> QuantInvestResult<()> {
    if !value.is_finite() || gradient.iter().any(|g| !g.is_finite()) {
        return Err(QuantInvestError::NumericalDegeneracy(
            "Objective or gradient is not finite".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
