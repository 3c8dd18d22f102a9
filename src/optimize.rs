//! Per-node choice of next-period assets.
//!
//! Each collocation node solves a bounded scalar maximization. The objective is
//! continuous but kinked wherever the interpolated price schedule is, and need not be
//! concave, so the search first scans the debt nodes inside the bracket and then runs a
//! golden-section refinement around the best scanned point.

use log::warn;
use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::basis::Basis;
use crate::budget::{consumption, crra_utility};
use crate::economy::CollocationNodes;
use crate::error::{Result, SovereignError};
use crate::pricing::PriceSchedule;

const INV_GOLDEN: f64 = 0.618_033_988_749_894_8;

/// Optimal next-period assets at one node and the attained objective.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeChoice {
    pub next_assets: f64,
    pub value: f64,
}

/// Golden-section search for the maximum of `objective` on `[lower, upper]`.
pub fn golden_section_max<F>(objective: F, lower: f64, upper: f64, tolerance: f64) -> NodeChoice
where
    F: Fn(f64) -> f64,
{
    let mut a = lower;
    let mut b = upper;
    let mut c = b - INV_GOLDEN * (b - a);
    let mut d = a + INV_GOLDEN * (b - a);
    let mut fc = objective(c);
    let mut fd = objective(d);

    while b - a > tolerance {
        if fc >= fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_GOLDEN * (b - a);
            fc = objective(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_GOLDEN * (b - a);
            fd = objective(d);
        }
    }

    if fc >= fd {
        NodeChoice {
            next_assets: c,
            value: fc,
        }
    } else {
        NodeChoice {
            next_assets: d,
            value: fd,
        }
    }
}

/// Maximizes `objective` on `[lower, upper]`, scanning `candidates` (plus both bounds)
/// before refining around the best one.
///
/// Fails with [`SovereignError::InfeasibleNode`] when the bracket is empty or no point
/// in it yields a finite objective.
pub fn maximize_bracketed<F>(
    node: usize,
    objective: F,
    lower: f64,
    upper: f64,
    candidates: &[f64],
    tolerance: f64,
) -> Result<NodeChoice>
where
    F: Fn(f64) -> f64,
{
    if !(upper >= lower) {
        return Err(SovereignError::InfeasibleNode { node, lower, upper });
    }

    let mut points = Vec::with_capacity(candidates.len() + 2);
    points.push(lower);
    points.extend(candidates.iter().copied().filter(|x| *x > lower && *x < upper));
    if upper > lower {
        points.push(upper);
    }

    let mut best_index = 0;
    let mut best = f64::NEG_INFINITY;
    for (index, x) in points.iter().enumerate() {
        let value = objective(*x);
        if value > best {
            best = value;
            best_index = index;
        }
    }
    if !best.is_finite() {
        return Err(SovereignError::InfeasibleNode { node, lower, upper });
    }

    let scanned = NodeChoice {
        next_assets: points[best_index],
        value: best,
    };
    if points.len() < 2 {
        return Ok(scanned);
    }

    let left = points[best_index.saturating_sub(1)];
    let right = points[(best_index + 1).min(points.len() - 1)];
    let refined = golden_section_max(&objective, left, right, tolerance);
    if refined.value > scanned.value {
        Ok(refined)
    } else {
        Ok(scanned)
    }
}

/// The debt-choice problem at every collocation node for one sweep.
///
/// Borrows the current expected-continuation coefficients and price schedule; nothing
/// shared is written while nodes are solved, so nodes can run on any thread.
#[derive(Clone, Copy, Debug)]
pub struct DebtChoiceProblem<'a> {
    pub(crate) debt_basis: &'a dyn Basis,
    pub(crate) prices: &'a PriceSchedule,
    /// Debt-basis coefficients of the expected continuation value, one column per income state.
    pub(crate) continuation: &'a DMatrix<f64>,
    pub(crate) beta: f64,
    pub(crate) gamma: f64,
    pub(crate) lower: f64,
    pub(crate) upper: f64,
    pub(crate) buffer: f64,
    pub(crate) tolerance: f64,
}

impl<'a> DebtChoiceProblem<'a> {
    /// Current utility plus discounted expected continuation from choosing `next_assets`.
    pub fn objective(
        &self,
        income_index: usize,
        income: f64,
        assets: f64,
        next_assets: f64,
    ) -> f64 {
        let price = self.prices.price(income_index, next_assets);
        let utility = crra_utility(consumption(income, assets, price, next_assets), self.gamma);
        if utility == f64::NEG_INFINITY {
            return utility;
        }
        let nb = self.continuation.nrows();
        let coefficients =
            &self.continuation.as_slice()[income_index * nb..(income_index + 1) * nb];
        utility + self.beta * self.debt_basis.interpolate(next_assets, coefficients)
    }

    /// Admissible range of next-period assets for a sovereign with current `income`.
    pub fn bounds(&self, income: f64) -> (f64, f64) {
        (self.lower, (income - self.buffer).min(self.upper))
    }

    /// Solves one node, reporting an empty or entirely infeasible bracket as an error.
    pub fn solve_node(
        &self,
        node: usize,
        income_index: usize,
        income: f64,
        assets: f64,
    ) -> Result<NodeChoice> {
        let (lower, upper) = self.bounds(income);
        maximize_bracketed(
            node,
            |next| self.objective(income_index, income, assets, next),
            lower,
            upper,
            self.debt_basis.nodes(),
            self.tolerance,
        )
    }

    /// Solves one node, falling back to the debt floor when no feasible choice exists.
    pub fn choose(&self, node: usize, income_index: usize, income: f64, assets: f64) -> NodeChoice {
        match self.solve_node(node, income_index, income, assets) {
            Ok(choice) => choice,
            Err(err) => {
                warn!("{err}; clamping to the debt floor {}", self.lower);
                self.floor_choice(income_index, income, assets)
            }
        }
    }

    /// The debt floor and its objective, used when a state has no feasible choice.
    pub fn floor_choice(&self, income_index: usize, income: f64, assets: f64) -> NodeChoice {
        NodeChoice {
            next_assets: self.lower,
            value: self.objective(income_index, income, assets, self.lower),
        }
    }

    /// Solves every collocation node, in parallel on the rayon pool when requested.
    pub fn solve_all(&self, nodes: &CollocationNodes, parallel: bool) -> Vec<NodeChoice> {
        let solve = |node: usize| {
            self.choose(
                node,
                nodes.income_index(node),
                nodes.income(node),
                nodes.debt(node),
            )
        };
        if parallel {
            (0..nodes.len()).into_par_iter().map(solve).collect()
        } else {
            (0..nodes.len()).map(solve).collect()
        }
    }
}
