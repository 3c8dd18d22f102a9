//! Finite Markov chains for the log-income process.
//!
//! The solver only needs a list of income levels and a row-stochastic transition
//! matrix, so any discretization can be supplied through [`MarkovChain::new`].
//! [`MarkovChain::tauchen`] and [`MarkovChain::rouwenhorst`] cover the usual
//! AR(1) case `ln y' = rho ln y + eta e'`.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{Result, SovereignError};

const ROW_SUM_SLACK: f64 = 1e-10;

/// Income levels paired with the probabilities of moving between them.
#[derive(Clone, Debug)]
pub struct MarkovChain {
    states: DVector<f64>,
    transition: DMatrix<f64>,
}

impl MarkovChain {
    /// Builds a chain from income levels and a transition matrix, validating that
    /// every row is a probability distribution.
    pub fn new(states: DVector<f64>, transition: DMatrix<f64>) -> Result<Self> {
        let n = states.len();
        if n == 0 {
            return Err(SovereignError::dimension_mismatch("income states", 1, 0));
        }
        if transition.nrows() != n {
            return Err(SovereignError::dimension_mismatch(
                "transition rows",
                n,
                transition.nrows(),
            ));
        }
        if transition.ncols() != n {
            return Err(SovereignError::dimension_mismatch(
                "transition columns",
                n,
                transition.ncols(),
            ));
        }
        for (row, values) in transition.row_iter().enumerate() {
            let sum: f64 = values.iter().sum();
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if (sum - 1.0).abs() > ROW_SUM_SLACK || min < 0.0 || max > 1.0 || !sum.is_finite() {
                return Err(SovereignError::InvalidTransitionMatrix { row, sum, min });
            }
        }
        if states.iter().any(|y| !y.is_finite()) {
            return Err(SovereignError::invalid_parameter(
                "income state",
                f64::NAN,
                "income levels must be finite",
            ));
        }
        Ok(Self { states, transition })
    }

    /// Tauchen (1986) discretization of `ln y' = rho ln y + eta e'`, returning
    /// income in levels. The grid spans `width` unconditional standard deviations.
    pub fn tauchen(n: usize, rho: f64, eta: f64, width: f64) -> Result<Self> {
        if n == 0 {
            return Err(SovereignError::dimension_mismatch("income states", 1, 0));
        }
        if n == 1 {
            return Self::new(DVector::from_element(1, 1.0), DMatrix::identity(1, 1));
        }

        let std_y = eta / (1.0 - rho * rho).sqrt();
        let z_max = width * std_y;
        let step = 2.0 * z_max / (n - 1) as f64;
        let z: Vec<f64> = (0..n).map(|i| -z_max + step * i as f64).collect();
        let normal = Normal::standard();

        let mut transition = DMatrix::zeros(n, n);
        for i in 0..n {
            let mean = rho * z[i];
            for j in 0..n {
                let upper = (z[j] - mean + step / 2.0) / eta;
                let lower = (z[j] - mean - step / 2.0) / eta;
                transition[(i, j)] = if j == 0 {
                    normal.cdf(upper)
                } else if j == n - 1 {
                    1.0 - normal.cdf(lower)
                } else {
                    normal.cdf(upper) - normal.cdf(lower)
                };
            }
            normalize_row(&mut transition, i);
        }

        let states = DVector::from_iterator(n, z.iter().map(|value| value.exp()));
        Self::new(states, transition)
    }

    /// Rouwenhorst (1995) discretization; matches the conditional mean and variance
    /// of the AR(1) exactly and is preferred for highly persistent processes.
    pub fn rouwenhorst(n: usize, rho: f64, eta: f64) -> Result<Self> {
        if n == 0 {
            return Err(SovereignError::dimension_mismatch("income states", 1, 0));
        }
        if n == 1 {
            return Self::new(DVector::from_element(1, 1.0), DMatrix::identity(1, 1));
        }

        let p = (1.0 + rho) / 2.0;
        let mut theta = DMatrix::from_row_slice(2, 2, &[p, 1.0 - p, 1.0 - p, p]);
        for size in 3..=n {
            let mut next = DMatrix::zeros(size, size);
            for i in 0..size - 1 {
                for j in 0..size - 1 {
                    let value = theta[(i, j)];
                    next[(i, j)] += p * value;
                    next[(i, j + 1)] += (1.0 - p) * value;
                    next[(i + 1, j)] += (1.0 - p) * value;
                    next[(i + 1, j + 1)] += p * value;
                }
            }
            for i in 1..size - 1 {
                for j in 0..size {
                    next[(i, j)] /= 2.0;
                }
            }
            theta = next;
        }
        for i in 0..n {
            normalize_row(&mut theta, i);
        }

        let std_y = eta / (1.0 - rho * rho).sqrt();
        let psi = ((n - 1) as f64).sqrt() * std_y;
        let step = 2.0 * psi / (n - 1) as f64;
        let states = DVector::from_iterator(n, (0..n).map(|i| (-psi + step * i as f64).exp()));
        Self::new(states, theta)
    }

    /// Number of income states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always false for a validated chain.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Income levels in ascending grid order.
    pub fn states(&self) -> &DVector<f64> {
        &self.states
    }

    /// Transition matrix, `transition[(i, j)] = P(y' = y_j | y = y_i)`.
    pub fn transition(&self) -> &DMatrix<f64> {
        &self.transition
    }

    /// Arithmetic mean of the income grid.
    pub fn mean_state(&self) -> f64 {
        self.states.mean()
    }

    /// Stationary distribution obtained by power iteration from the uniform guess.
    pub fn stationary_distribution(&self) -> DVector<f64> {
        let n = self.len();
        let transposed = self.transition.transpose();
        let mut pi = DVector::from_element(n, 1.0 / n as f64);
        for _ in 0..100_000 {
            let next = &transposed * &pi;
            let gap = (&next - &pi).amax();
            pi = next;
            if gap < 1e-15 {
                break;
            }
        }
        let total = pi.sum();
        pi / total
    }

    /// Draws the successor of state `current` using the uniform variate `u` in `[0, 1)`.
    pub fn next_state(&self, current: usize, u: f64) -> usize {
        let mut cumulative = 0.0;
        for (j, probability) in self.transition.row(current).iter().enumerate() {
            cumulative += probability;
            if u < cumulative {
                return j;
            }
        }
        self.len() - 1
    }

    /// Samples a path of state indices of length `periods` starting at `initial`.
    pub fn sample_path<R: Rng + ?Sized>(
        &self,
        initial: usize,
        periods: usize,
        rng: &mut R,
    ) -> Vec<usize> {
        let mut path = Vec::with_capacity(periods);
        let mut state = initial.min(self.len() - 1);
        for _ in 0..periods {
            path.push(state);
            state = self.next_state(state, rng.gen::<f64>());
        }
        path
    }
}

fn normalize_row(matrix: &mut DMatrix<f64>, row: usize) {
    let sum: f64 = matrix.row(row).iter().sum();
    if sum > 0.0 {
        for value in matrix.row_mut(row).iter_mut() {
            *value /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn assert_stochastic(chain: &MarkovChain) {
        for row in chain.transition().row_iter() {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() <= 1e-12, "row sum {sum}");
            assert!(row.iter().all(|p| *p >= 0.0 && *p <= 1.0));
        }
    }

    #[test]
    fn tauchen_rows_are_probability_distributions() {
        let chain = MarkovChain::tauchen(15, 0.945, 0.025, 3.0).unwrap();
        assert_eq!(chain.len(), 15);
        assert_stochastic(&chain);
        // Symmetric grid in logs around zero.
        assert_relative_eq!(chain.states()[7], 1.0, epsilon = 1e-12);
        assert_relative_eq!(
            chain.states()[0] * chain.states()[14],
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn rouwenhorst_rows_are_probability_distributions() {
        let chain = MarkovChain::rouwenhorst(7, 0.9, 0.02).unwrap();
        assert_stochastic(&chain);
        let pi = chain.stationary_distribution();
        assert_relative_eq!(pi.sum(), 1.0, epsilon = 1e-12);
        // Stationary distribution of Rouwenhorst is binomial(n - 1, 1/2).
        assert_relative_eq!(pi[0], 1.0 / 64.0, epsilon = 1e-8);
        assert_relative_eq!(pi[3], 20.0 / 64.0, epsilon = 1e-8);
    }

    #[test]
    fn single_state_is_degenerate() {
        let chain = MarkovChain::tauchen(1, 0.9, 0.1, 3.0).unwrap();
        assert_eq!(chain.transition()[(0, 0)], 1.0);
        assert_eq!(chain.states()[0], 1.0);
    }

    #[test]
    fn new_rejects_non_stochastic_rows() {
        let states = DVector::from_vec(vec![0.9, 1.1]);
        let transition = DMatrix::from_row_slice(2, 2, &[0.5, 0.6, 0.5, 0.5]);
        let result = MarkovChain::new(states, transition);
        assert!(matches!(
            result,
            Err(SovereignError::InvalidTransitionMatrix { row: 0, .. })
        ));
    }

    #[test]
    fn sampled_path_respects_absorbing_state() {
        let states = DVector::from_vec(vec![0.9, 1.1]);
        let transition = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 1.0]);
        let chain = MarkovChain::new(states, transition).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let path = chain.sample_path(0, 50, &mut rng);
        assert_eq!(path[0], 0);
        assert!(path[1..].iter().all(|state| *state == 1));
    }
}
