//! One-dimensional interpolation bases and the collocation linear systems built from them.
//!
//! A function is represented as `f(x) = sum_j phi_j(x) c_j`. Every basis has as many
//! functions as collocation nodes, so the basis matrix evaluated at its own nodes is
//! square and invertible. Two-dimensional functions on the (debt, income) plane use
//! the row-wise tensor product produced by [`combine`].

use std::fmt;

use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};

use crate::error::{Result, SovereignError};

/// Capability interface shared by all one-dimensional bases.
pub trait Basis: Send + Sync + fmt::Debug {
    /// Number of basis functions, equal to the number of collocation nodes.
    fn len(&self) -> usize;

    /// Collocation nodes in ascending order.
    fn nodes(&self) -> &[f64];

    /// Writes `phi_j(x)` for every `j` into `row`, which must have length [`Basis::len`].
    fn evaluate_into(&self, x: f64, row: &mut [f64]);

    /// Evaluates `sum_j phi_j(x) coefficients[j]` without materializing the row.
    fn interpolate(&self, x: f64, coefficients: &[f64]) -> f64;

    /// Returns false; bases always contain at least one function.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Matrix of basis values, one row per point.
    fn evaluate(&self, points: &[f64]) -> DMatrix<f64> {
        let n = self.len();
        let mut matrix = DMatrix::zeros(points.len(), n);
        let mut row = vec![0.0; n];
        for (i, x) in points.iter().enumerate() {
            self.evaluate_into(*x, &mut row);
            for (j, value) in row.iter().enumerate() {
                matrix[(i, j)] = *value;
            }
        }
        matrix
    }

    /// Basis matrix at the collocation nodes.
    fn node_matrix(&self) -> DMatrix<f64> {
        self.evaluate(self.nodes())
    }
}

/// Piecewise-linear "hat" functions on arbitrary increasing breakpoints.
///
/// The basis matrix at the breakpoints is the identity. Outside the breakpoint range
/// the end segments are extended linearly. A single breakpoint gives the constant basis.
#[derive(Clone, Debug)]
pub struct LinearSplineBasis {
    breakpoints: Vec<f64>,
}

impl LinearSplineBasis {
    /// Builds the basis, requiring finite, strictly increasing breakpoints.
    pub fn new(breakpoints: Vec<f64>) -> Result<Self> {
        if breakpoints.is_empty() {
            return Err(SovereignError::dimension_mismatch("spline breakpoints", 1, 0));
        }
        if breakpoints.iter().any(|x| !x.is_finite()) {
            return Err(SovereignError::invalid_parameter(
                "breakpoint",
                f64::NAN,
                "breakpoints must be finite",
            ));
        }
        if let Some(pair) = breakpoints.windows(2).find(|w| w[1] <= w[0]) {
            return Err(SovereignError::invalid_parameter(
                "breakpoint",
                pair[1],
                "breakpoints must be strictly increasing",
            ));
        }
        Ok(Self { breakpoints })
    }

    /// Evenly spaced breakpoints on `[lower, upper]`.
    pub fn uniform(n: usize, lower: f64, upper: f64) -> Result<Self> {
        Self::new(linspace(lower, upper, n))
    }

    /// Index of the left breakpoint of the active segment and the weight on the right one.
    fn segment(&self, x: f64) -> (usize, f64) {
        let points = &self.breakpoints;
        let last = points.len() - 2;
        let left = points.partition_point(|p| *p <= x).saturating_sub(1).min(last);
        let width = points[left + 1] - points[left];
        (left, (x - points[left]) / width)
    }
}

impl Basis for LinearSplineBasis {
    fn len(&self) -> usize {
        self.breakpoints.len()
    }

    fn nodes(&self) -> &[f64] {
        &self.breakpoints
    }

    fn evaluate_into(&self, x: f64, row: &mut [f64]) {
        row.fill(0.0);
        if self.breakpoints.len() == 1 {
            row[0] = 1.0;
            return;
        }
        let (left, weight) = self.segment(x);
        row[left] = 1.0 - weight;
        row[left + 1] = weight;
    }

    fn interpolate(&self, x: f64, coefficients: &[f64]) -> f64 {
        if self.breakpoints.len() == 1 {
            return coefficients[0];
        }
        let (left, weight) = self.segment(x);
        (1.0 - weight) * coefficients[left] + weight * coefficients[left + 1]
    }
}

const CUBIC_DEGREE: usize = 3;

/// Clamped cubic B-splines on evenly spaced breakpoints, collocated at the Greville
/// abscissae (which keeps the collocation matrix invertible and banded).
#[derive(Clone, Debug)]
pub struct CubicSplineBasis {
    knots: Vec<f64>,
    nodes: Vec<f64>,
}

impl CubicSplineBasis {
    /// `n` cubic B-splines on `[lower, upper]`; requires `n >= 4`.
    pub fn new(n: usize, lower: f64, upper: f64) -> Result<Self> {
        if n < CUBIC_DEGREE + 1 {
            return Err(SovereignError::dimension_mismatch(
                "cubic spline functions",
                CUBIC_DEGREE + 1,
                n,
            ));
        }
        if !(lower < upper) {
            return Err(SovereignError::invalid_parameter(
                "spline lower bound",
                lower,
                "must be strictly below the upper bound",
            ));
        }
        let breakpoints = linspace(lower, upper, n - CUBIC_DEGREE + 1);
        let mut knots = Vec::with_capacity(n + CUBIC_DEGREE + 1);
        knots.extend(std::iter::repeat(lower).take(CUBIC_DEGREE));
        knots.extend(breakpoints.iter().copied());
        knots.extend(std::iter::repeat(upper).take(CUBIC_DEGREE));

        let nodes = (0..n)
            .map(|i| knots[i + 1..=i + CUBIC_DEGREE].iter().sum::<f64>() / CUBIC_DEGREE as f64)
            .collect();
        Ok(Self { knots, nodes })
    }

    fn span(&self, x: f64) -> usize {
        let n = self.nodes.len();
        self.knots
            .partition_point(|k| *k <= x)
            .saturating_sub(1)
            .clamp(CUBIC_DEGREE, n - 1)
    }

    /// The four non-zero basis values at `x` and the index of the last one.
    fn local_values(&self, x: f64) -> (usize, [f64; CUBIC_DEGREE + 1]) {
        let span = self.span(x);
        let t = &self.knots;
        let mut values = [0.0; CUBIC_DEGREE + 1];
        let mut left = [0.0; CUBIC_DEGREE + 1];
        let mut right = [0.0; CUBIC_DEGREE + 1];
        values[0] = 1.0;
        for j in 1..=CUBIC_DEGREE {
            left[j] = x - t[span + 1 - j];
            right[j] = t[span + j] - x;
            let mut saved = 0.0;
            for r in 0..j {
                let temp = values[r] / (right[r + 1] + left[j - r]);
                values[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            values[j] = saved;
        }
        (span, values)
    }
}

impl Basis for CubicSplineBasis {
    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    fn evaluate_into(&self, x: f64, row: &mut [f64]) {
        row.fill(0.0);
        let (span, values) = self.local_values(x);
        for (offset, value) in values.iter().enumerate() {
            row[span - CUBIC_DEGREE + offset] = *value;
        }
    }

    fn interpolate(&self, x: f64, coefficients: &[f64]) -> f64 {
        let (span, values) = self.local_values(x);
        values
            .iter()
            .enumerate()
            .map(|(offset, value)| value * coefficients[span - CUBIC_DEGREE + offset])
            .sum()
    }
}

/// Chebyshev polynomials of the first kind mapped to `[lower, upper]`.
#[derive(Clone, Debug)]
pub struct ChebyshevBasis {
    lower: f64,
    upper: f64,
    nodes: Vec<f64>,
}

impl ChebyshevBasis {
    /// `n` polynomials of degree `0..n`, collocated at the zeros of `T_n`.
    pub fn new(n: usize, lower: f64, upper: f64) -> Result<Self> {
        if n == 0 {
            return Err(SovereignError::dimension_mismatch("chebyshev degree", 1, 0));
        }
        if !(lower < upper) {
            return Err(SovereignError::invalid_parameter(
                "chebyshev lower bound",
                lower,
                "must be strictly below the upper bound",
            ));
        }
        let mid = 0.5 * (lower + upper);
        let half = 0.5 * (upper - lower);
        let nodes = (0..n)
            .map(|k| {
                let z = -((2 * k + 1) as f64 * std::f64::consts::PI / (2 * n) as f64).cos();
                mid + half * z
            })
            .collect();
        Ok(Self {
            lower,
            upper,
            nodes,
        })
    }

    fn to_unit(&self, x: f64) -> f64 {
        (2.0 * x - self.lower - self.upper) / (self.upper - self.lower)
    }
}

impl Basis for ChebyshevBasis {
    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    fn evaluate_into(&self, x: f64, row: &mut [f64]) {
        let z = self.to_unit(x);
        row[0] = 1.0;
        if row.len() > 1 {
            row[1] = z;
        }
        for k in 2..row.len() {
            row[k] = 2.0 * z * row[k - 1] - row[k - 2];
        }
    }

    fn interpolate(&self, x: f64, coefficients: &[f64]) -> f64 {
        // Clenshaw recurrence.
        let z = self.to_unit(x);
        let mut b1 = 0.0;
        let mut b2 = 0.0;
        for c in coefficients.iter().skip(1).rev() {
            let b0 = 2.0 * z * b1 - b2 + c;
            b2 = b1;
            b1 = b0;
        }
        coefficients[0] + z * b1 - b2
    }
}

/// Row-wise tensor product of a debt-basis matrix and an income-basis matrix.
///
/// Row `r` of the result is the flattened outer product of row `r` of each input, with
/// column `j_y * n_b + j_b` holding `income[(r, j_y)] * debt[(r, j_b)]`. Debt therefore
/// varies fastest, matching the ordering of the collocation node table.
pub fn combine(debt_rows: &DMatrix<f64>, income_rows: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if debt_rows.nrows() != income_rows.nrows() {
        return Err(SovereignError::dimension_mismatch(
            "combined basis rows",
            debt_rows.nrows(),
            income_rows.nrows(),
        ));
    }
    let nb = debt_rows.ncols();
    let ny = income_rows.ncols();
    let mut combined = DMatrix::zeros(debt_rows.nrows(), nb * ny);
    for r in 0..debt_rows.nrows() {
        for jy in 0..ny {
            let weight = income_rows[(r, jy)];
            if weight == 0.0 {
                continue;
            }
            for jb in 0..nb {
                combined[(r, jy * nb + jb)] = weight * debt_rows[(r, jb)];
            }
        }
    }
    Ok(combined)
}

/// A square basis matrix together with its LU factorization, reused across sweeps.
#[derive(Clone, Debug)]
pub struct CollocationSystem {
    matrix: DMatrix<f64>,
    lu: LU<f64, Dyn, Dyn>,
}

impl CollocationSystem {
    /// Factorizes `matrix`, failing with [`SovereignError::SingularMatrix`] if it is not invertible.
    pub fn new(matrix: DMatrix<f64>, context: &'static str) -> Result<Self> {
        if matrix.nrows() != matrix.ncols() {
            return Err(SovereignError::dimension_mismatch(
                context,
                matrix.nrows(),
                matrix.ncols(),
            ));
        }
        let lu = matrix.clone().lu();
        if !lu.is_invertible() {
            return Err(SovereignError::singular(context));
        }
        Ok(Self { matrix, lu })
    }

    /// The basis matrix evaluated at the collocation nodes.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Number of collocation nodes.
    pub fn size(&self) -> usize {
        self.matrix.nrows()
    }

    /// Values of the represented function at the nodes, `Phi * coefficients`.
    pub fn apply(&self, coefficients: &DVector<f64>) -> DVector<f64> {
        &self.matrix * coefficients
    }

    /// Solves `Phi * coefficients = values` exactly.
    pub fn solve(&self, values: &DVector<f64>) -> Result<DVector<f64>> {
        if values.len() != self.size() {
            return Err(SovereignError::dimension_mismatch(
                "collocation values",
                self.size(),
                values.len(),
            ));
        }
        self.lu
            .solve(values)
            .ok_or_else(|| SovereignError::singular("collocation solve"))
    }
}

/// One-off solve of `phi * coefficients = values`.
pub fn solve_coefficients(phi: &DMatrix<f64>, values: &DVector<f64>) -> Result<DVector<f64>> {
    CollocationSystem::new(phi.clone(), "basis matrix")?.solve(values)
}

/// `n` evenly spaced points from `lower` to `upper` inclusive.
pub fn linspace(lower: f64, upper: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lower],
        _ => {
            let step = (upper - lower) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { upper } else { lower + step * i as f64 })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_round_trip(basis: &dyn Basis) {
        let system = CollocationSystem::new(basis.node_matrix(), "test basis").unwrap();
        let values = DVector::from_iterator(
            basis.len(),
            basis.nodes().iter().map(|x| (3.0 * x).sin() + x * x),
        );
        let coefficients = system.solve(&values).unwrap();
        assert_relative_eq!(system.apply(&coefficients), values, epsilon = 1e-10);
        for (i, x) in basis.nodes().iter().enumerate() {
            assert_relative_eq!(
                basis.interpolate(*x, coefficients.as_slice()),
                values[i],
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn linear_spline_is_identity_at_nodes() {
        let basis = LinearSplineBasis::uniform(5, -0.4, 0.4).unwrap();
        assert_relative_eq!(basis.node_matrix(), DMatrix::identity(5, 5));
        let coefficients = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(basis.interpolate(-0.35, &coefficients), 0.25, epsilon = 1e-12);
        // Linear extrapolation beyond the last breakpoint.
        assert_relative_eq!(basis.interpolate(0.6, &coefficients), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn bases_reproduce_values_at_nodes() {
        assert_round_trip(&LinearSplineBasis::uniform(9, -1.0, 1.0).unwrap());
        assert_round_trip(&CubicSplineBasis::new(9, -1.0, 1.0).unwrap());
        assert_round_trip(&ChebyshevBasis::new(9, -1.0, 1.0).unwrap());
    }

    #[test]
    fn cubic_spline_is_partition_of_unity() {
        let basis = CubicSplineBasis::new(8, -0.4, 0.4).unwrap();
        assert_relative_eq!(basis.nodes()[0], -0.4);
        assert_relative_eq!(basis.nodes()[7], 0.4);
        let mut row = vec![0.0; 8];
        for x in linspace(-0.4, 0.4, 23) {
            basis.evaluate_into(x, &mut row);
            assert_relative_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            assert!(row.iter().all(|v| *v >= -1e-14));
        }
    }

    #[test]
    fn interpolate_agrees_with_evaluated_rows() {
        let basis = ChebyshevBasis::new(6, 0.0, 2.0).unwrap();
        let coefficients = [0.3, -1.0, 0.5, 0.25, -0.1, 0.05];
        let mut row = vec![0.0; 6];
        for x in [0.0, 0.37, 1.2, 2.0] {
            basis.evaluate_into(x, &mut row);
            let dense: f64 = row.iter().zip(coefficients.iter()).map(|(a, b)| a * b).sum();
            assert_relative_eq!(basis.interpolate(x, &coefficients), dense, epsilon = 1e-12);
        }
    }

    #[test]
    fn combine_matches_kronecker_product_at_nodes() {
        let debt = CubicSplineBasis::new(5, -0.1, 0.1).unwrap().node_matrix();
        let income = ChebyshevBasis::new(3, 0.9, 1.1).unwrap().node_matrix();
        let mut debt_rows = DMatrix::zeros(15, 5);
        let mut income_rows = DMatrix::zeros(15, 3);
        for iy in 0..3 {
            for ib in 0..5 {
                debt_rows.set_row(iy * 5 + ib, &debt.row(ib));
                income_rows.set_row(iy * 5 + ib, &income.row(iy));
            }
        }
        let combined = combine(&debt_rows, &income_rows).unwrap();
        assert_relative_eq!(combined, income.kronecker(&debt), epsilon = 1e-14);
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let phi = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let values = DVector::from_vec(vec![1.0, 1.0]);
        assert!(matches!(
            solve_coefficients(&phi, &values),
            Err(SovereignError::SingularMatrix { .. })
        ));
    }
}
