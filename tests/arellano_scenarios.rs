use approx::assert_relative_eq;
use arellano_collocation::markov::MarkovChain;
use arellano_collocation::{
    BasisKind, Economy, EconomyParameters, IncomeDiscretization, Solution, SolveStatus,
    SolverOptions,
};
use nalgebra::{DMatrix, DVector};

/// Long-run default frequency along a simulated path from the median income state.
fn long_run_default_frequency(economy: &Economy) -> f64 {
    let start = economy.chain().len() / 2;
    economy
        .simulate(100_000, start, 0.0, 2008)
        .unwrap()
        .default_frequency()
}

fn assert_price_bounds(economy: &Economy) {
    let ceiling = economy.params().risk_free_price();
    let solution = economy.solution();
    assert!(solution
        .default_probability
        .iter()
        .all(|p| (0.0..=1.0).contains(p)));
    assert!(solution.prices.iter().all(|q| *q >= 0.0 && *q <= ceiling));
}

#[test]
fn transition_rows_sum_to_one() {
    let economy = Economy::new(EconomyParameters::default()).unwrap();
    for row in economy.chain().transition().row_iter() {
        let sum: f64 = row.iter().sum();
        assert!((sum - 1.0).abs() <= 1e-12);
        assert!(row.iter().all(|p| *p >= 0.0));
    }
}

#[test]
fn collocation_reproduces_arbitrary_node_values() {
    let economy = Economy::new(EconomyParameters::default()).unwrap();
    let n = economy.nodes().len();
    let values = DVector::from_fn(n, |i, _| (i as f64 * 0.37).cos() - 2.0);
    let omega = economy.phi().solve(&values).unwrap();
    assert_relative_eq!(economy.phi().apply(&omega), values, epsilon = 1e-10);
}

/// A handful of sweeps from the cold start must stop at the cap with finite residuals.
#[test]
fn low_iteration_cap_reports_non_convergence() {
    let params = EconomyParameters::default().with_max_iterations(5);
    let mut economy = Economy::new(params).unwrap();
    let report = economy.solve().unwrap();

    assert!(!report.converged());
    assert_eq!(report.status, SolveStatus::IterationLimit);
    assert_eq!(report.iterations, 5);
    assert!(report.residuals.repayment.is_finite());
    assert!(report.residuals.default.is_finite());
    assert!(report.residuals.expectation.is_finite());
    assert!(!report.distance().is_nan());
}

/// With a single income state the sovereign never gains by defaulting on small debt,
/// so bonds trade at the risk-free price.
#[test]
fn deterministic_income_prices_bonds_at_risk_free_rate() {
    let params = EconomyParameters::default()
        .with_gamma(2.0)
        .with_grid_sizes(1, 5)
        .with_debt_bounds(-0.1, 0.1);
    let chain = MarkovChain::new(DVector::from_element(1, 1.0), DMatrix::identity(1, 1)).unwrap();
    let mut economy =
        Economy::with_income_process(params, SolverOptions::default(), chain).unwrap();
    let report = economy.solve().unwrap();

    assert!(report.converged(), "{report:?}");
    let risk_free = 1.0 / 1.017;
    for q in economy.solution().prices.iter() {
        assert_relative_eq!(*q, risk_free, epsilon = 1e-15);
    }
    assert!(economy
        .solution()
        .default_probability
        .iter()
        .all(|p| *p == 0.0));
    // Impatience (beta (1 + r) < 1) pushes the indebted sovereign to the borrowing limit.
    assert_relative_eq!(economy.solution().debt_policy[0], -0.1, epsilon = 1e-12);
}

#[test]
fn prices_stay_in_bounds_every_sweep() {
    let params = EconomyParameters::default().with_grid_sizes(7, 11);
    let mut economy = Economy::new(params).unwrap();
    for iteration in 1..=40 {
        economy.sweep(iteration).unwrap();
        assert_price_bounds(&economy);
    }
}

#[test]
fn price_is_non_decreasing_in_assets() {
    let mut economy = Economy::new(EconomyParameters::default()).unwrap();
    let report = economy.solve().unwrap();
    assert!(report.converged(), "{report:?}");

    assert_price_bounds(&economy);
    let prices = &economy.solution().prices;
    for iy in 0..prices.nrows() {
        for ib in 1..prices.ncols() {
            assert!(
                prices[(iy, ib)] >= prices[(iy, ib - 1)] - 1e-12,
                "price falls with assets at income state {iy}, node {ib}"
            );
        }
    }
    // Some default risk exists at the highest debt level.
    assert!(prices.column(0).iter().any(|q| *q < 1.0 / 1.017));
}

#[test]
fn price_update_is_idempotent() {
    let params = EconomyParameters::default()
        .with_grid_sizes(5, 9)
        .with_max_iterations(30);
    let mut economy = Economy::new(params).unwrap();
    economy.solve().unwrap();

    let first = economy.price_update().unwrap();
    let second = economy.price_update().unwrap();
    assert_eq!(first, second);
    economy.refresh_prices().unwrap();
    assert_eq!(economy.solution().prices, first.prices);
}

#[test]
fn lower_income_volatility_reduces_default_risk() {
    let baseline_params = EconomyParameters::default();
    let calm_params = baseline_params.clone().with_income_process(0.945, 0.0125);

    let mut baseline = Economy::new(baseline_params).unwrap();
    let baseline_report = baseline.solve().unwrap();
    assert!(baseline_report.converged(), "{baseline_report:?}");
    let mut calm = Economy::new(calm_params).unwrap();
    let calm_report = calm.solve().unwrap();
    assert!(calm_report.converged(), "{calm_report:?}");

    let baseline_risk = long_run_default_frequency(&baseline);
    let calm_risk = long_run_default_frequency(&calm);
    assert!(baseline_risk > 0.0);
    assert!(
        calm_risk < baseline_risk,
        "calm {calm_risk} vs baseline {baseline_risk}"
    );
}

#[test]
fn alternative_bases_and_discretizations_run() {
    for (kind, discretization) in [
        (BasisKind::CubicSpline, IncomeDiscretization::Rouwenhorst),
        (BasisKind::Chebyshev, IncomeDiscretization::Tauchen { width: 2.5 }),
    ] {
        let params = EconomyParameters::default()
            .with_grid_sizes(5, 8)
            .with_max_iterations(10);
        let options = SolverOptions::default()
            .with_debt_basis(kind)
            .with_income_discretization(discretization);
        let mut economy = Economy::with_options(params, options).unwrap();
        let report = economy.solve().unwrap();
        assert!(report.iterations <= 10);
        assert_price_bounds(&economy);
    }
}

#[test]
fn solution_and_report_serialize() {
    let params = EconomyParameters::default()
        .with_grid_sizes(3, 5)
        .with_max_iterations(4);
    let mut economy = Economy::new(params).unwrap();
    let report = economy.solve().unwrap();

    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("IterationLimit"));

    let snapshot = serde_json::to_string(economy.solution()).unwrap();
    let restored: Solution = serde_json::from_str(&snapshot).unwrap();
    assert_relative_eq!(restored.omega_c, economy.solution().omega_c, epsilon = 1e-12);
    assert_relative_eq!(restored.prices, economy.solution().prices, epsilon = 1e-12);
}
