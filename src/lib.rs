//! Collocation solver for the Arellano (2008) sovereign default model.
//!
//! Value functions are represented as weighted sums of basis functions over a
//! continuous asset grid and a discrete income grid, and the equilibrium is the
//! fixed point of three coefficient vectors together with the bond-price schedule:
//!
//! - `omega_c`, the repayment value `V_c(b, y) = Phi(b, y) omega_c`,
//! - `omega_d`, the default value `V_d(y) = Phi_d(y) omega_d`,
//! - `omega_e`, the expected continuation value `E[max(V_c, V_d) | y](b')`.
//!
//! The crate provides tools to
//!
//! - discretize the income process (`markov` module),
//! - build one-dimensional bases and collocation systems (`basis` module),
//! - set up the economy and its collocation grid (`economy` module),
//! - iterate to the fixed point (`solving` module), and
//! - inspect the solution on finer grids or by simulation (`evaluation`, `simulation`).
//!
//! Assets `b` are signed: negative values are debt.
//!
//! # Quick start
//!
//! ```no_run
//! use arellano_collocation::{Economy, EconomyParameters};
//!
//! let params = EconomyParameters::default();
//! let mut economy = Economy::new(params).expect("valid calibration");
//! let report = economy.solve().expect("well-formed bases");
//! if !report.converged() {
//!     eprintln!("stopped with distance {}", report.distance());
//! }
//!
//! let grid: Vec<f64> = (0..101).map(|i| -0.4 + 0.008 * i as f64).collect();
//! let surfaces = economy.evaluate_on(&grid).expect("non-empty grid");
//! println!("price at the lowest income: {:?}", surfaces.prices.row(0));
//! ```

pub mod basis;
pub mod budget;
pub mod economy;
pub mod error;
pub mod evaluation;
pub mod markov;
pub mod optimize;
pub mod options;
pub mod pricing;
pub mod simulation;
pub mod solving;

pub use economy::{Economy, Solution};
pub use error::{Result, SovereignError};
pub use options::{BasisKind, EconomyParameters, IncomeDiscretization, SolverOptions};
pub use solving::{ConvergenceReport, Residuals, SolveStatus};
