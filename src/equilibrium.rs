//! Element-potential chemical equilibrium solver.
//!
//! The solver minimizes the Gibbs energy functional `Σ nᵢ·μᵢ` subject to
//! exact conservation of every chemical element. Each iteration linearizes
//! the stationarity conditions around the current composition, solves the
//! resulting `(NELE + 1) × (NELE + 1)` augmented system for the element
//! potentials, and applies a damped composition update that keeps all mole
//! numbers non-negative and the Gibbs energy non-increasing.

use crate::errors::{ChemEqError, ChemEqResult};
use crate::linalg::{self, LinAlgError};
use ndarray::{s, Array1, Array2};

const MAX_ITER_CHEM_EQ: usize = 50;
const TOL_CHEM_EQ: f64 = 5e-5;

/// Level of detail in the iteration output.
#[derive(Copy, Clone, PartialOrd, PartialEq, Eq, Debug, Default)]
pub enum Verbosity {
    /// Do not print output.
    #[default]
    None,
    /// Print information about the success or failure of the iteration.
    Result,
    /// Print a detailed output for every iteration.
    Iter,
}

/// Options for the equilibrium solvers.
///
/// If the values are [None], solver specific default values are used.
#[derive(Copy, Clone, Default)]
pub struct SolverOptions {
    /// Maximum number of iterations.
    pub max_iter: Option<usize>,
    /// Tolerance.
    pub tol: Option<f64>,
    /// Iteration output indicated by the [Verbosity] enum.
    pub verbosity: Verbosity,
}

impl SolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = Some(max_iter);
        self
    }

    pub fn tol(mut self, tol: f64) -> Self {
        self.tol = Some(tol);
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn unwrap_or(self, max_iter: usize, tol: f64) -> (usize, f64, Verbosity) {
        (
            self.max_iter.unwrap_or(max_iter),
            self.tol.unwrap_or(tol),
            self.verbosity,
        )
    }
}

/// Policy knobs of the damped Newton iteration.
///
/// These are tunable numerical safeguards, not physics.
#[derive(Copy, Clone)]
pub struct EquilibriumOptions {
    /// Fraction backed off the exact zero-crossing when a full step would
    /// make a mole number negative.
    pub step_safety: f64,
    /// Per-species relative update below which no step is applied.
    pub species_tol: f64,
    /// Floor used for mole numbers inside logarithms and for newly
    /// introduced trace species.
    pub trace_moles: f64,
}

impl Default for EquilibriumOptions {
    fn default() -> Self {
        Self {
            step_safety: 0.01,
            species_tol: 1e-5,
            trace_moles: 1e-40,
        }
    }
}

/// A converged chemical equilibrium.
#[derive(Clone, Debug)]
pub struct Equilibrium {
    /// Mole numbers of the reacting species at equilibrium.
    pub moles: Array1<f64>,
    /// Reduced Gibbs energy `Σ nᵢ·μᵢ/RT` at the solution.
    pub gibbs_energy: f64,
    /// Number of Newton iterations used.
    pub iterations: usize,
}

/// Damped Newton solver for a single element-balance constrained
/// equilibrium problem.
///
/// The species and element counts are fixed at construction; when the
/// reacting set changes, build a fresh solver instead of resizing this one.
pub struct ChemicalEquilibrium {
    /// Stoichiometric matrix, elements × species.
    a_matrix: Array2<f64>,
    /// Element totals the solution must satisfy.
    b_element: Array1<f64>,
    /// Reference chemical potentials μ°/RT + ln(P).
    chem_ref: Array1<f64>,
    n_mol: Array1<f64>,
    chem_pot: Array1<f64>,
    d_n: Array1<f64>,
    options: EquilibriumOptions,
}

impl ChemicalEquilibrium {
    pub fn new(
        a_matrix: Array2<f64>,
        b_element: Array1<f64>,
        chem_ref: Array1<f64>,
        n_mol: Array1<f64>,
        options: EquilibriumOptions,
    ) -> ChemEqResult<Self> {
        let (nele, nspec) = a_matrix.dim();
        if n_mol.len() != nspec || chem_ref.len() != nspec {
            return Err(ChemEqError::IncompatibleComponents(nspec, n_mol.len()));
        }
        if b_element.len() != nele {
            return Err(ChemEqError::Error(format!(
                "the element totals have {} entries while the stoichiometric matrix has {} rows",
                b_element.len(),
                nele
            )));
        }
        if let Some(&n) = n_mol.iter().find(|&&n| n < 0.0) {
            return Err(ChemEqError::InvalidState(
                String::from("chemical equilibrium"),
                String::from("n_mol"),
                n,
            ));
        }
        let chem_pot = Array1::zeros(nspec);
        let d_n = Array1::zeros(nspec);
        Ok(Self {
            a_matrix,
            b_element,
            chem_ref,
            n_mol,
            chem_pot,
            d_n,
            options,
        })
    }

    pub fn moles(&self) -> &Array1<f64> {
        &self.n_mol
    }

    pub fn update(&self) -> &Array1<f64> {
        &self.d_n
    }

    /// Reduced Gibbs energy `Σ nᵢ·μᵢ/RT` at the current composition.
    pub fn gibbs_energy(&self) -> f64 {
        let trace = self.options.trace_moles;
        let n_t = self.n_mol.sum().max(trace);
        self.n_mol
            .iter()
            .zip(self.chem_ref.iter())
            .map(|(&n, &mu_ref)| n * (mu_ref + (n.max(trace) / n_t).ln()))
            .sum()
    }

    /// One Newton linearization: refresh the chemical potentials, assemble
    /// and solve the augmented element-potential system and recover the
    /// composition update `Δn`.
    ///
    /// A singular augmented matrix (degenerate stoichiometry, e.g. linearly
    /// dependent element rows) fails with
    /// [`LinAlgError::SingularMatrix`] instead of propagating NaN into the
    /// mole numbers.
    pub fn chem_solve(&mut self) -> ChemEqResult<()> {
        let (nele, nspec) = self.a_matrix.dim();
        let trace = self.options.trace_moles;
        let n_t = self.n_mol.sum().max(trace);
        for i in 0..nspec {
            self.chem_pot[i] = self.chem_ref[i] + (self.n_mol[i].max(trace) / n_t).ln();
        }

        let a = &self.a_matrix;
        let b_cal = a.dot(&self.n_mol);

        // weighted Gram matrix of the stoichiometric rows, bordered by the
        // mass-conservation row/column
        let mut a_solve = Array2::zeros((nele + 1, nele + 1));
        for i in 0..nele {
            for j in 0..=i {
                let mut gram = 0.0;
                for k in 0..nspec {
                    gram += a[(i, k)] * a[(j, k)] * self.n_mol[k];
                }
                a_solve[(i, j)] = gram;
                a_solve[(j, i)] = gram;
            }
            a_solve[(i, nele)] = b_cal[i];
            a_solve[(nele, i)] = b_cal[i];
        }

        let mut b_solve = Array1::zeros(nele + 1);
        for j in 0..nele {
            let mut second_term = 0.0;
            for k in 0..nspec {
                second_term += a[(j, k)] * self.n_mol[k] * self.chem_pot[k];
            }
            b_solve[j] = second_term + (self.b_element[j] - b_cal[j]);
        }
        b_solve[nele] = self.n_mol.dot(&self.chem_pot);

        // cheap pre-screen for exactly singular systems; the pivoting
        // inversion below remains the authoritative singularity test
        if linalg::determinant(a_solve.view())? == 0.0 {
            return Err(LinAlgError::SingularMatrix.into());
        }
        let x = linalg::solve(a_solve.view(), b_solve.view())?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ChemEqError::IterationFailed(String::from("chem_solve")));
        }

        let phi = x.slice(s![..nele]);
        let u = x[nele];
        for j in 0..nspec {
            let mut a_t_phi = 0.0;
            for k in 0..nele {
                a_t_phi += a[(k, j)] * phi[k];
            }
            self.d_n[j] = self.n_mol[j] * (a_t_phi + u - self.chem_pot[j]);
        }
        Ok(())
    }

    /// Damped step length for the current update `Δn`.
    ///
    /// If the full step would drive a mole number negative, the step is the
    /// most restrictive admissible fraction over all violating species. If
    /// the directional Gibbs derivative at the proposed point is positive, a
    /// secant interpolation `G₀/(G₀ − G₁)` locates the zero crossing of the
    /// derivative; the result still passes through the negativity screen.
    pub fn step(&self) -> f64 {
        let trace = self.options.trace_moles;
        let n_omega = &self.n_mol + &self.d_n;
        if n_omega.iter().any(|&n| n < 0.0) {
            return self.inner_step(&n_omega, 1.0);
        }

        let n_t = self.n_mol.sum().max(trace);
        let mut g_1 = 0.0;
        for i in 0..n_omega.len() {
            let pot_omega = self.chem_ref[i] + (n_omega[i].max(trace) / n_t).ln();
            g_1 += pot_omega * self.d_n[i];
        }

        let mut step = 1.0;
        if g_1 > 0.0 {
            let g_0 = self.chem_pot.dot(&self.d_n);
            let denominator = g_0 - g_1;
            if denominator.abs() > 1e-30 {
                step = g_0 / denominator;
            }
        }
        self.inner_step(&n_omega, step)
    }

    fn inner_step(&self, n_omega: &Array1<f64>, step: f64) -> f64 {
        let mut damped = step;
        for i in 0..n_omega.len() {
            if n_omega[i] < 0.0 {
                let cap = -self.n_mol[i] / self.d_n[i] * (1.0 - self.options.step_safety);
                if cap < damped {
                    damped = cap;
                }
            }
        }
        damped.min(1.0)
    }

    /// Iterate to convergence.
    ///
    /// The iteration count is bounded: converge or fail with
    /// [`ChemEqError::NotConverged`] after `max_iter` iterations.
    pub fn solve(&mut self, options: SolverOptions) -> ChemEqResult<Equilibrium> {
        let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_CHEM_EQ, TOL_CHEM_EQ);
        let trace = self.options.trace_moles;

        log_iter!(verbosity, " iter |    error     |   step   | Gibbs energy");
        log_iter!(verbosity, "{:-<48}", "");

        for iteration in 1..=max_iter {
            self.chem_solve()?;

            let mut error = 0.0;
            let mut limited = false;
            for i in 0..self.n_mol.len() {
                let rel = self.d_n[i] / self.n_mol[i].max(trace);
                error += rel.abs();
                if rel.abs() > self.options.species_tol {
                    limited = true;
                }
            }

            let mut step = 1.0;
            if limited {
                step = self.step();
                for i in 0..self.n_mol.len() {
                    self.n_mol[i] += step * self.d_n[i];
                }
                // damping guarantees non-negative moles; a violation here is
                // a genuine bug, not something to mask with an absolute value
                if let Some(&n) = self.n_mol.iter().find(|&&n| n < 0.0) {
                    return Err(ChemEqError::InvalidState(
                        String::from("chemical equilibrium"),
                        String::from("n_mol"),
                        n,
                    ));
                }
            }

            let gibbs = self.gibbs_energy();
            log_iter!(
                verbosity,
                " {:4} | {:12.6e} | {:8.6} | {:13.8}",
                iteration,
                error,
                step,
                gibbs
            );

            if error <= tol && !limited {
                log_result!(
                    verbosity,
                    "Chemical equilibrium: calculation converged in {} step(s)\n",
                    iteration
                );
                return Ok(Equilibrium {
                    moles: self.n_mol.clone(),
                    gibbs_energy: gibbs,
                    iterations: iteration,
                });
            }
        }
        Err(ChemEqError::NotConverged(String::from(
            "chemical equilibrium",
        )))
    }
}
