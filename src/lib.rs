#![warn(clippy::all)]
#![allow(clippy::many_single_char_names)]
//! Chemical reaction equilibrium for multicomponent mixtures.
//!
//! The crate solves element-balance constrained chemical equilibria with the
//! element-potential (Lagrange multiplier) method: a damped Newton iteration
//! on the mole numbers of the reacting species, subject to exact conservation
//! of every chemical element. The thermodynamic property package is an
//! external collaborator that supplies reference chemical potentials through
//! the [ReferenceState] trait; this crate owns the solver, the
//! reaction/element bookkeeping, and the small dense linear algebra used to
//! solve the augmented systems arising in every iteration.

/// Print messages with level `Verbosity::Iter` or higher.
#[macro_export]
macro_rules! log_iter {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= Verbosity::Iter {
            println!($($arg)*);
        }
    }
}

/// Print messages with level `Verbosity::Result` or higher.
#[macro_export]
macro_rules! log_result {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= Verbosity::Result {
            println!($($arg)*);
        }
    }
}

mod chemistry;
mod equilibrium;
mod errors;
pub mod linalg;
mod reactions;

pub use chemistry::{IdealReferenceState, ReactivePhase, ReferenceState, SpeciesRecord};
pub use equilibrium::{
    ChemicalEquilibrium, Equilibrium, EquilibriumOptions, SolverOptions, Verbosity,
};
pub use errors::{ChemEqError, ChemEqResult};
pub use reactions::{Reaction, ReactionBookkeeping, ReactionSet};
