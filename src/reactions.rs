//! Reaction and element bookkeeping: builds the stoichiometric matrix and
//! element totals consumed by the equilibrium solver and drives the outer
//! convergence loop.

use crate::chemistry::{ReactivePhase, ReferenceState, SpeciesRecord};
use crate::equilibrium::{ChemicalEquilibrium, EquilibriumOptions, SolverOptions, Verbosity};
use crate::errors::{ChemEqError, ChemEqResult};
use indexmap::{IndexMap, IndexSet};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

const MAX_ITER_OUTER: usize = 30;
const TOL_OUTER: f64 = 1e-6;

/// A chemical reaction given by its stoichiometric coefficients
/// (products positive, reactants negative).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reaction {
    pub name: String,
    pub stoichiometry: IndexMap<String, f64>,
}

impl Reaction {
    pub fn new(name: &str, stoichiometry: &[(&str, f64)]) -> Self {
        Self {
            name: name.to_string(),
            stoichiometry: stoichiometry
                .iter()
                .map(|(s, nu)| (s.to_string(), *nu))
                .collect(),
        }
    }
}

/// The set of reactions considered in an equilibrium calculation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReactionSet {
    reactions: Vec<Reaction>,
}

impl ReactionSet {
    pub fn new(reactions: Vec<Reaction>) -> Self {
        Self { reactions }
    }

    /// Read a reaction set from a JSON string.
    pub fn from_json_str(json: &str) -> ChemEqResult<Self> {
        Ok(Self {
            reactions: serde_json::from_str(json)?,
        })
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }

    /// Remove reactions that reference species not present in `known`.
    /// Returns the number of reactions removed.
    pub fn prune_junk(&mut self, known: &IndexSet<String>) -> usize {
        let before = self.reactions.len();
        self.reactions
            .retain(|r| r.stoichiometry.keys().all(|s| known.contains(s)));
        before - self.reactions.len()
    }

    /// Union of the species named by the reactions, in first-seen order.
    pub fn participating_species(&self) -> IndexSet<String> {
        self.reactions
            .iter()
            .flat_map(|r| r.stoichiometry.keys().cloned())
            .collect()
    }
}

/// Glue between the reacting phase and the equilibrium solver.
///
/// Construction prunes reactions that reference unavailable species,
/// introduces reaction products missing from the phase at trace moles and
/// determines the element set of the reacting species. The bookkeeping then
/// produces the stoichiometric matrix, element totals and pressure-corrected
/// reference potentials, and drives the outer convergence loop.
pub struct ReactionBookkeeping {
    reactions: ReactionSet,
    /// Indices into the phase of the species participating in reactions.
    reactive: Vec<usize>,
    elements: IndexSet<String>,
    /// Whether an electroneutrality row is appended to the matrix.
    charged: bool,
    options: EquilibriumOptions,
}

impl ReactionBookkeeping {
    /// Set up the bookkeeping for a phase and a reaction set.
    ///
    /// `catalog` supplies records for species that reactions may introduce
    /// into the phase. Species named by a reaction but known neither to the
    /// phase nor to the catalog disqualify the whole reaction ("junk
    /// reaction" pruning). The add-new-species pass repeats until a pass
    /// introduces no additional species.
    pub fn new(
        phase: &mut ReactivePhase,
        mut reactions: ReactionSet,
        catalog: &[SpeciesRecord],
        options: EquilibriumOptions,
    ) -> ChemEqResult<Self> {
        loop {
            let before = phase.species().len();
            let known: IndexSet<String> = phase
                .species()
                .iter()
                .map(|s| s.name.clone())
                .chain(catalog.iter().map(|r| r.name.clone()))
                .collect();
            reactions.prune_junk(&known);
            for name in reactions.participating_species() {
                if phase.index_of(&name).is_none() {
                    let record = catalog
                        .iter()
                        .find(|r| r.name == name)
                        .ok_or_else(|| ChemEqError::UnknownSpecies(name.clone()))?;
                    phase.add_species(record.clone(), options.trace_moles)?;
                }
            }
            if phase.species().len() == before {
                break;
            }
        }

        let participating = reactions.participating_species();
        let reactive: Vec<usize> = phase
            .species()
            .iter()
            .enumerate()
            .filter(|(_, s)| participating.contains(&s.name))
            .map(|(i, _)| i)
            .collect();
        let elements: IndexSet<String> = reactive
            .iter()
            .flat_map(|&i| phase.species()[i].composition.keys().cloned())
            .collect();
        let charged = reactive.iter().any(|&i| phase.species()[i].charge != 0.0);

        Ok(Self {
            reactions,
            reactive,
            elements,
            charged,
            options,
        })
    }

    pub fn has_reactions(&self) -> bool {
        !self.reactive.is_empty() && !self.reactions.is_empty()
    }

    pub fn reactions(&self) -> &ReactionSet {
        &self.reactions
    }

    /// Phase indices of the reacting species.
    pub fn reactive_species(&self) -> &[usize] {
        &self.reactive
    }

    pub fn elements(&self) -> &IndexSet<String> {
        &self.elements
    }

    /// Stoichiometric matrix of the reacting species, elements × species.
    ///
    /// When any reacting species carries an ionic charge, an
    /// electroneutrality row with the charges is appended so that the net
    /// charge is conserved alongside the elements.
    pub fn a_matrix(&self, phase: &ReactivePhase) -> Array2<f64> {
        let nele = self.elements.len() + usize::from(self.charged);
        let mut a = Array2::zeros((nele, self.reactive.len()));
        for (j, &sj) in self.reactive.iter().enumerate() {
            let species = &phase.species()[sj];
            for (i, element) in self.elements.iter().enumerate() {
                a[(i, j)] = species.element_count(element);
            }
            if self.charged {
                a[(nele - 1, j)] = species.charge;
            }
        }
        a
    }

    /// Current mole numbers of the reacting species.
    pub fn n_vector(&self, phase: &ReactivePhase) -> Array1<f64> {
        self.reactive.iter().map(|&i| phase.moles()[i]).collect()
    }

    /// Element totals `b = A·n` at the current composition.
    pub fn b_vector(&self, phase: &ReactivePhase) -> Array1<f64> {
        self.a_matrix(phase).dot(&self.n_vector(phase))
    }

    /// Reference chemical potentials of the reacting species including the
    /// standard-state pressure correction `+ln(P)`.
    pub fn reference_potentials(
        &self,
        phase: &ReactivePhase,
        provider: &dyn ReferenceState,
    ) -> ChemEqResult<Array1<f64>> {
        if phase.pressure <= 0.0 {
            return Err(ChemEqError::InvalidState(
                String::from("reference potentials"),
                String::from("pressure"),
                phase.pressure,
            ));
        }
        let mu0 = provider.reference_potentials(phase)?;
        if mu0.len() != phase.species().len() {
            return Err(ChemEqError::IncompatibleComponents(
                phase.species().len(),
                mu0.len(),
            ));
        }
        let ln_p = phase.pressure.ln();
        Ok(self.reactive.iter().map(|&i| mu0[i] + ln_p).collect())
    }

    /// Outer convergence loop: solve the equilibrium, write the mole numbers
    /// back into the phase, re-evaluate the reference potentials and repeat
    /// until the composition no longer changes.
    ///
    /// The write-back is all-or-nothing; a failing inner solve leaves the
    /// phase untouched. Returns the reduced Gibbs energy at the solution.
    pub fn solve_equilibrium(
        &self,
        phase: &mut ReactivePhase,
        provider: &dyn ReferenceState,
        options: SolverOptions,
    ) -> ChemEqResult<f64> {
        let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_OUTER, TOL_OUTER);
        if !self.has_reactions() {
            return Err(ChemEqError::Error(String::from(
                "no reacting species in phase",
            )));
        }

        // total atoms do not change during reaction; fixed from the feed
        let a_matrix = self.a_matrix(phase);
        let b_element = self.b_vector(phase);

        for outer in 1..=max_iter {
            let chem_ref = self.reference_potentials(phase, provider)?;
            let n = self.n_vector(phase);
            let mut solver = ChemicalEquilibrium::new(
                a_matrix.clone(),
                b_element.clone(),
                chem_ref,
                n.clone(),
                self.options,
            )?;
            let result = solver.solve(SolverOptions::new().verbosity(verbosity))?;

            for (&i, &ni) in self.reactive.iter().zip(result.moles.iter()) {
                phase.set_moles(i, ni)?;
            }

            let change = result
                .moles
                .iter()
                .zip(n.iter())
                .map(|(&new, &old)| ((new - old) / old.max(self.options.trace_moles)).abs())
                .fold(0.0, f64::max);
            log_iter!(
                verbosity,
                "outer iteration {}: composition change {:e}",
                outer,
                change
            );
            if change < tol {
                log_result!(
                    verbosity,
                    "Chemical equilibrium: outer loop converged in {} pass(es)\n",
                    outer
                );
                return Ok(result.gibbs_energy);
            }
        }
        Err(ChemEqError::NotConverged(String::from(
            "chemical equilibrium outer loop",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    fn water_system() -> (ReactivePhase, Vec<SpeciesRecord>) {
        let phase = ReactivePhase::new(
            vec![
                SpeciesRecord::new("water", &[("H", 2.0), ("O", 1.0)], -10.0),
                SpeciesRecord::new("CO2", &[("C", 1.0), ("O", 2.0)], -20.0),
            ],
            arr1(&[10.0, 1.0]),
            1.0,
            1.0,
        )
        .unwrap();
        let catalog = vec![
            SpeciesRecord::new("H3O+", &[("H", 3.0), ("O", 1.0)], -5.0).with_charge(1.0),
            SpeciesRecord::new("HCO3-", &[("H", 1.0), ("C", 1.0), ("O", 3.0)], -25.0)
                .with_charge(-1.0),
        ];
        (phase, catalog)
    }

    #[test]
    fn junk_reactions_are_pruned() -> ChemEqResult<()> {
        let (mut phase, catalog) = water_system();
        let reactions = ReactionSet::new(vec![
            Reaction::new(
                "carbonic acid",
                &[
                    ("CO2", -1.0),
                    ("water", -2.0),
                    ("H3O+", 1.0),
                    ("HCO3-", 1.0),
                ],
            ),
            // references a species no record exists for
            Reaction::new("junk", &[("water", -1.0), ("unobtainium", 1.0)]),
        ]);
        let bookkeeping =
            ReactionBookkeeping::new(&mut phase, reactions, &catalog, Default::default())?;
        assert_eq!(bookkeeping.reactions().len(), 1);
        assert!(bookkeeping.has_reactions());
        Ok(())
    }

    #[test]
    fn missing_species_added_at_trace_moles() -> ChemEqResult<()> {
        let (mut phase, catalog) = water_system();
        let reactions = ReactionSet::new(vec![Reaction::new(
            "carbonic acid",
            &[
                ("CO2", -1.0),
                ("water", -2.0),
                ("H3O+", 1.0),
                ("HCO3-", 1.0),
            ],
        )]);
        ReactionBookkeeping::new(&mut phase, reactions, &catalog, Default::default())?;
        let i = phase.index_of("H3O+").expect("H3O+ not added");
        assert_eq!(phase.moles()[i], 1e-40);
        assert!(phase.index_of("HCO3-").is_some());
        Ok(())
    }

    #[test]
    fn element_totals_and_charge_row() -> ChemEqResult<()> {
        let (mut phase, catalog) = water_system();
        let reactions = ReactionSet::new(vec![Reaction::new(
            "carbonic acid",
            &[
                ("CO2", -1.0),
                ("water", -2.0),
                ("H3O+", 1.0),
                ("HCO3-", 1.0),
            ],
        )]);
        let bookkeeping =
            ReactionBookkeeping::new(&mut phase, reactions, &catalog, Default::default())?;

        let a = bookkeeping.a_matrix(&phase);
        // three elements plus the electroneutrality row, four species
        assert_eq!(a.dim(), (4, 4));
        let b = bookkeeping.b_vector(&phase);
        assert_relative_eq!(b, a.dot(&bookkeeping.n_vector(&phase)), epsilon = 1e-15);

        // element totals of the feed: H from water, O from water and CO2
        let h = bookkeeping.elements().get_index_of("H").unwrap();
        let o = bookkeeping.elements().get_index_of("O").unwrap();
        assert_relative_eq!(b[h], 20.0, epsilon = 1e-12);
        assert_relative_eq!(b[o], 12.0, epsilon = 1e-12);
        // net charge of the feed is zero
        assert_relative_eq!(b[3], 0.0, epsilon = 1e-40);
        Ok(())
    }

    #[test]
    fn pressure_correction_applied() -> ChemEqResult<()> {
        let (mut phase, catalog) = water_system();
        phase.pressure = 2.0;
        let reactions = ReactionSet::new(vec![Reaction::new(
            "carbonic acid",
            &[
                ("CO2", -1.0),
                ("water", -2.0),
                ("H3O+", 1.0),
                ("HCO3-", 1.0),
            ],
        )]);
        let bookkeeping =
            ReactionBookkeeping::new(&mut phase, reactions, &catalog, Default::default())?;
        let chem_ref =
            bookkeeping.reference_potentials(&phase, &crate::chemistry::IdealReferenceState)?;
        let i = bookkeeping
            .reactive_species()
            .iter()
            .position(|&i| phase.species()[i].name == "water")
            .unwrap();
        assert_relative_eq!(chem_ref[i], -10.0 + 2.0_f64.ln(), epsilon = 1e-15);
        Ok(())
    }
}
