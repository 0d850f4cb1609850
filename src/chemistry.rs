//! Species records and the state of a reacting phase.

use crate::errors::{ChemEqError, ChemEqResult};
use indexmap::IndexMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A chemical species together with its elemental composition.
///
/// The composition maps element names to the number of atoms of that element
/// in one molecule of the species. `mu0` is the reduced reference chemical
/// potential μ°/RT at the system temperature, i.e. the value a property
/// package would supply; the pressure correction `+ln(P)` is applied by the
/// reaction bookkeeping, not stored in the record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpeciesRecord {
    pub name: String,
    pub composition: IndexMap<String, f64>,
    /// Ionic charge, used for the electroneutrality constraint.
    #[serde(default)]
    pub charge: f64,
    /// Reduced reference chemical potential μ°/RT.
    #[serde(default)]
    pub mu0: f64,
}

impl SpeciesRecord {
    pub fn new(name: &str, composition: &[(&str, f64)], mu0: f64) -> Self {
        Self {
            name: name.to_string(),
            composition: composition
                .iter()
                .map(|(e, c)| (e.to_string(), *c))
                .collect(),
            charge: 0.0,
            mu0,
        }
    }

    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge;
        self
    }

    /// Read a list of species records from a JSON string.
    pub fn from_json_str(json: &str) -> ChemEqResult<Vec<Self>> {
        Ok(serde_json::from_str(json)?)
    }

    /// Number of atoms of `element` in one molecule of this species.
    pub fn element_count(&self, element: &str) -> f64 {
        self.composition.get(element).copied().unwrap_or(0.0)
    }
}

impl fmt::Display for SpeciesRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The mutable state of the phase in which the reactions take place.
///
/// Owns the ordered species list and the current mole numbers. Temperature
/// and pressure are opaque to the solver except for the `+ln(P)`
/// standard-state correction; both are stored in reduced (dimensionless)
/// form, with the pressure relative to the standard-state pressure.
#[derive(Clone, Debug)]
pub struct ReactivePhase {
    species: Vec<SpeciesRecord>,
    moles: Array1<f64>,
    pub temperature: f64,
    pub pressure: f64,
}

impl ReactivePhase {
    pub fn new(
        species: Vec<SpeciesRecord>,
        moles: Array1<f64>,
        temperature: f64,
        pressure: f64,
    ) -> ChemEqResult<Self> {
        if species.len() != moles.len() {
            return Err(ChemEqError::IncompatibleComponents(
                species.len(),
                moles.len(),
            ));
        }
        if let Some(&n) = moles.iter().find(|&&n| n < 0.0) {
            return Err(ChemEqError::InvalidState(
                String::from("reactive phase"),
                String::from("moles"),
                n,
            ));
        }
        Ok(Self {
            species,
            moles,
            temperature,
            pressure,
        })
    }

    pub fn species(&self) -> &[SpeciesRecord] {
        &self.species
    }

    pub fn moles(&self) -> &Array1<f64> {
        &self.moles
    }

    pub fn total_moles(&self) -> f64 {
        self.moles.sum()
    }

    pub fn molefracs(&self) -> Array1<f64> {
        &self.moles / self.total_moles()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.species.iter().position(|s| s.name == name)
    }

    /// Append a species to the phase, typically at trace moles when it is
    /// introduced by a reaction but was not part of the original feed.
    pub fn add_species(&mut self, record: SpeciesRecord, moles: f64) -> ChemEqResult<()> {
        if moles < 0.0 {
            return Err(ChemEqError::InvalidState(
                String::from("reactive phase"),
                String::from("moles"),
                moles,
            ));
        }
        self.species.push(record);
        let mut n = self.moles.to_vec();
        n.push(moles);
        self.moles = Array1::from_vec(n);
        Ok(())
    }

    /// Overwrite the mole number of a single species.
    pub fn set_moles(&mut self, index: usize, moles: f64) -> ChemEqResult<()> {
        if moles < 0.0 {
            return Err(ChemEqError::InvalidState(
                String::from("reactive phase"),
                String::from("moles"),
                moles,
            ));
        }
        self.moles[index] = moles;
        Ok(())
    }
}

/// Boundary to the thermodynamic property package.
///
/// Implementors supply the reduced reference chemical potential μ°/RT for
/// every species in the phase, evaluated at the current phase state. The
/// equilibrium solver treats these values as given; non-ideality enters the
/// iteration only through re-evaluation between outer passes.
pub trait ReferenceState {
    fn reference_potentials(&self, phase: &ReactivePhase) -> ChemEqResult<Array1<f64>>;
}

/// Reference state that reads μ°/RT directly from the species records.
pub struct IdealReferenceState;

impl ReferenceState for IdealReferenceState {
    fn reference_potentials(&self, phase: &ReactivePhase) -> ChemEqResult<Array1<f64>> {
        Ok(phase.species().iter().map(|s| s.mu0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn records_from_json() -> ChemEqResult<()> {
        let records = SpeciesRecord::from_json_str(
            r#"[
                {"name": "water", "composition": {"H": 2.0, "O": 1.0}, "mu0": -10.0},
                {"name": "H3O+", "composition": {"H": 3.0, "O": 1.0}, "charge": 1.0}
            ]"#,
        )?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].element_count("H"), 2.0);
        assert_eq!(records[0].charge, 0.0);
        assert_eq!(records[1].charge, 1.0);
        Ok(())
    }

    #[test]
    fn negative_moles_rejected() {
        let species = vec![SpeciesRecord::new("A", &[("X", 1.0)], 0.0)];
        let phase = ReactivePhase::new(species, arr1(&[-1.0]), 1.0, 1.0);
        assert!(matches!(phase, Err(ChemEqError::InvalidState(..))));
    }
}
