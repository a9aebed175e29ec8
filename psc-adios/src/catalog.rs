//! Mapping from the variables PSC writes to the physical fields they contain.
//!
//! PSC packs several fields into one variable along its trailing axis. The electromagnetic
//! fields and currents all live in `jeh`, for instance, and the particle moments of every species
//! live in `all_1st`. A `FieldCatalog` knows, for each such variable, which field sits at which
//! component.
//!
use indexmap::IndexMap;

use crate::errors::{Error, Result};

/// The moments PSC computes for each species, in the order they are stored
pub const MOMENTS: [&str; 13] = [
    "rho", "jx", "jy", "jz", "px", "py", "pz", "txx", "tyy", "tzz", "txy", "tyz", "tzx",
];

/// Number of components each species takes up in a moment variable
pub const MOMENTS_PER_SPECIES: usize = MOMENTS.len();

const JEH: [&str; 9] = [
    "jx_ec", "jy_ec", "jz_ec", "ex_ec", "ey_ec", "ez_ec", "hx_fc", "hy_fc", "hz_fc",
];

const SCALARS: [&str; 4] = ["dive", "rho", "d_rho", "div_j"];

// "all_1st" is kept for reading output written by older versions of PSC
const MOMENT_VARIABLES: [&str; 2] = ["all_1st", "all_1st_cc"];

/// Where a field lives: the variable it is stored in and its component in that variable's
/// trailing axis.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldLocation {
    pub variable: String,
    pub component: usize,
}

/// For each variable PSC writes, the fields stored in it and their components.
///
#[derive(Clone, Debug)]
pub struct FieldCatalog {
    variables: IndexMap<String, IndexMap<String, usize>>,
}

impl FieldCatalog {
    /// Build the catalog for a run with the given species.
    ///
    /// # Arguments
    ///
    /// * `species_names` - Names of the species in the run, e.g. `["e", "i"]`, in the order PSC
    ///   stores them. Moment fields are named `{moment}_{species}`.
    ///
    pub fn new<I, S>(species_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut variables = IndexMap::new();
        variables.insert(String::from("jeh"), components(JEH.iter().copied()));
        for scalar in SCALARS {
            variables.insert(scalar.to_string(), components([scalar]));
        }

        let mut moments = IndexMap::new();
        for (species_idx, species_name) in species_names.into_iter().enumerate() {
            let species_name = species_name.as_ref();
            for (moment_idx, moment) in MOMENTS.iter().enumerate() {
                moments.insert(
                    format!("{moment}_{species_name}"),
                    moment_idx + MOMENTS_PER_SPECIES * species_idx,
                );
            }
        }
        for variable in MOMENT_VARIABLES {
            variables.insert(variable.to_string(), moments.clone());
        }

        Self { variables }
    }

    /// The fields stored in a variable, by component.
    ///
    /// Returns `None` for variables the catalog doesn't know.
    ///
    pub fn fields_of(&self, variable: &str) -> Option<&IndexMap<String, usize>> {
        self.variables.get(variable)
    }

    /// Resolve the fields available from a set of variables.
    ///
    /// Variables the catalog doesn't know are skipped. If more than one of the variables provides
    /// the same field, the last one wins.
    ///
    pub fn resolve<I, S>(&self, variable_names: I) -> IndexMap<String, FieldLocation>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut fields = IndexMap::new();
        for variable in variable_names {
            let variable = variable.as_ref();
            if let Some(components) = self.variables.get(variable) {
                for (field, &component) in components {
                    let location = FieldLocation {
                        variable: variable.to_string(),
                        component,
                    };
                    fields.insert(field.clone(), location);
                }
            }
        }

        fields
    }

    /// Find the first variable, in catalog order, that provides `field`.
    ///
    pub fn lookup(&self, field: &str) -> Result<FieldLocation> {
        self.variables
            .iter()
            .find_map(|(variable, components)| {
                components.get(field).map(|&component| FieldLocation {
                    variable: variable.clone(),
                    component,
                })
            })
            .ok_or_else(|| Error::MissingField(field.to_string()))
    }
}

fn components<'a>(fields: impl IntoIterator<Item = &'a str>) -> IndexMap<String, usize> {
    fields
        .into_iter()
        .enumerate()
        .map(|(component, field)| (field.to_string(), component))
        .collect()
}
