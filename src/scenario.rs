use crate::case::Case;
use crate::load::current_load;
use crate::opf::OpfResults;

use std::collections::BTreeMap;

/// New real power demand (MW) by bus number, ordered by bus number.
pub type LoadChangeMap = BTreeMap<usize, f64>;

/// The loads applied for one scenario and what the solver made of them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioResult {
    pub load_changes: LoadChangeMap,
    pub results: OpfResults,
}

/// Resolves absolute and delta load changes against `base`.
///
/// Absolute values are applied first, in order, so a later entry for the
/// same bus replaces an earlier one. Deltas are then added to the bus load
/// in `base` and replace any absolute value for that bus. Deltas on buses
/// missing from `base` are dropped.
pub fn build_load_changes(
    absolute: &[(usize, f64)],
    delta: &[(usize, f64)],
    base: &Case,
) -> LoadChangeMap {
    let mut changes = LoadChangeMap::new();

    for &(bus_i, new_load) in absolute {
        changes.insert(bus_i, new_load);
    }
    for &(bus_i, d) in delta {
        match current_load(base, bus_i) {
            Some(old_load) => {
                changes.insert(bus_i, old_load + d);
            }
            None => log::debug!("dropping load delta for unknown bus {}", bus_i),
        }
    }
    changes
}
