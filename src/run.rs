use crate::cache::CaseCache;
use crate::opf::{run_opf_with_loads, OpfSolver};
use crate::report::{single_output_name, write_results};
use crate::scenario::{build_load_changes, ScenarioResult};

use anyhow::Result;
use derive_builder::Builder;
use std::path::PathBuf;

/// Load modifications for a single OPF run. Everything defaults to empty,
/// which solves the unmodified case.
#[derive(Debug, Clone, Default, Builder)]
#[builder(default)]
pub struct SingleRun {
    /// `(bus, MW)` loads to set outright.
    pub absolute: Vec<(usize, f64)>,

    /// `(bus, MW)` changes relative to the case load.
    pub delta: Vec<(usize, f64)>,

    /// Report file. Named after the modified loads when not set.
    #[builder(setter(into, strip_option))]
    pub output_file: Option<PathBuf>,
}

/// Solves one scenario and writes its report.
///
/// Returns `Ok(None)` and writes nothing when the solver does not
/// converge.
pub fn run_opf_single(
    cache: &CaseCache,
    source: &str,
    run: &SingleRun,
    solver: &dyn OpfSolver,
) -> Result<Option<ScenarioResult>> {
    let base = cache.get_case(source)?;
    let load_changes = build_load_changes(&run.absolute, &run.delta, &base);

    let output_file = match &run.output_file {
        Some(path) => path.clone(),
        None => PathBuf::from(single_output_name(&load_changes)),
    };

    let results = match run_opf_with_loads(cache, source, &load_changes, solver)? {
        Some(results) => results,
        None => {
            println!("OPF failed to converge!");
            log::warn!("opf did not converge on '{}'", source);
            return Ok(None);
        }
    };

    let scenario = ScenarioResult {
        load_changes,
        results,
    };
    write_results(std::slice::from_ref(&scenario), &output_file)?;
    Ok(Some(scenario))
}
