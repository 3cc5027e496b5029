use crate::cache::CaseCache;
use crate::case::Case;
use crate::debug::format_load_changes;
use crate::load::{set_load, total_load};
use crate::scenario::LoadChangeMap;

use anyhow::{format_err, Result};

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum OpfAlg {
    /// Primal-dual interior point method.
    PDIPM = 560,
}

/// Solver tuning used for every OPF run. Not configurable by callers.
#[derive(Debug, Clone, PartialEq)]
pub struct OpfOptions {
    pub algorithm: OpfAlg,

    /// Constraint violation tolerance.
    pub violation: f64,

    // Termination tolerances of the interior point method.
    pub grad_tol: f64,
    pub comp_tol: f64,
    pub cost_tol: f64,
    pub feas_tol: f64,

    /// Maximum number of interior point iterations.
    pub max_it: usize,

    /// Enforce generator reactive power limits.
    pub enforce_q_limits: bool,
    /// Enforce generator real power limits.
    pub enforce_p_limits: bool,

    pub verbose: usize,
}

impl Default for OpfOptions {
    fn default() -> Self {
        Self {
            algorithm: OpfAlg::PDIPM,
            violation: 1e-2,
            grad_tol: 1e-2,
            comp_tol: 1e-2,
            cost_tol: 1e-2,
            feas_tol: 1e-2,
            max_it: 100,
            enforce_q_limits: true,
            enforce_p_limits: true,
            verbose: 0,
        }
    }
}

/// Optimal power flow solver.
///
/// Returns the solved case (bus voltages and `lam_p` filled in, generator
/// dispatch updated) and whether the solver converged. `Err` signals a
/// solver fault, not a failure to converge.
pub trait OpfSolver {
    fn solve(&self, case: &Case, opt: &OpfOptions) -> Result<(Case, bool), String>;
}

/// Per-bus row of an OPF result table.
#[derive(Debug, Clone, PartialEq)]
pub struct BusResult {
    pub bus_i: usize,
    pub name: String,
    /// Locational marginal price ($/MWh).
    pub lmp: f64,
    /// Voltage magnitude (p.u.).
    pub vm: f64,
    /// Voltage angle (degrees).
    pub va: f64,
    /// Real power demand (MW).
    pub p: f64,
    /// Reactive power demand (MVAr).
    pub q: f64,
}

/// Per-generator dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct GenDispatch {
    pub bus_i: usize,
    pub label: String,
    /// Real power output (MW).
    pub pg: f64,
    /// Reactive power output (MVAr).
    pub qg: f64,
    /// Marginal cost ($/MWh). Not reported by the solver, always zero.
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpfResults {
    /// In the order the solver returned the buses.
    pub bus: Vec<BusResult>,
    pub gen: Vec<GenDispatch>,
}

impl OpfResults {
    /// Builds the result tables of a solved case. Bus names come from the
    /// input case.
    pub fn new(input: &Case, solved: &Case) -> Self {
        let bus = solved
            .bus
            .iter()
            .enumerate()
            .map(|(i, b)| BusResult {
                bus_i: b.bus_i,
                name: input.bus_name(i),
                lmp: b.lam_p.unwrap_or_default(),
                vm: b.vm,
                va: b.va,
                p: b.pd,
                q: b.qd,
            })
            .collect();

        let gen = solved
            .gen
            .iter()
            .map(|g| GenDispatch {
                bus_i: g.gen_bus,
                label: format!("Gen {}", g.gen_bus),
                pg: g.pg,
                qg: g.qg,
                cost: 0.0,
            })
            .collect();

        Self { bus, gen }
    }

    pub fn lmp(&self, bus_i: usize) -> Option<f64> {
        self.bus.iter().find(|b| b.bus_i == bus_i).map(|b| b.lmp)
    }
}

/// Solves `case` with the fixed OPF options. `None` when the solver did
/// not converge.
pub fn run_opf(case: &Case, solver: &dyn OpfSolver) -> Result<Option<OpfResults>> {
    let opt = OpfOptions::default();
    let (solved, success) = solver
        .solve(case, &opt)
        .map_err(|err| format_err!("opf solver error: {}", err))?;
    if !success {
        return Ok(None);
    }
    Ok(Some(OpfResults::new(case, &solved)))
}

/// Solves a private copy of the cached case with `changes` applied.
pub fn run_opf_with_loads(
    cache: &CaseCache,
    source: &str,
    changes: &LoadChangeMap,
    solver: &dyn OpfSolver,
) -> Result<Option<OpfResults>> {
    let mut case = (*cache.get_case(source)?).clone();
    for (&bus_i, &new_load) in changes {
        set_load(&mut case, bus_i, new_load);
    }
    log::debug!(
        "running opf on '{}' with loads {} (total {:.2} MW)",
        source,
        format_load_changes(changes),
        total_load(&case)
    );
    run_opf(&case, solver)
}
