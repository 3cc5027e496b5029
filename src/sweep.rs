use crate::cache::CaseCache;
use crate::debug::{format_f64_vec, format_load_changes};
use crate::opf::{run_opf_with_loads, OpfResults, OpfSolver};
use crate::report::{sweep_output_name, write_results};
use crate::scenario::{LoadChangeMap, ScenarioResult};

use anyhow::{format_err, Result};
use derive_builder::Builder;
use std::path::PathBuf;

// Absorbs float noise when a range lands exactly on its end value.
const RANGE_TOL: f64 = 1e-9;

/// Upper bound on the number of values in one load range. Every value is
/// an OPF solve.
pub const MAX_RANGE_LEN: usize = 1_000_000;

/// Load sweep over one or more buses.
///
/// Bus `bus_numbers[i]` takes the values `load_starts[i]`,
/// `load_starts[i] + load_step_sizes[i]`, ... up to `load_ends[i]`. When
/// `(end - start)` is not a multiple of the step, the last value is the
/// first one past `end`.
///
/// All buses advance together: iteration `k` sets every bus whose range
/// has a `k`-th value. Buses with shorter ranges drop out of the later
/// iterations and keep their case load there.
#[derive(Debug, Clone, Default, Builder)]
#[builder(default, build_fn(validate = "Self::validate"))]
pub struct Sweep {
    pub bus_numbers: Vec<usize>,
    pub load_starts: Vec<f64>,
    pub load_ends: Vec<f64>,
    pub load_step_sizes: Vec<f64>,

    /// Report file. Named after the swept buses and ranges when not set.
    #[builder(setter(into, strip_option))]
    pub output_file: Option<PathBuf>,
}

impl SweepBuilder {
    fn validate(&self) -> Result<(), String> {
        let sweep = Sweep {
            bus_numbers: self.bus_numbers.clone().unwrap_or_default(),
            load_starts: self.load_starts.clone().unwrap_or_default(),
            load_ends: self.load_ends.clone().unwrap_or_default(),
            load_step_sizes: self.load_step_sizes.clone().unwrap_or_default(),
            output_file: None,
        };
        sweep.load_ranges().map(|_| ()).map_err(|err| err.to_string())
    }
}

impl Sweep {
    /// Load values of every swept bus, in configuration order.
    pub fn load_ranges(&self) -> Result<Vec<Vec<f64>>> {
        let n = self.bus_numbers.len();
        if n == 0 {
            return Err(format_err!("sweep must include at least one bus"));
        }
        if self.load_starts.len() != n
            || self.load_ends.len() != n
            || self.load_step_sizes.len() != n
        {
            return Err(format_err!(
                "sweep lengths must match: {} buses, {} starts, {} ends, {} steps",
                n,
                self.load_starts.len(),
                self.load_ends.len(),
                self.load_step_sizes.len()
            ));
        }

        (0..n)
            .map(|i| {
                load_range(
                    self.load_starts[i],
                    self.load_ends[i],
                    self.load_step_sizes[i],
                )
                .map_err(|err| err.context(format!("bus {}", self.bus_numbers[i])))
            })
            .collect()
    }

    pub fn output_file(&self) -> PathBuf {
        match &self.output_file {
            Some(path) => path.clone(),
            None => PathBuf::from(sweep_output_name(
                &self.bus_numbers,
                &self.load_starts,
                &self.load_ends,
            )),
        }
    }
}

/// Inclusive load range `start, start + step, ...` ending at or just past
/// `end`.
pub fn load_range(start: f64, end: f64, step: f64) -> Result<Vec<f64>> {
    if !start.is_finite() || !end.is_finite() || !step.is_finite() {
        return Err(format_err!(
            "load range must be finite: start {}, end {}, step {}",
            start,
            end,
            step
        ));
    }
    if step <= 0.0 {
        return Err(format_err!("load step must be positive: {}", step));
    }
    if end < start {
        return Err(format_err!(
            "load range end ({}) must not be less than start ({})",
            end,
            start
        ));
    }

    let steps = ((end - start) / step - RANGE_TOL).ceil().max(0.0);
    if !steps.is_finite() || steps >= MAX_RANGE_LEN as f64 {
        return Err(format_err!(
            "load range {} to {} by {} exceeds {} values",
            start,
            end,
            step,
            MAX_RANGE_LEN
        ));
    }
    let n = steps as usize + 1;
    Ok((0..n).map(|k| start + k as f64 * step).collect())
}

/// Loads of sweep iteration `k`: every bus whose range reaches index `k`.
pub fn load_changes_at(bus_numbers: &[usize], ranges: &[Vec<f64>], k: usize) -> LoadChangeMap {
    bus_numbers
        .iter()
        .zip(ranges)
        .filter_map(|(&bus_i, range)| range.get(k).map(|&pd| (bus_i, pd)))
        .collect()
}

/// One sweep iteration and its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    pub index: usize,
    pub load_changes: LoadChangeMap,
    /// `None` when the solver did not converge.
    pub results: Option<OpfResults>,
}

impl SweepPoint {
    pub fn converged(&self) -> bool {
        self.results.is_some()
    }
}

/// Runs every sweep iteration, keeping the ones that did not converge.
pub fn run_sweep_with_status(
    cache: &CaseCache,
    source: &str,
    sweep: &Sweep,
    solver: &dyn OpfSolver,
) -> Result<Vec<SweepPoint>> {
    let ranges = sweep.load_ranges()?;
    for (bus_i, range) in sweep.bus_numbers.iter().zip(&ranges) {
        log::debug!("bus {} loads {}", bus_i, format_f64_vec(range));
    }
    let n = ranges.iter().map(|r| r.len()).max().unwrap_or(0);
    log::info!("sweeping {} scenario(s) on '{}'", n, source);

    let mut points = Vec::with_capacity(n);
    for k in 0..n {
        let load_changes = load_changes_at(&sweep.bus_numbers, &ranges, k);
        let results = run_opf_with_loads(cache, source, &load_changes, solver)?;
        if results.is_none() {
            log::warn!(
                "opf did not converge for loads {}",
                format_load_changes(&load_changes)
            );
        }
        points.push(SweepPoint {
            index: k,
            load_changes,
            results,
        });
    }
    Ok(points)
}

/// Runs the sweep and returns the converged scenarios in iteration order.
/// Iterations that fail to converge are left out.
pub fn run_sweep(
    cache: &CaseCache,
    source: &str,
    sweep: &Sweep,
    solver: &dyn OpfSolver,
) -> Result<Vec<ScenarioResult>> {
    let points = run_sweep_with_status(cache, source, sweep, solver)?;
    let total = points.len();

    let results: Vec<ScenarioResult> = points
        .into_iter()
        .filter_map(|p| {
            p.results.map(|results| ScenarioResult {
                load_changes: p.load_changes,
                results,
            })
        })
        .collect();
    if results.len() < total {
        log::warn!(
            "{} of {} scenario(s) did not converge",
            total - results.len(),
            total
        );
    }
    Ok(results)
}

/// Runs the sweep and writes the converged scenarios to the sweep's report
/// file.
pub fn run_opf_loop(
    cache: &CaseCache,
    source: &str,
    sweep: &Sweep,
    solver: &dyn OpfSolver,
) -> Result<Vec<ScenarioResult>> {
    let results = run_sweep(cache, source, sweep, solver)?;
    write_results(&results, &sweep.output_file())?;
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opf::tests::{FaultySolver, StubSolver};
    use std::fs;

    const CASE: &str = "mpc.bus = [\n\
        1 3 0 0 0 0 1 1 0 230 1 1.1 0.9;\n\
        3 1 25 0 0 0 1 1 0 230 1 1.1 0.9;\n\
        5 1 45 0 0 0 1 1 0 230 1 1.1 0.9;\n\
        ];\n\
        mpc.gen = [\n\
        1 0 0 100 -100 1 100 1 200 0;\n\
        ];";

    fn cache() -> CaseCache {
        let _ = env_logger::builder().is_test(true).try_init();
        CaseCache::with_reader(|_| Ok(CASE.to_string()))
    }

    fn sweep(buses: &[usize], starts: &[f64], ends: &[f64], steps: &[f64]) -> Sweep {
        Sweep {
            bus_numbers: buses.to_vec(),
            load_starts: starts.to_vec(),
            load_ends: ends.to_vec(),
            load_step_sizes: steps.to_vec(),
            output_file: None,
        }
    }

    #[test]
    fn test_load_range() -> Result<()> {
        assert_eq!(load_range(40.0, 50.0, 1.0)?.len(), 11);
        assert_eq!(load_range(20.0, 20.0, 1.0)?, vec![20.0]);
        assert_eq!(load_range(0.0, 1.0, 0.5)?, vec![0.0, 0.5, 1.0]);
        assert_eq!(load_range(0.0, 0.3, 0.1)?.len(), 4);
        // last value steps past a non-aligned end
        assert_eq!(load_range(0.0, 5.0, 2.0)?, vec![0.0, 2.0, 4.0, 6.0]);

        assert!(load_range(0.0, 1.0, 0.0).is_err());
        assert!(load_range(0.0, 1.0, -1.0).is_err());
        assert!(load_range(2.0, 1.0, 1.0).is_err());
        assert!(load_range(0.0, f64::NAN, 1.0).is_err());
        Ok(())
    }

    #[test]
    fn test_oversized_load_range() -> Result<()> {
        // (end - start) / step overflows to infinity
        assert!(load_range(0.0, 1e300, 1e-300).is_err());
        assert!(load_range(0.0, 1e12, 1.0).is_err());
        assert!(load_range(0.0, MAX_RANGE_LEN as f64, 1.0).is_err());

        let longest = load_range(0.0, (MAX_RANGE_LEN - 1) as f64, 1.0)?;
        assert_eq!(longest.len(), MAX_RANGE_LEN);

        let built = SweepBuilder::default()
            .bus_numbers(vec![5])
            .load_starts(vec![0.0])
            .load_ends(vec![1e300])
            .load_step_sizes(vec![1e-300])
            .build();
        assert!(built.is_err());
        Ok(())
    }

    #[test]
    fn test_sweep_is_inclusive() -> Result<()> {
        let cache = cache();
        let solver = StubSolver::flat(20.0);

        let results = run_sweep(&cache, "case", &sweep(&[5], &[40.0], &[50.0], &[1.0]), &solver)?;

        assert_eq!(results.len(), 11);
        for (k, scenario) in results.iter().enumerate() {
            assert_eq!(
                scenario.load_changes,
                LoadChangeMap::from([(5, 40.0 + k as f64)])
            );
        }
        Ok(())
    }

    #[test]
    fn test_unequal_ranges() -> Result<()> {
        let cache = cache();
        let solver = StubSolver::flat(20.0);

        let results = run_sweep(
            &cache,
            "case",
            &sweep(&[5, 3], &[40.0, 20.0], &[50.0, 20.0], &[1.0, 1.0]),
            &solver,
        )?;

        assert_eq!(results.len(), 11);
        assert_eq!(
            results[0].load_changes,
            LoadChangeMap::from([(3, 20.0), (5, 40.0)])
        );
        for scenario in &results[1..] {
            assert_eq!(scenario.load_changes.len(), 1);
            assert!(scenario.load_changes.contains_key(&5));
        }

        // bus 3 falls back to its case load once its range is exhausted
        let seen = solver.seen.borrow();
        assert_eq!(seen[0], vec![(1, 0.0), (3, 20.0), (5, 40.0)]);
        assert_eq!(seen[1], vec![(1, 0.0), (3, 25.0), (5, 41.0)]);
        Ok(())
    }

    #[test]
    fn test_non_converged_iterations_are_dropped() -> Result<()> {
        let cache = cache();
        let solver = StubSolver {
            slope: 0.1,
            max_load: 72.0,
            ..StubSolver::flat(10.0)
        };
        let sweep = sweep(&[5], &[40.0], &[50.0], &[1.0]);

        // total load is 25 + bus 5, so bus 5 above 47 fails
        let points = run_sweep_with_status(&cache, "case", &sweep, &solver)?;
        assert_eq!(points.len(), 11);
        assert_eq!(points.iter().filter(|p| p.converged()).count(), 8);
        assert!(!points[8].converged());
        assert_eq!(points[8].index, 8);

        let results = run_sweep(&cache, "case", &sweep, &solver)?;
        assert_eq!(results.len(), 8);
        assert_eq!(results[7].load_changes, LoadChangeMap::from([(5, 47.0)]));
        assert_eq!(results[7].results.lmp(5), Some(10.0 + 0.1 * 72.0));
        Ok(())
    }

    #[test]
    fn test_invalid_sweeps() {
        let cache = cache();
        let solver = StubSolver::flat(20.0);

        let bad = [
            sweep(&[], &[], &[], &[]),
            sweep(&[5, 3], &[40.0], &[50.0, 30.0], &[1.0, 1.0]),
            sweep(&[5], &[40.0], &[50.0], &[0.0]),
            sweep(&[5], &[40.0], &[30.0], &[1.0]),
        ];
        for s in &bad {
            assert!(run_sweep(&cache, "case", s, &solver).is_err());
        }
        assert!(solver.seen.borrow().is_empty());
    }

    #[test]
    fn test_solver_fault_aborts_sweep() {
        let cache = cache();
        let sweep = sweep(&[5], &[40.0], &[41.0], &[1.0]);
        assert!(run_sweep(&cache, "case", &sweep, &FaultySolver).is_err());
    }

    #[test]
    fn test_builder() {
        let sweep = SweepBuilder::default()
            .bus_numbers(vec![5, 3])
            .load_starts(vec![40.0, 20.0])
            .load_ends(vec![50.0, 30.0])
            .load_step_sizes(vec![1.0, 1.0])
            .build()
            .unwrap();
        assert_eq!(
            sweep.output_file(),
            PathBuf::from("opf_loop_b5_40to50MW_b3_20to30MW.txt")
        );

        let err = SweepBuilder::default()
            .bus_numbers(vec![5])
            .load_starts(vec![40.0])
            .load_ends(vec![50.0])
            .load_step_sizes(vec![-1.0])
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn test_run_opf_loop() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("loop.txt");
        let cache = cache();
        let solver = StubSolver::flat(20.0);

        let sweep = SweepBuilder::default()
            .bus_numbers(vec![5, 3])
            .load_starts(vec![40.0, 20.0])
            .load_ends(vec![41.0, 20.0])
            .load_step_sizes(vec![1.0, 1.0])
            .output_file(&path)
            .build()?;
        let results = run_opf_loop(&cache, "case", &sweep, &solver)?;
        assert_eq!(results.len(), 2);

        let expected = "Loads: Bus 3: 20.00 MW, Bus 5: 40.00 MW\n\
            Bus 1: $20.00/MWh\n\
            Bus 3: $20.00/MWh\n\
            Bus 5: $20.00/MWh\n\
            \n\
            Loads: Bus 5: 41.00 MW\n\
            Bus 1: $20.00/MWh\n\
            Bus 3: $20.00/MWh\n\
            Bus 5: $20.00/MWh\n";
        assert_eq!(fs::read_to_string(&path)?, expected);
        Ok(())
    }
}
