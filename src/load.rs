use crate::cache::CaseCache;
use crate::case::Case;

use anyhow::Result;

/// Sets the real power demand of bus `bus_i` in place.
///
/// Unknown bus numbers are ignored.
pub fn set_load(case: &mut Case, bus_i: usize, new_load_mw: f64) {
    match case.find_bus_mut(bus_i) {
        Some(bus) => bus.pd = new_load_mw,
        None => log::debug!("set_load: bus {} not found, ignoring", bus_i),
    }
}

/// Returns the real power demand (MW) of bus `bus_i`.
pub fn current_load(case: &Case, bus_i: usize) -> Option<f64> {
    case.find_bus(bus_i).map(|b| b.pd)
}

/// Returns the real power demand of bus `bus_i` in the cached case.
pub fn get_current_load(cache: &CaseCache, source: &str, bus_i: usize) -> Result<Option<f64>> {
    let case = cache.get_case(source)?;
    Ok(current_load(&case, bus_i))
}

/// Buses with positive real power demand, in case order.
pub fn current_loads(case: &Case) -> Vec<(usize, f64)> {
    case.bus
        .iter()
        .filter(|b| b.pd > 0.0)
        .map(|b| (b.bus_i, b.pd))
        .collect()
}

/// Lines of the current load listing.
pub fn current_loads_report(case: &Case) -> Vec<String> {
    let rule = "=".repeat(40);

    let mut lines = Vec::new();
    lines.push("Current Load Values:".to_string());
    lines.push(rule.clone());
    for (bus_i, pd) in current_loads(case) {
        lines.push(format!("Bus {}: {:.2} MW", bus_i, pd));
    }
    lines.push(rule);
    lines.push(String::new());
    lines
}

/// Prints the buses carrying load in the cached case.
pub fn print_current_loads(cache: &CaseCache, source: &str) -> Result<()> {
    let case = cache.get_case(source)?;
    for line in current_loads_report(&case) {
        println!("{}", line);
    }
    Ok(())
}

/// Total fixed real power demand (MW).
pub fn total_load(case: &Case) -> f64 {
    case.bus.iter().map(|b| b.pd).sum()
}
