use crate::scenario::{LoadChangeMap, ScenarioResult};

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// `Loads: Bus 3: 20.00 MW, Bus 5: 40.00 MW`, or `None` for an empty map.
pub fn loads_header(changes: &LoadChangeMap) -> Option<String> {
    if changes.is_empty() {
        return None;
    }
    let loads: Vec<String> = changes
        .iter()
        .map(|(bus_i, pd)| format!("Bus {}: {:.2} MW", bus_i, pd))
        .collect();
    Some(format!("Loads: {}", loads.join(", ")))
}

/// Report lines for `results`, scenarios separated by a blank line.
pub fn report_lines(results: &[ScenarioResult]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, scenario) in results.iter().enumerate() {
        if i > 0 {
            lines.push(String::new());
        }
        if let Some(header) = loads_header(&scenario.load_changes) {
            lines.push(header);
        }
        for b in &scenario.results.bus {
            lines.push(format!("Bus {}: ${:.2}/MWh", b.bus_i, b.lmp));
        }
    }
    lines
}

/// Writes the report to `out`, echoing every line to stdout.
pub fn write_report<W: Write>(results: &[ScenarioResult], out: &mut W) -> Result<()> {
    for line in report_lines(results) {
        println!("{}", line);
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

/// Writes the report to the file at `destination`, echoing it to stdout.
pub fn write_results(results: &[ScenarioResult], destination: &Path) -> Result<()> {
    let file = File::create(destination)
        .with_context(|| format!("creating report '{}'", destination.display()))?;
    let mut out = BufWriter::new(file);
    write_report(results, &mut out)
        .and_then(|_| out.flush().map_err(Into::into))
        .with_context(|| format!("writing report '{}'", destination.display()))?;
    log::info!(
        "wrote {} scenario(s) to '{}'",
        results.len(),
        destination.display()
    );
    Ok(())
}

/// Default report name of a single scenario run.
pub fn single_output_name(changes: &LoadChangeMap) -> String {
    if changes.is_empty() {
        return "opf_single_basecase.txt".to_string();
    }
    let desc: Vec<String> = changes
        .iter()
        .map(|(bus_i, pd)| format!("b{}_{}MW", bus_i, pd.trunc() as i64))
        .collect();
    format!("opf_single_{}.txt", desc.join("_"))
}

/// Default report name of a sweep, in configuration order.
pub fn sweep_output_name(bus_numbers: &[usize], load_starts: &[f64], load_ends: &[f64]) -> String {
    let desc: Vec<String> = bus_numbers
        .iter()
        .zip(load_starts)
        .zip(load_ends)
        .map(|((bus_i, start), end)| {
            format!(
                "b{}_{}to{}MW",
                bus_i,
                start.trunc() as i64,
                end.trunc() as i64
            )
        })
        .collect();
    format!("opf_loop_{}.txt", desc.join("_"))
}
