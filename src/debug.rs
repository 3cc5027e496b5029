use crate::scenario::LoadChangeMap;
use pretty_dtoa::{dtoa, FmtFloatConfig};

const FLOAT_CONFIG: FmtFloatConfig = FmtFloatConfig::default()
    .add_point_zero(false)
    .max_significant_digits(9);

pub fn format_f64_vec(v: &[f64]) -> String {
    let a: Vec<String> = v.iter().map(|f| dtoa(*f, FLOAT_CONFIG)).collect();
    format!("[{}]", a.join(", "))
}

/// Formats a load change map as `{bus: MW, ...}` for log output.
pub fn format_load_changes(changes: &LoadChangeMap) -> String {
    let a: Vec<String> = changes
        .iter()
        .map(|(bus_i, pd)| format!("{}: {}", bus_i, dtoa(*pd, FLOAT_CONFIG)))
        .collect();
    format!("{{{}}}", a.join(", "))
}
