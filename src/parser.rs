//! MATPOWER `.m` case parser.
//!
//! The text is read line by line through a small state machine. While
//! scanning, `mpc.<field> = ...` assignments are recognised by their exact
//! key. Matrix sections (`[` ... `]`) and the bus name cell array
//! (`{` ... `}`) switch the machine into an accumulating state until the
//! closing marker is seen.
//!
//! Rows that are too short, contain non-numeric tokens or carry a bus
//! number that is not a non-negative integer are skipped, and absent
//! sections produce empty tables. Only reading the file can fail.

use crate::case::Case;
use crate::debug::format_f64_vec;
use crate::idx::*;
use anyhow::{Context, Result};
use caseformat::{Branch, Bus, Gen, GenCost};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, PartialEq, Copy, Clone)]
enum Section {
    Bus,
    Gen,
    GenCost,
    Branch,
}

impl Section {
    fn from_key(key: &str) -> Option<Section> {
        match key {
            "mpc.bus" => Some(Section::Bus),
            "mpc.gen" => Some(Section::Gen),
            "mpc.gencost" => Some(Section::GenCost),
            "mpc.branch" => Some(Section::Branch),
            _ => None,
        }
    }

    /// Minimum number of tokens for a row to be accepted.
    fn min_cols(&self) -> usize {
        match self {
            Section::Bus => BUS_MIN_COLS,
            Section::Gen => GEN_MIN_COLS,
            Section::GenCost => GENCOST_MIN_COLS,
            Section::Branch => BRANCH_MIN_COLS,
        }
    }

    /// Canonical row width. Cost rows are not padded.
    fn width(&self) -> Option<usize> {
        match self {
            Section::Bus => Some(BUS_COLS),
            Section::Gen => Some(GEN_COLS),
            Section::GenCost => None,
            Section::Branch => Some(BRANCH_COLS),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Section::Bus => "bus",
            Section::Gen => "gen",
            Section::GenCost => "gencost",
            Section::Branch => "branch",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, PartialEq, Copy, Clone)]
enum State {
    Scan,
    Matrix(Section),
    Names,
}

/// Reads and parses a MATPOWER case file.
pub fn parse_case_file(path: &Path) -> Result<Case> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading case file '{}'", path.display()))?;
    Ok(parse_case(&text))
}

/// Parses MATPOWER case text. Never fails: malformed rows are skipped and
/// missing sections are left empty.
pub fn parse_case(text: &str) -> Case {
    let mut case = Case::default();
    let mut state = State::Scan;

    for line in text.lines() {
        state = match state {
            State::Scan => scan_line(&mut case, line),
            State::Matrix(section) => matrix_line(&mut case, section, strip_comment(line)),
            State::Names => names_line(&mut case, line),
        };
    }
    if state != State::Scan {
        log::debug!("case text ended inside an open section ({:?})", state);
    }

    log::debug!(
        "parsed case '{}': {} buses, {} gens, {} gencosts, {} branches, {} bus names",
        case.name,
        case.bus.len(),
        case.gen.len(),
        case.gencost.len(),
        case.branch.len(),
        case.bus_name.len()
    );
    case
}

fn scan_line(case: &mut Case, line: &str) -> State {
    let line = strip_comment(line).trim();
    if line.is_empty() {
        return State::Scan;
    }
    let (lhs, rhs) = match line.split_once('=') {
        Some((lhs, rhs)) => (lhs.trim(), rhs.trim()),
        None => return State::Scan,
    };

    if lhs.starts_with("function") {
        case.name = rhs.trim_end_matches(';').trim().to_string();
        return State::Scan;
    }
    if lhs == "mpc.baseMVA" {
        match rhs.trim_end_matches(';').trim().parse::<f64>() {
            Ok(v) if v.is_finite() => case.base_mva = v,
            _ => log::debug!("ignoring malformed baseMVA '{}'", rhs),
        }
        return State::Scan;
    }
    if lhs == "mpc.bus_name" {
        if let Some(rest) = rhs.strip_prefix('{') {
            return names_line(case, rest);
        }
        return State::Scan;
    }
    if let Some(section) = Section::from_key(lhs) {
        if let Some(rest) = rhs.strip_prefix('[') {
            return matrix_line(case, section, rest);
        }
    }
    State::Scan
}

fn matrix_line(case: &mut Case, section: Section, body: &str) -> State {
    let (body, next) = match body.find(']') {
        Some(end) => (&body[..end], State::Scan),
        None => (body, State::Matrix(section)),
    };
    for segment in body.split(';') {
        match parse_row(segment, section.min_cols(), section.width()) {
            Some(row) => push_row(case, section, &row),
            None => {
                if !segment.trim().is_empty() {
                    log::trace!("skipping malformed {} row '{}'", section, segment.trim());
                }
            }
        }
    }
    next
}

fn push_row(case: &mut Case, section: Section, row: &[f64]) {
    log::trace!("{} row {}", section, format_f64_vec(row));
    match section {
        Section::Bus => push_valid(&mut case.bus, array_to_bus(row), section),
        Section::Gen => push_valid(&mut case.gen, array_to_gen(row), section),
        Section::GenCost => case.gencost.push(array_to_gencost(row)),
        Section::Branch => push_valid(&mut case.branch, array_to_branch(row), section),
    }
}

fn push_valid<T>(table: &mut Vec<T>, record: Option<T>, section: Section) {
    match record {
        Some(record) => table.push(record),
        None => log::trace!("skipping {} row with invalid bus number", section),
    }
}

/// Bus number stored in a row column. Fractional, negative and
/// out-of-range values are not bus numbers.
fn bus_number(v: f64) -> Option<usize> {
    if v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 {
        Some(v as usize)
    } else {
        None
    }
}

// Rows reaching the converters below are padded to their canonical width
// (gencost rows have at least `GENCOST_MIN_COLS` columns).

fn array_to_bus(a: &[f64]) -> Option<Bus> {
    Some(Bus {
        bus_i: bus_number(a[BUS_I])?,
        bus_type: a[BUS_TYPE] as _,

        pd: a[PD],
        qd: a[QD],
        gs: a[GS],
        bs: a[BS],

        bus_area: a[BUS_AREA] as usize,

        vm: a[VM],
        va: a[VA],

        base_kv: a[BASE_KV],
        zone: a[ZONE] as _,

        vmax: a[VMAX],
        vmin: a[VMIN],

        lam_p: Some(a[LAM_P]),
        ..Default::default()
    })
}

fn array_to_gen(a: &[f64]) -> Option<Gen> {
    Some(Gen {
        gen_bus: bus_number(a[GEN_BUS])?,

        pg: a[PG],
        qg: a[QG],

        qmax: a[QMAX],
        qmin: a[QMIN],

        vg: a[VG],

        mbase: a[MBASE],
        gen_status: a[GEN_STATUS] as _,

        pmax: a[PMAX],
        pmin: a[PMIN],
        ..Default::default()
    })
}

fn array_to_gencost(a: &[f64]) -> GenCost {
    GenCost {
        model: a[MODEL] as _,
        startup: a[STARTUP],
        shutdown: a[SHUTDOWN],
        ncost: a[NCOST] as _,
        cost: a[COST..].to_vec(),
    }
}

fn array_to_branch(a: &[f64]) -> Option<Branch> {
    Some(Branch {
        f_bus: bus_number(a[F_BUS])?,
        t_bus: bus_number(a[T_BUS])?,

        br_r: a[BR_R],
        br_x: a[BR_X],
        br_b: a[BR_B],

        rate_a: a[RATE_A],
        rate_b: a[RATE_B],
        rate_c: a[RATE_C],

        tap: a[TAP],
        shift: a[SHIFT],

        br_status: a[BR_STATUS] as _,

        angmin: Some(a[ANGMIN]),
        angmax: Some(a[ANGMAX]),

        pf: Some(a[PF]),
        qf: Some(a[QF]),
        pt: Some(a[PT]),
        qt: Some(a[QT]),
        ..Default::default()
    })
}

fn names_line(case: &mut Case, line: &str) -> State {
    let trimmed = line.trim();
    if trimmed.starts_with('%') {
        return State::Names;
    }

    let rest = match trimmed.find('\'') {
        Some(open) => {
            let quoted = &trimmed[open + 1..];
            match quoted.find('\'') {
                Some(close) => {
                    if close > 0 {
                        case.bus_name.push(quoted[..close].to_string());
                    }
                    &quoted[close + 1..]
                }
                None => {
                    log::trace!("dropping unterminated bus name '{}'", trimmed);
                    quoted
                }
            }
        }
        None => trimmed,
    };

    if strip_comment(rest).contains('}') {
        State::Scan
    } else {
        State::Names
    }
}

/// Removes a trailing `%` comment.
pub fn strip_comment(line: &str) -> &str {
    match line.find('%') {
        Some(i) => &line[..i],
        None => line,
    }
}

/// Splits a single matrix row into numeric columns.
///
/// Returns `None` for blank rows, rows with non-numeric tokens and rows
/// with fewer than `min_cols` tokens. Accepted rows are padded with zeros
/// up to `width`, when given.
pub fn parse_row(line: &str, min_cols: usize, width: Option<usize>) -> Option<Vec<f64>> {
    let mut row = strip_comment(line)
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|tok| !tok.is_empty())
        .map(|tok| tok.parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .ok()?;

    if row.is_empty() || row.len() < min_cols {
        return None;
    }
    if let Some(width) = width {
        if row.len() < width {
            row.resize(width, 0.0);
        }
    }
    Some(row)
}
