use caseformat::{Branch, Bus, Gen, GenCost};

/// Case is a MATPOWER case that models a power system as a directed graph
/// structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    /// Name from the `function mpc = <name>` line, if any.
    pub name: String,

    /// System MVA base used for converting power into per-unit quantities.
    /// Default value is 100.
    pub base_mva: f64,

    /// Power system nodes, including static loads and shunts.
    pub bus: Vec<Bus>,

    /// Generators and dispatchable loads.
    pub gen: Vec<Gen>,

    /// Generator cost functions, aligned by position with `gen`.
    pub gencost: Vec<GenCost>,

    /// Transmission lines/cables and transformers.
    pub branch: Vec<Branch>,

    /// Display names aligned by position with `bus`. May be shorter.
    pub bus_name: Vec<String>,
}

impl Default for Case {
    fn default() -> Self {
        Self {
            name: String::default(),
            base_mva: 100.0,
            bus: Vec::default(),
            gen: Vec::default(),
            gencost: Vec::default(),
            branch: Vec::default(),
            bus_name: Vec::default(),
        }
    }
}

impl Case {
    /// Returns the display name of the i-th bus, falling back to
    /// "Bus {bus_i}" where the name list runs short.
    pub fn bus_name(&self, i: usize) -> String {
        match self.bus_name.get(i) {
            Some(name) => name.clone(),
            None => match self.bus.get(i) {
                Some(b) => format!("Bus {}", b.bus_i),
                None => format!("Bus {}", i + 1),
            },
        }
    }

    pub fn find_bus(&self, bus_i: usize) -> Option<&Bus> {
        self.bus.iter().find(|b| b.bus_i == bus_i)
    }

    pub fn find_bus_mut(&mut self, bus_i: usize) -> Option<&mut Bus> {
        self.bus.iter_mut().find(|b| b.bus_i == bus_i)
    }
}
