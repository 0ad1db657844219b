//! Elements, characteristic X-ray lines and regions of interest.
//!
//! Line energies and relative weights are not tabulated here. Callers populate
//! a [`LineTable`] from whatever physics database they trust (or from a TOML
//! file) and hand it to the fit.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::fit::ChannelInterval;

const SYMBOLS: [&str; 99] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf", "Es",
];

/// A chemical element identified by atomic number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Element(u8);

impl Element {
    pub fn from_atomic_number(z: u8) -> Option<Self> {
        if (1..=SYMBOLS.len() as u8).contains(&z) {
            Some(Self(z))
        } else {
            None
        }
    }

    pub fn atomic_number(&self) -> u8 {
        self.0
    }

    pub fn symbol(&self) -> &'static str {
        SYMBOLS[self.0 as usize - 1]
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Element {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        SYMBOLS
            .iter()
            .position(|sym| sym.eq_ignore_ascii_case(s))
            .map(|idx| Self(idx as u8 + 1))
            .ok_or_else(|| FitError::Parse(s.to_string()))
    }
}

impl TryFrom<String> for Element {
    type Error = FitError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Element> for String {
    fn from(value: Element) -> Self {
        value.symbol().to_string()
    }
}

/// Atomic shell family a transition fills
///
/// Ordered from highest to lowest characteristic energy for a given element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LineFamily {
    K,
    L,
    M,
    N,
}

impl fmt::Display for LineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::K => "K",
            Self::L => "L",
            Self::M => "M",
            Self::N => "N",
        };
        f.write_str(name)
    }
}

/// A characteristic X-ray transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XRayTransition {
    pub element: Element,
    pub family: LineFamily,
    /// Siegbahn or IUPAC label, e.g. `Ka1`
    pub name: String,
    pub energy_ev: f64,
    /// Relative line weight within the family (dominant line = 1.0)
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl XRayTransition {
    pub fn new(
        element: Element,
        family: LineFamily,
        name: impl Into<String>,
        energy_ev: f64,
        weight: f64,
    ) -> Self {
        Self {
            element,
            family,
            name: name.into(),
            energy_ev,
            weight,
        }
    }
}

/// The transitions of one element that share a region of interest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionSet {
    element: Element,
    transitions: Vec<XRayTransition>,
}

impl TransitionSet {
    pub fn new(element: Element, mut transitions: Vec<XRayTransition>) -> Self {
        transitions.sort_by(|a, b| a.energy_ev.total_cmp(&b.energy_ev));
        Self {
            element,
            transitions,
        }
    }

    pub fn element(&self) -> Element {
        self.element
    }

    pub fn transitions(&self) -> &[XRayTransition] {
        &self.transitions
    }

    /// The highest-weight transition in the set
    pub fn dominant(&self) -> Option<&XRayTransition> {
        self.transitions
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
    }

    /// Family of the dominant transition
    pub fn family(&self) -> Option<LineFamily> {
        self.dominant().map(|t| t.family)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transitions.iter().any(|t| t.name == name)
    }
}

impl fmt::Display for TransitionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.transitions.iter().map(|t| t.name.as_str()).collect();
        write!(f, "{} [{}]", self.element, names.join(", "))
    }
}

/// A channel range together with the transitions that fall inside it
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOfInterest {
    interval: ChannelInterval,
    transitions: Vec<XRayTransition>,
}

impl RegionOfInterest {
    pub fn new(interval: ChannelInterval, transitions: Vec<XRayTransition>) -> Self {
        Self {
            interval,
            transitions,
        }
    }

    pub fn interval(&self) -> ChannelInterval {
        self.interval
    }

    pub fn transitions(&self) -> &[XRayTransition] {
        &self.transitions
    }

    pub fn elements(&self) -> BTreeSet<Element> {
        self.transitions.iter().map(|t| t.element).collect()
    }

    /// The single element this ROI belongs to
    ///
    /// Fails when the transitions come from more (or fewer) than one element.
    pub fn element(&self) -> Result<Element> {
        let elements = self.elements();
        match elements.first() {
            Some(&element) if elements.len() == 1 => Ok(element),
            _ => Err(FitError::MultiElementRoi(elements.len())),
        }
    }

    pub fn transition_set(&self) -> Result<TransitionSet> {
        Ok(TransitionSet::new(self.element()?, self.transitions.clone()))
    }
}

/// Characteristic lines per element
///
/// # Example
/// ```
/// use filterfit::element::{Element, LineTable};
///
/// let table = LineTable::from_toml_str(r#"
///     [[line]]
///     element = "Fe"
///     family = "K"
///     name = "Ka1"
///     energy_ev = 6403.8
///     weight = 1.0
/// "#).unwrap();
/// let fe: Element = "Fe".parse().unwrap();
/// assert_eq!(table.transitions(fe).len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LineTable {
    lines: BTreeMap<Element, Vec<XRayTransition>>,
}

#[derive(Deserialize)]
struct LineTableFile {
    #[serde(default)]
    line: Vec<XRayTransition>,
}

impl LineTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: LineTableFile =
            toml::from_str(content).map_err(|e| FitError::Config(e.to_string()))?;
        Ok(file.line.into_iter().collect())
    }

    pub fn insert(&mut self, transition: XRayTransition) {
        let lines = self.lines.entry(transition.element).or_default();
        lines.push(transition);
        lines.sort_by(|a, b| a.energy_ev.total_cmp(&b.energy_ev));
    }

    pub fn transitions(&self, element: Element) -> &[XRayTransition] {
        self.lines.get(&element).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn elements(&self) -> impl Iterator<Item = Element> + '_ {
        self.lines.keys().copied()
    }
}

impl FromIterator<XRayTransition> for LineTable {
    fn from_iter<I: IntoIterator<Item = XRayTransition>>(iter: I) -> Self {
        let mut table = Self::new();
        for transition in iter {
            table.insert(transition);
        }
        table
    }
}
