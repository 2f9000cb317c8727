//! Seal identifier to reference-asset mapping.

use crate::util::{SealMatchError, SealMatchResult};
use std::str::FromStr;

/// Regulatory hazard class of a pictogram.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HazardCategory {
    Physical,
    Health,
    Environmental,
}

impl HazardCategory {
    /// Lower-case name used in listings.
    pub fn as_str(self) -> &'static str {
        match self {
            HazardCategory::Physical => "physical",
            HazardCategory::Health => "health",
            HazardCategory::Environmental => "environmental",
        }
    }
}

impl FromStr for HazardCategory {
    type Err = SealMatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "physical" => Ok(HazardCategory::Physical),
            "health" => Ok(HazardCategory::Health),
            "environmental" => Ok(HazardCategory::Environmental),
            _ => Err(SealMatchError::InvalidInput("unknown hazard category")),
        }
    }
}

/// One catalog entry.
#[derive(Clone, Debug, PartialEq)]
pub struct SealSpec {
    /// Upper-case identifier, e.g. `GHS05`.
    pub id: String,
    /// Reference image filename inside the template directory.
    pub file: String,
    /// Human-readable name.
    pub name: String,
    /// Short description of the hazard class.
    pub description: String,
    /// Hazard class; `None` for custom entries that do not declare one.
    pub category: Option<HazardCategory>,
}

impl SealSpec {
    /// Creates an entry with display metadata derived from the id.
    pub fn new(id: &str, file: &str) -> Self {
        let id = id.to_uppercase();
        Self {
            name: id.clone(),
            id,
            file: file.to_string(),
            description: String::new(),
            category: None,
        }
    }

    /// Sets the hazard class.
    pub fn with_category(mut self, category: HazardCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// Ordered set of known seals.
#[derive(Clone, Debug, PartialEq)]
pub struct SealCatalog {
    entries: Vec<SealSpec>,
}

const GHS: [(&str, &str, &str, &str, HazardCategory); 9] = [
    (
        "GHS01",
        "explosive.png",
        "Explosive",
        "Explosive substances and articles",
        HazardCategory::Physical,
    ),
    (
        "GHS02",
        "flammable.png",
        "Flammable",
        "Flammable gases, aerosols, liquids, and solids",
        HazardCategory::Physical,
    ),
    (
        "GHS03",
        "oxidising.png",
        "Oxidizing",
        "Oxidizing gases, liquids, and solids",
        HazardCategory::Physical,
    ),
    (
        "GHS04",
        "gas-under-pressure.png",
        "Compressed Gas",
        "Gases under pressure",
        HazardCategory::Physical,
    ),
    (
        "GHS05",
        "corrosive.png",
        "Corrosive",
        "Corrosive to metals and skin corrosion",
        HazardCategory::Physical,
    ),
    (
        "GHS06",
        "acute-toxicity.png",
        "Toxic",
        "Acute toxicity (fatal or toxic)",
        HazardCategory::Health,
    ),
    (
        "GHS07",
        "health-hazard.png",
        "Harmful/Irritant",
        "Harmful if swallowed, skin irritation, eye irritation",
        HazardCategory::Health,
    ),
    (
        "GHS08",
        "serious-health-hazard.png",
        "Health Hazard",
        "Respiratory sensitization, carcinogenicity, reproductive toxicity",
        HazardCategory::Health,
    ),
    (
        "GHS09",
        "hazardous-to-environment.png",
        "Environmental Hazard",
        "Hazardous to the aquatic environment",
        HazardCategory::Environmental,
    ),
];

impl SealCatalog {
    /// Creates a catalog; ids are upper-cased and must be unique.
    pub fn new(entries: Vec<SealSpec>) -> SealMatchResult<Self> {
        let mut entries = entries;
        for entry in &mut entries {
            entry.id = entry.id.to_uppercase();
            if entry.id.is_empty() || entry.file.is_empty() {
                return Err(SealMatchError::InvalidInput(
                    "catalog entries need an id and a file",
                ));
            }
        }
        for (idx, entry) in entries.iter().enumerate() {
            if entries[..idx].iter().any(|prev| prev.id == entry.id) {
                return Err(SealMatchError::InvalidInput("duplicate seal id in catalog"));
            }
        }
        Ok(Self { entries })
    }

    /// Creates a catalog from `(id, file)` pairs.
    pub fn from_pairs<I, S, F>(pairs: I) -> SealMatchResult<Self>
    where
        I: IntoIterator<Item = (S, F)>,
        S: AsRef<str>,
        F: AsRef<str>,
    {
        let entries = pairs
            .into_iter()
            .map(|(id, file)| SealSpec::new(id.as_ref(), file.as_ref()))
            .collect();
        Self::new(entries)
    }

    /// The nine GHS pictograms GHS01 to GHS09.
    pub fn ghs() -> Self {
        let entries = GHS
            .iter()
            .map(|&(id, file, name, description, category)| SealSpec {
                id: id.to_string(),
                file: file.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                category: Some(category),
            })
            .collect();
        Self { entries }
    }

    /// Looks up an entry by its upper-cased `id`.
    ///
    /// No other normalization is applied, so surrounding whitespace makes
    /// the id unknown.
    pub fn get(&self, id: &str) -> Option<&SealSpec> {
        let id = id.to_uppercase();
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Iterates entries in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &SealSpec> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the ids in catalog order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.id.as_str()).collect()
    }
}

impl Default for SealCatalog {
    fn default() -> Self {
        Self::ghs()
    }
}
