//! Classification resolver.
//!
//! Maps a raw classifier label onto a [`WasteCategory`].  The membership
//! sets live in [`LabelSets`] (configuration data) so new labels can be
//! added without touching the lookup order below:
//!
//! ```text
//!  label ─▶ trim + lowercase ─▶ syringe? ─▶ hazardous? ─▶ non-hazardous?
//!                                   ─▶ equipment? ─▶ ambiguous? ─▶ empty/"none"? ─▶ Unrecognized
//! ```

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Closed set of categories an item can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WasteCategory {
    Syringe,
    Hazardous,
    NonHazardous,
    Equipment,
    /// Needs an operator used/unused decision before it can be routed.
    AmbiguousCotton,
    Unrecognized,
    None,
}

impl WasteCategory {
    /// Categories that map onto an actuator command.
    pub fn is_dispatchable(self) -> bool {
        matches!(
            self,
            Self::Syringe | Self::Hazardous | Self::NonHazardous | Self::Equipment
        )
    }

    /// Label of the operator's action button for this category.
    pub fn action_label(self) -> &'static str {
        match self {
            Self::Syringe => "THROW SYRINGE",
            Self::Hazardous => "THROW HAZARDOUS WASTE",
            Self::NonHazardous => "THROW NON-HAZARDOUS WASTE",
            Self::Equipment => "STERILIZE EQUIPMENTS",
            Self::AmbiguousCotton => "CHOOSE USED / UNUSED",
            Self::Unrecognized => "THROW OTHER WASTE",
            Self::None => "Waiting for Detection...",
        }
    }

    /// Short human-readable name used in status text.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Syringe => "Syringe",
            Self::Hazardous => "Hazardous waste",
            Self::NonHazardous => "Non-hazardous waste",
            Self::Equipment => "Equipment",
            Self::AmbiguousCotton => "Cotton",
            Self::Unrecognized => "Unrecognized waste",
            Self::None => "No waste",
        }
    }
}

/// Operator answer for an ambiguous (cotton) item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disambiguation {
    Used,
    Unused,
}

impl Disambiguation {
    pub fn resolve(self) -> WasteCategory {
        match self {
            Self::Used => WasteCategory::Hazardous,
            Self::Unused => WasteCategory::NonHazardous,
        }
    }
}

/// Label membership data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSets {
    pub syringe: String,
    pub hazardous: Vec<String>,
    pub non_hazardous: Vec<String>,
    pub equipment: Vec<String>,
    /// Label that forces the disambiguation prompt.
    pub ambiguous: String,
}

impl Default for LabelSets {
    fn default() -> Self {
        fn owned(labels: &[&str]) -> Vec<String> {
            labels.iter().map(|s| (*s).to_string()).collect()
        }
        Self {
            syringe: "syringe".into(),
            hazardous: owned(&["gauze pad", "gauze", "gloves", "disposable-mask"]),
            non_hazardous: owned(&["bandage", "head-cap"]),
            equipment: owned(&["scissor", "stethoscope", "sphygmomanometer"]),
            ambiguous: "cotton".into(),
        }
    }
}

impl LabelSets {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if normalize(&self.syringe).is_empty() {
            return Err(ConfigError::ValidationFailed("labels.syringe is empty"));
        }
        if normalize(&self.ambiguous).is_empty() {
            return Err(ConfigError::ValidationFailed("labels.ambiguous is empty"));
        }
        let all = self
            .hazardous
            .iter()
            .chain(&self.non_hazardous)
            .chain(&self.equipment);
        for label in all {
            if normalize(label).is_empty() {
                return Err(ConfigError::ValidationFailed("empty label in category set"));
            }
        }
        Ok(())
    }
}

/// Resolve a raw label.  `None` (missing field) is treated like an empty label.
pub fn classify(label: Option<&str>, sets: &LabelSets) -> WasteCategory {
    let label = normalize(label.unwrap_or_default());
    let in_set = |set: &[String]| set.iter().any(|entry| normalize(entry) == label);

    if label == normalize(&sets.syringe) {
        WasteCategory::Syringe
    } else if in_set(&sets.hazardous) {
        WasteCategory::Hazardous
    } else if in_set(&sets.non_hazardous) {
        WasteCategory::NonHazardous
    } else if in_set(&sets.equipment) {
        WasteCategory::Equipment
    } else if label == normalize(&sets.ambiguous) {
        WasteCategory::AmbiguousCotton
    } else if label.is_empty() || label == "none" {
        WasteCategory::None
    } else {
        WasteCategory::Unrecognized
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}
