//! Built-in scenarios.

use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// Random walkers on a periodic shared grid: migration and buffer sync
    Wanderers,

    /// A rumor spreading over a shared network: requests, complementary
    /// edges and state sync
    Rumor,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![ScenarioId::Wanderers, ScenarioId::Rumor]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Wanderers => "wanderers",
            ScenarioId::Rumor => "rumor",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Wanderers => {
                "Walkers step across partition borders; ownership and halos must stay exact"
            }
            ScenarioId::Rumor => {
                "Gossip over cross-rank edges; every ghost must carry its owner's state"
            }
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wanderers" | "walkers" | "grid" => Ok(ScenarioId::Wanderers),
            "rumor" | "rumour" | "network" => Ok(ScenarioId::Rumor),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("GRID".parse::<ScenarioId>(), Ok(ScenarioId::Wanderers));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
