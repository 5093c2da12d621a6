//! Scene scenarios for deterministic simulation.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// SIM-001: camera circles the globe over the demo scene
    GlobeOrbit,

    /// SIM-002: descent onto Prague through its LOD boundary
    PragueApproach,

    /// SIM-003: terrain arrives after the annotations were placed
    LateTerrain,

    /// SIM-004: hundreds of random labels competing for screen space
    LabelStorm,

    /// SIM-005: labels two pixels apart next to well-separated places
    CloseLabels,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::GlobeOrbit,
            ScenarioId::PragueApproach,
            ScenarioId::LateTerrain,
            ScenarioId::LabelStorm,
            ScenarioId::CloseLabels,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::GlobeOrbit => "globe_orbit",
            ScenarioId::PragueApproach => "prague_approach",
            ScenarioId::LateTerrain => "late_terrain",
            ScenarioId::LabelStorm => "label_storm",
            ScenarioId::CloseLabels => "close_labels",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::GlobeOrbit => "Orbit at 20,000 km; Prague stays gated out, survivors never overlap",
            ScenarioId::PragueApproach => "Descend 10,000 km -> 500 km over Prague; gate flips exactly at 2,000 km",
            ScenarioId::LateTerrain => "Paged terrain: degraded placements re-resolve once tiles land",
            ScenarioId::LabelStorm => "500 seeded labels, static camera; deterministic, flicker-free declutter",
            ScenarioId::CloseLabels => "New York and Chicago both shown; of two labels 2 px apart one survives",
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
            "globe_orbit" | "globeorbit" | "sim-001" => Ok(ScenarioId::GlobeOrbit),
            "prague_approach" | "pragueapproach" | "sim-002" => Ok(ScenarioId::PragueApproach),
            "late_terrain" | "lateterrain" | "sim-003" => Ok(ScenarioId::LateTerrain),
            "label_storm" | "labelstorm" | "sim-004" => Ok(ScenarioId::LabelStorm),
            "close_labels" | "closelabels" | "sim-005" => Ok(ScenarioId::CloseLabels),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
