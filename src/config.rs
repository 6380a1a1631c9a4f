use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::Compound;
use crate::error::{Error, Result};
use crate::model::DEFAULT_MIN_LAPS_PER_COMPOUND;
use crate::strategy::{PlannedStint, StintPlan, DEFAULT_PIT_LOSS_SECONDS};

/// Caller-supplied analysis settings. Every key is optional in the JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub min_laps_per_compound: usize,
    pub pit_loss_seconds: f64,
    pub strategies: BTreeMap<String, StintPlan>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_laps_per_compound: DEFAULT_MIN_LAPS_PER_COMPOUND,
            pit_loss_seconds: DEFAULT_PIT_LOSS_SECONDS,
            strategies: default_strategies(),
        }
    }
}

fn default_strategies() -> BTreeMap<String, StintPlan> {
    let plans: [(&str, &[(Compound, u32)]); 2] = [
        ("1-stop: S-H", &[(Compound::Soft, 15), (Compound::Hard, 35)]),
        (
            "2-stop: S-M-H",
            &[(Compound::Soft, 10), (Compound::Medium, 20), (Compound::Hard, 20)],
        ),
    ];
    plans
        .into_iter()
        .filter_map(|(name, stints)| {
            let stints = stints
                .iter()
                .map(|&(compound, laps)| PlannedStint { compound, laps })
                .collect();
            StintPlan::new(stints).ok().map(|plan| (name.to_string(), plan))
        })
        .collect()
}

impl AnalysisConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.pit_loss_seconds.is_finite() || self.pit_loss_seconds < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "pit_loss_seconds must be a non-negative number, got {}",
                self.pit_loss_seconds
            )));
        }
        Ok(())
    }
}
