use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::Compound;
use crate::error::{Error, Result};
use crate::model::{CompoundModels, DegradationModel};

pub const DEFAULT_PIT_LOSS_SECONDS: f64 = 22.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedStint {
    pub compound: Compound,
    pub laps: u32,
}

/// Ordered stints of a hypothetical race. Never empty, and every stint runs
/// at least one lap.
///
/// Serialized as a list of `[compound, laps]` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(Compound, u32)>", into = "Vec<(Compound, u32)>")]
pub struct StintPlan {
    stints: Vec<PlannedStint>,
}

impl StintPlan {
    pub fn new(stints: Vec<PlannedStint>) -> Result<Self> {
        if stints.is_empty() {
            return Err(Error::InvalidStintPlan("plan has no stints".to_string()));
        }
        if let Some(idx) = stints.iter().position(|s| s.laps == 0) {
            return Err(Error::InvalidStintPlan(format!(
                "stint {} runs zero laps",
                idx + 1
            )));
        }
        Ok(Self { stints })
    }

    pub fn stints(&self) -> &[PlannedStint] {
        &self.stints
    }

    pub fn total_laps(&self) -> u64 {
        self.stints.iter().map(|s| u64::from(s.laps)).sum()
    }

    pub fn pit_stops(&self) -> usize {
        self.stints.len() - 1
    }
}

impl TryFrom<Vec<(Compound, u32)>> for StintPlan {
    type Error = Error;

    fn try_from(pairs: Vec<(Compound, u32)>) -> Result<Self> {
        StintPlan::new(
            pairs
                .into_iter()
                .map(|(compound, laps)| PlannedStint { compound, laps })
                .collect(),
        )
    }
}

impl From<StintPlan> for Vec<(Compound, u32)> {
    fn from(plan: StintPlan) -> Self {
        plan.stints.into_iter().map(|s| (s.compound, s.laps)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyResult {
    pub strategy_name: String,
    pub total_time_seconds: f64,
    pub delta_to_best_seconds: f64,
}

/// Total time of `num_laps` laps on fresh tyres, summed lap by lap.
pub fn simulate_stint(model: &DegradationModel, num_laps: u32) -> f64 {
    (1..=num_laps).map(|lap| model.predict(lap)).sum()
}

/// Race time of a plan: every stint simulated on its compound's model, plus
/// `pit_loss_seconds` for each stop between stints.
pub fn simulate_strategy(
    plan: &StintPlan,
    models: &CompoundModels,
    pit_loss_seconds: f64,
) -> Result<f64> {
    let mut total = 0.0;
    for stint in plan.stints() {
        let model = models
            .get(&stint.compound)
            .ok_or(Error::UnknownCompound(stint.compound))?;
        total += simulate_stint(model, stint.laps);
    }
    Ok(total + plan.pit_stops() as f64 * pit_loss_seconds)
}

/// Simulates every named plan and ranks them fastest first.
///
/// One failing plan fails the whole comparison. Equal totals keep the
/// mapping's name order.
pub fn compare(
    strategies: &BTreeMap<String, StintPlan>,
    models: &CompoundModels,
    pit_loss_seconds: f64,
) -> Result<Vec<StrategyResult>> {
    let mut results = strategies
        .iter()
        .map(|(name, plan)| -> Result<StrategyResult> {
            let total = simulate_strategy(plan, models, pit_loss_seconds).map_err(|e| {
                Error::Strategy {
                    name: name.clone(),
                    source: Box::new(e),
                }
            })?;
            debug!(strategy = %name, stops = plan.pit_stops(), total, "simulated strategy");
            Ok(StrategyResult {
                strategy_name: name.clone(),
                total_time_seconds: total,
                delta_to_best_seconds: 0.0,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    results.sort_by(|a, b| a.total_time_seconds.total_cmp(&b.total_time_seconds));
    if let Some(best) = results.first().map(|r| r.total_time_seconds) {
        for r in &mut results {
            r.delta_to_best_seconds = r.total_time_seconds - best;
        }
    }
    Ok(results)
}
