use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::data::{Compound, LapRecord};
use crate::error::{Error, Result};
use crate::stint::SegmentedLap;

pub const DEFAULT_MIN_LAPS_PER_COMPOUND: usize = 10;

/// Compounds every strategy may ask for.
pub const CANONICAL_COMPOUNDS: [Compound; 3] = [Compound::Soft, Compound::Medium, Compound::Hard];

/// Order in which fitted models stand in for a missing canonical compound.
pub const FALLBACK_PRIORITY: [Compound; 3] = [Compound::Hard, Compound::Medium, Compound::Soft];

/// Linear tyre degradation: `lap_time = base_time + slope * lap_in_stint`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradationModel {
    base_time: f64,
    slope: f64,
    sample_count: usize,
}

/// Fitted models keyed by compound. Fallback entries share the instance of
/// the model they stand in for.
pub type CompoundModels = BTreeMap<Compound, Arc<DegradationModel>>;

impl DegradationModel {
    pub fn from_parameters(base_time: f64, slope: f64) -> Self {
        Self {
            base_time,
            slope,
            sample_count: 0,
        }
    }

    /// Intercept, in seconds.
    pub fn base_time(&self) -> f64 {
        self.base_time
    }

    /// Seconds lost per lap of tyre age.
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// Number of laps the model was fitted on.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Predicted lap time in seconds for the given 1-based lap of a stint.
    /// Lap indices past anything observed are extrapolated.
    pub fn predict(&self, lap_in_stint: u32) -> f64 {
        self.base_time + self.slope * f64::from(lap_in_stint)
    }

    fn fit(samples: &[(u32, f64)]) -> Result<Self> {
        let (base_time, slope) = fit_line(samples)?;
        Ok(Self {
            base_time,
            slope,
            sample_count: samples.len(),
        })
    }
}

// ordinary least squares of seconds on lap_in_stint; returns (intercept, slope)
fn fit_line(samples: &[(u32, f64)]) -> Result<(f64, f64)> {
    let Some(&(first_x, _)) = samples.first() else {
        return Err(Error::InsufficientData("no laps to fit".to_string()));
    };

    // a single x value has no slope to estimate; least squares settles on
    // the mean with a flat line
    if samples.iter().all(|&(x, _)| x == first_x) {
        let mean = samples.iter().map(|&(_, y)| y).sum::<f64>() / samples.len() as f64;
        return Ok((mean, 0.0));
    }

    let feats: Vec<f64> = samples.iter().map(|&(x, _)| f64::from(x)).collect();
    let targets: Vec<f64> = samples.iter().map(|&(_, y)| y).collect();

    let x = Array2::from_shape_vec((samples.len(), 1), feats)
        .map_err(|e| Error::Regression(e.to_string()))?;
    let y = Array1::from_vec(targets);
    let ds = Dataset::new(x, y);

    let fitted = LinearRegression::new()
        .fit(&ds)
        .map_err(|e| Error::Regression(e.to_string()))?;
    Ok((fitted.intercept(), fitted.params()[0]))
}

// (lap_in_stint, seconds) per compound. Position is measured from the first
// lap of the lap's own (driver, stint) group among laps of that compound.
fn samples_by_compound(laps: &[SegmentedLap]) -> BTreeMap<Compound, Vec<(u32, f64)>> {
    let mut first_lap: HashMap<(Compound, &str, u32), u32> = HashMap::new();
    for s in laps {
        if let Some(compound) = s.lap.compound {
            first_lap
                .entry((compound, s.lap.driver.as_str(), s.stint_id))
                .and_modify(|n| *n = (*n).min(s.lap.lap_number))
                .or_insert(s.lap.lap_number);
        }
    }

    let mut samples: BTreeMap<Compound, Vec<(u32, f64)>> = BTreeMap::new();
    for s in laps {
        let (Some(compound), Some(secs)) = (s.lap.compound, s.lap.lap_time_secs()) else {
            continue;
        };
        let start = first_lap[&(compound, s.lap.driver.as_str(), s.stint_id)];
        samples
            .entry(compound)
            .or_default()
            .push((s.lap.lap_number - start + 1, secs));
    }
    samples
}

/// Fits one model per compound from laps pooled across drivers and stints.
///
/// Laps without a compound or a lap time are ignored. Compounds with fewer
/// than `min_laps_per_compound` laps are skipped, so the returned mapping may
/// lack entries; see [`ensure_all_compounds`].
pub fn build_compound_models(
    laps: &[SegmentedLap],
    min_laps_per_compound: usize,
) -> Result<CompoundModels> {
    let mut models = CompoundModels::new();
    for (compound, samples) in samples_by_compound(laps) {
        if samples.len() < min_laps_per_compound {
            debug!(
                %compound,
                laps = samples.len(),
                min = min_laps_per_compound,
                "skipping compound with too few laps"
            );
            continue;
        }

        let model = DegradationModel::fit(&samples)?;
        info!(
            %compound,
            laps = model.sample_count,
            base_time = model.base_time,
            slope = model.slope,
            "fitted degradation model"
        );
        models.insert(compound, Arc::new(model));
    }
    Ok(models)
}

/// Fills in any missing canonical compound with the first available model
/// from [`FALLBACK_PRIORITY`]. When none of them was fitted the mapping is
/// returned unchanged.
pub fn ensure_all_compounds(models: CompoundModels) -> CompoundModels {
    let Some((proxy, proxy_model)) = FALLBACK_PRIORITY
        .iter()
        .find_map(|c| models.get(c).map(|m| (*c, Arc::clone(m))))
    else {
        warn!("no canonical compound has a model; nothing to substitute");
        return models;
    };

    let mut completed = models;
    for compound in CANONICAL_COMPOUNDS {
        if !completed.contains_key(&compound) {
            warn!(%compound, %proxy, "no model fitted; using proxy model");
            completed.insert(compound, Arc::clone(&proxy_model));
        }
    }
    completed
}

/// Fits a model to the laps of a single stint. Positions are counted from the
/// lowest lap number in `laps`; untimed laps are ignored.
pub fn fit_stint(laps: &[LapRecord]) -> Result<DegradationModel> {
    let start = laps
        .iter()
        .map(|l| l.lap_number)
        .min()
        .ok_or_else(|| Error::InsufficientData("stint has no laps".to_string()))?;

    let samples: Vec<(u32, f64)> = laps
        .iter()
        .filter_map(|l| l.lap_time_secs().map(|t| (l.lap_number - start + 1, t)))
        .collect();
    DegradationModel::fit(&samples)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundAccuracy {
    pub compound: Compound,
    pub mean_abs_error_seconds: f64,
    pub lap_count: usize,
}

/// Mean absolute error of each compound's model against the observed laps of
/// that compound. Compounds without laps or without a model are left out.
pub fn evaluate_accuracy(models: &CompoundModels, laps: &[SegmentedLap]) -> Vec<CompoundAccuracy> {
    samples_by_compound(laps)
        .into_iter()
        .filter_map(|(compound, samples)| {
            let model = models.get(&compound)?;
            let total: f64 = samples
                .iter()
                .map(|&(x, y)| (model.predict(x) - y).abs())
                .sum();
            Some(CompoundAccuracy {
                compound,
                mean_abs_error_seconds: total / samples.len() as f64,
                lap_count: samples.len(),
            })
        })
        .collect()
}
