//! Stint segmentation and per-stint summaries.
//!
//! A stint is a maximal run of one driver's laps, ordered by lap number, on a
//! single compound and not interrupted by a pit entry.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::data::{Compound, LapRecord};

/// A lap annotated with the stint it belongs to. Stint ids start at 1 for
/// every driver.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedLap {
    pub lap: LapRecord,
    pub stint_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StintSummary {
    pub driver_id: String,
    pub stint_id: u32,
    #[serde(serialize_with = "serialize_secs")]
    pub avg_lap_time: Option<Duration>,
    pub compound: Option<Compound>,
    pub start_lap: u32,
    pub end_lap: u32,
    pub lap_count: usize,
}

fn serialize_secs<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => s.serialize_some(&d.as_secs_f64()),
        None => s.serialize_none(),
    }
}

/// Splits laps into stints per driver.
///
/// Output is ordered by driver, then lap number. A new stint starts when the
/// compound differs from the current one or the lap carries a pit-in time.
/// After [`crate::data::clean`] no lap has a pit-in time, so only compound
/// changes split stints in the normal pipeline; the pit-in check is kept for
/// callers that pass uncleaned laps.
pub fn segment(laps: &[LapRecord]) -> Vec<SegmentedLap> {
    let mut by_driver: BTreeMap<&str, Vec<&LapRecord>> = BTreeMap::new();
    for lap in laps {
        by_driver.entry(lap.driver.as_str()).or_default().push(lap);
    }

    let mut segmented = Vec::with_capacity(laps.len());
    for (driver, mut driver_laps) in by_driver {
        driver_laps.sort_by_key(|lap| lap.lap_number);

        // (current compound, current stint id) threaded through the walk
        let (_, annotated) = driver_laps.into_iter().fold(
            (None::<(Option<Compound>, u32)>, Vec::new()),
            |(state, mut out), lap| {
                let (compound, stint_id) = match state {
                    None => (lap.compound, 1),
                    Some((current, id))
                        if lap.compound != current || lap.pit_in_time.is_some() =>
                    {
                        (lap.compound, id + 1)
                    }
                    Some(current) => current,
                };
                out.push(SegmentedLap {
                    lap: lap.clone(),
                    stint_id,
                });
                (Some((compound, stint_id)), out)
            },
        );

        debug!(
            driver,
            stints = annotated.last().map_or(0, |l| l.stint_id),
            "segmented driver laps"
        );
        segmented.extend(annotated);
    }
    segmented
}

/// Aggregates each (driver, stint) group. Rows come out ordered by driver
/// then stint id.
pub fn summarize(laps: &[SegmentedLap]) -> Vec<StintSummary> {
    let mut groups: BTreeMap<(&str, u32), Vec<&LapRecord>> = BTreeMap::new();
    for s in laps {
        groups
            .entry((s.lap.driver.as_str(), s.stint_id))
            .or_default()
            .push(&s.lap);
    }

    groups
        .into_iter()
        .map(|((driver, stint_id), mut group)| {
            group.sort_by_key(|lap| lap.lap_number);

            let times: Vec<f64> = group.iter().filter_map(|l| l.lap_time_secs()).collect();
            let avg_lap_time = if times.is_empty() {
                None
            } else {
                Some(Duration::from_secs_f64(
                    times.iter().sum::<f64>() / times.len() as f64,
                ))
            };

            StintSummary {
                driver_id: driver.to_string(),
                stint_id,
                avg_lap_time,
                compound: group.iter().find_map(|l| l.compound),
                // groups are never empty
                start_lap: group.first().map_or(0, |l| l.lap_number),
                end_lap: group.last().map_or(0, |l| l.lap_number),
                lap_count: group.len(),
            }
        })
        .collect()
}

pub fn laps_for_driver<'a>(
    laps: &'a [SegmentedLap],
    driver: &'a str,
) -> impl Iterator<Item = &'a SegmentedLap> {
    laps.iter().filter(move |s| s.lap.driver == driver)
}

pub fn summaries_for_driver<'a>(
    summaries: &'a [StintSummary],
    driver: &'a str,
) -> impl Iterator<Item = &'a StintSummary> {
    summaries.iter().filter(move |s| s.driver_id == driver)
}
