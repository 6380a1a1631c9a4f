//! Tyre stint analysis for race sessions: clean lap records, split them into
//! stints, fit per-compound linear degradation models and rank pit-stop
//! strategies by simulated race time.

pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod stint;
pub mod strategy;

pub use config::AnalysisConfig;
pub use data::{clean, load_laps, read_laps, Compound, LapRecord};
pub use error::{Error, Result};
pub use model::{
    build_compound_models, ensure_all_compounds, evaluate_accuracy, fit_stint, CompoundAccuracy,
    CompoundModels, DegradationModel,
};
pub use stint::{segment, summarize, SegmentedLap, StintSummary};
pub use strategy::{
    compare, simulate_stint, simulate_strategy, PlannedStint, StintPlan, StrategyResult,
};
