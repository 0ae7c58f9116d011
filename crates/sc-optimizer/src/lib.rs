//! # sc-optimizer
//!
//! Search strategies for simulator calibration.
//!
//! Provides grid and random samplers over a calibration parameter space
//! (conditional gates included) and trial tracking for a search run.

mod search;
mod trial;

pub use search::{create_strategy, GridSearch, RandomSearch, SearchStrategy, StrategyKind};
pub use trial::{SearchId, SearchState, SearchStatus, StopReason, Trial, TrialResult, TrialStatus};
