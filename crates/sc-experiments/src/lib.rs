//! Experiment bookkeeping for simulator calibration: order-invariant
//! workflow-set identity, calibration caching and persistence.

pub mod cache;
pub mod experiment;
pub mod hash;
pub mod storage;
pub mod workflow_set;

pub use cache::*;
pub use experiment::*;
pub use hash::*;
pub use storage::*;
pub use workflow_set::*;
