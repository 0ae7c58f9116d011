//! Parameter-space derivation for simulator calibration.
//!
//! [`CalibrationRangeTable`] indexes the calibration-ranges document,
//! [`ParameterSpaceBuilder`] derives the flat search space from a simulator
//! configuration template, and [`ConfigCodec`] maps optimizer samples to
//! realized configurations and back.

pub mod builder;
pub mod codec;
pub mod ranges;
pub mod schema;

pub use builder::{
    build_space, numeric_kind, ParameterSpaceBuilder, SpaceDefinition, REFERENCE_FLOPS_KEY,
    SCHEDULING_OVERHEAD_KEY, WORKFLOW_FILE_KEY, WORKFLOW_KEY,
};
pub use codec::{decode_spec, leaf_key, ConfigCodec};
pub use ranges::{semantic_key, CalibrationRangeTable, PAYLOAD_KEY};
pub use schema::{active_schemes, is_conditional_key, SchemaNode, SchemaTree, SchemeSelection};
