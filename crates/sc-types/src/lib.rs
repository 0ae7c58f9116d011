pub mod calibration;
pub mod errors;
pub mod parameter;
pub mod range;
pub mod realized;

pub use calibration::*;
pub use errors::*;
pub use parameter::*;
pub use range::*;
pub use realized::*;
