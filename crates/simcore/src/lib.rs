//! Shared simulation primitives: state types, errors, angle helpers and
//! mechanism integrators.

pub mod angle;
pub mod error;
pub mod integrators;
pub mod traits;

pub use angle::*;
pub use error::*;
pub use integrators::*;
pub use traits::*;
