//! SQL generation: identifiers come from the static entity schema only, values are bound as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
