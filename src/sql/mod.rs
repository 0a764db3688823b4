//! Reference PostgreSQL rendering of compiled plans: identifiers from the catalog only,
//! values as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
