pub mod clause;
pub mod compiler;
pub mod fields;
pub mod filter;
pub mod order;
pub mod params;
pub mod plan;

pub use clause::*;
pub use compiler::{compile, RequestCompiler, RequestTarget, Stage, Verified, MAX_LEVEL_DEPTH};
pub use params::{RawValue, RequestParams};
pub use plan::*;
