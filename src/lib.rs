//! Turbase query: compiles untrusted REST query parameters into validated, depth-bounded
//! query plans for a geo-tagged resource catalog.

pub mod case;
pub mod config;
pub mod error;
pub mod query;
pub mod sql;

pub use config::{load_from_file, load_from_pool, resolve, FullConfig, ResourceCatalog, CONFIG_TABLE};
pub use error::{AppError, ConfigError, RequestError, RequestErrorKind};
pub use query::{compile, QueryPlan, RequestCompiler, RequestParams, RequestTarget};
pub use sql::{select, select_by_id, PgBindValue, QueryBuf};
