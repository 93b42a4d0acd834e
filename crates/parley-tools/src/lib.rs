//! Parley tools crate - the retrieval tool set offered to the model.
//!
//! Five tools share one contract: each invocation produces a [`ToolOutcome`]
//! carrying either a payload or a tagged error, never a bare failure. The
//! [`ToolRegistry`] dispatches model-requested calls sequentially against a
//! [`SearchProvider`], which abstracts the concrete search and news APIs.

pub mod datetime;
pub mod freshness;
pub mod outcome;
pub mod providers;
pub mod registry;
pub mod schema;

pub use freshness::{augment_query, select_date_filter, DateFilter};
pub use outcome::ToolOutcome;
pub use providers::{ImageHit, MockSearchProvider, NewsItem, SearchProvider, SerpApiProvider, WebHit};
pub use registry::{ToolInvocation, ToolRegistry};
pub use schema::tool_schemas;
