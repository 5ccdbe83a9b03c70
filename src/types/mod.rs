//! Public types for the Heimdall API.

mod embedding;
mod endpoint;
mod kind;
mod retrieval;

pub use embedding::Embedding;
pub use endpoint::{EndpointClass, RequestContext};
pub use kind::CacheKind;
pub use retrieval::{QueryAnswer, RetrievedChunk};
