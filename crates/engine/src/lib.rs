//! Everything that talks to the fabric binary: process supervision,
//! health probing, the REST catalog endpoints, and the streaming
//! transports that carry a single pattern run.

pub mod api;
pub mod decode;
pub mod filter;
pub mod health;
pub mod models;
pub mod sse;
pub mod supervisor;
pub mod transport;

pub use api::{EngineApi, PatternListing};
pub use decode::Utf8StreamDecoder;
pub use filter::LineFilterPipeline;
pub use health::HealthMonitor;
pub use models::ModelCatalog;
pub use supervisor::{EngineSupervisor, StartError, SupervisorConfig, SupervisorState};
pub use transport::{EngineTransport, HttpTransport, StdioTransport, TransportRequest};
