pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod executor;
pub mod http;
pub mod pending;
pub mod retry;
pub mod scheduler;
pub mod transport;

// Re-export key types for easier access
pub use client::{GeoApiClient, GeoApiClientBuilder};
pub use config::ClientConfig;
pub use decode::{Decoder, JsonDecoder, Outcome};
pub use error::{ApiError, Result};
pub use executor::RetryEngine;
pub use http::{HttpTransport, HttpTransportConfig};
pub use pending::{CancelHandle, PendingResult};
pub use retry::{RetryConfig, RetryState};
pub use scheduler::{AdmissionScheduler, RateLimit, SchedulerStats, ShutdownPolicy};
pub use transport::{HttpMethod, RawResponse, RequestDescriptor, Transport, TransportError};
