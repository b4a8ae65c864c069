/*!
# Geoapi-rs

A client for geo-data web services that turns request descriptions into rate-limited,
retried HTTP calls and hands the outcome back as a blocking, async or callback result.

## Overview

Every request goes through the same pipeline: it is queued with an admission scheduler
that enforces a global queries-per-second ceiling and a minimum spacing between sends,
executed by a transport, classified by a decoder, and retried with jittered exponential
backoff while the failure is transient and the retry budget allows.

## Key Components

* **GeoApiClient**: The facade that owns the scheduler, the transport and the retry defaults
* **AdmissionScheduler**: A single coordinator task that paces sends across all callers
* **RetryEngine**: Drives one logical request through attempts until a terminal outcome
* **PendingResult**: The handle returned to callers, consumed by blocking wait, async wait or callback
* **Transport**: A trait for executing one attempt; `HttpTransport` is the reqwest-backed default
* **Decoder**: A trait that classifies a raw response as success, retryable or terminal

## Usage Example

```rust,no_run
use geoapi_rs::{GeoApiClient, RequestDescriptor};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    results: Vec<Value>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = GeoApiClient::builder()
        .api_key("AIza...")
        .query_rate_limit(20)
        .retry_timeout(Duration::from_secs(30))
        .build()?;

    let request = RequestDescriptor::get("/maps/api/geocode/json")
        .param("address", "1600 Amphitheatre Parkway, Mountain View, CA");

    let response: GeocodingResponse = client.get(request).wait().await?;
    println!("Found {} results", response.results.len());

    client.shutdown().await;
    Ok(())
}
```

## Error Handling

Failures are reported through [`ApiError`], which separates application errors
reported by the service from transport I/O failures and from cancellation:

```rust,no_run
use geoapi_rs::{ApiError, GeoApiClient, RequestDescriptor};
use serde_json::Value;

# async fn run(client: GeoApiClient) {
let pending = client.get::<Value>(RequestDescriptor::get("/maps/api/timezone/json"));
match pending.wait().await {
    Ok(body) => println!("{body}"),
    Err(ApiError::Api { status, message }) => println!("Rejected: {status} {message:?}"),
    Err(e) if e.is_io() => println!("Network trouble: {e}"),
    Err(e) if e.is_cancelled() => println!("Stopped: {e}"),
    Err(e) => println!("Failed: {e}"),
}
# }
```

## Callbacks and Cancellation

```rust,no_run
use geoapi_rs::{GeoApiClient, RequestDescriptor};
use serde_json::Value;

# fn run(client: GeoApiClient) -> geoapi_rs::Result<()> {
let pending = client.get::<Value>(RequestDescriptor::get("/maps/api/elevation/json"));
let cancel = pending.cancel_handle();
pending.set_callback(
    |body| println!("elevation: {body}"),
    |err| eprintln!("elevation failed: {err}"),
)?;
cancel.cancel();
# Ok(())
# }
```
*/

pub mod engine;

// Re-export all public APIs for easier access
pub use engine::error::{ApiError, Result};
pub use engine::{
    AdmissionScheduler, CancelHandle, ClientConfig, Decoder, GeoApiClient, GeoApiClientBuilder,
    HttpMethod, HttpTransport, JsonDecoder, Outcome, PendingResult, RateLimit, RawResponse,
    RequestDescriptor, RetryConfig, ShutdownPolicy, Transport, TransportError,
};
