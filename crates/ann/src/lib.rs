//! # Context ANN
//!
//! Adaptive dispatch over interchangeable approximate-nearest-neighbor backends.
//!
//! ```text
//! ┌──────────────────┐    ┌────────────────────┐    ┌──────────────┐
//! │ ProviderRegistry │───▶│  ProviderRuntime   │───▶│  AnnDispatch │
//! │  (AnnProvider)   │    │ health · preflight │    │ backend+hits │
//! └──────────────────┘    │ backoff · ordering │    └──────────────┘
//!                         └────────────────────┘
//! ```
//!
//! Failures put a backend into exponential cooldown, preflight probes are
//! cached for a TTL, and the backend order is re-sorted by observed health
//! once any signal exists.

mod config;
mod error;
mod provider;
mod runtime;
mod signal;

pub use config::ProviderRuntimeConfig;
pub use error::{AnnError, Result};
pub use provider::{AnnHit, AnnProvider, AnnQuery, PreflightRequest, ProviderRegistry};
pub use runtime::{
    AnnDispatch, AttemptOutcome, DispatchAttempt, ProviderHealth, ProviderModeState,
    ProviderRuntime,
};
pub use signal::AbortSignal;
