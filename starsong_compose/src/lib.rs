// Starsong compose orchestrator.
//
// Turns a compose request (sandbox controls or overlay chart parameters)
// into a response carrying the control surface, the astro echo, the
// calibrated and strict gate verdicts, a seed-derived audio URL, the
// explainer text and the artifact versions. Intermediate products (piece,
// rendered audio, features, finalize report, content hashes) are returned
// alongside for callers that persist or inspect them.
//
// Architecture:
// - config.rs: `ComposeConfig` (duration, sample rate, artifact versions,
//   gate policy), loaded from JSON
// - context.rs: `ComposeContext`, the immutable shared state for requests
// - request.rs: Wire types for requests and responses
// - upstream.rs: Ephemeris and vector-model traits with neutral fallbacks
// - pipeline.rs: `compose()` / `compose_at()`, the staged pipeline
// - hashing.rs: SHA-256 content hashes and the normalized response hash
// - error.rs: Startup (`ConfigError`) and per-request (`ComposeError`) errors
//
// Output is a pure function of the request and the context, apart from
// `artifacts.timestamp`. One context can be shared across threads; requests
// hold no locks and share no mutable state.

pub mod config;
pub mod context;
pub mod error;
pub mod hashing;
pub mod pipeline;
pub mod request;
pub mod upstream;

pub use config::ComposeConfig;
pub use context::ComposeContext;
pub use error::{ComposeError, ConfigError};
pub use pipeline::{ComposeOutput, compose, compose_at};
pub use request::{ComposeRequest, ComposeResponse, OverlayParams, RequestMode};
