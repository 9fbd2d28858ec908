// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod adapter;
pub mod api;
pub mod config;
pub mod context;
pub mod deal;
pub mod destination;
pub mod events;
pub mod media;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod reconcile;
pub mod render;
pub mod schedule;
pub mod source;
pub mod store;
pub mod telemetry;

// Recording fakes for every external seam, used by the integration tests.
pub mod testkit;

// ---- Re-exports for stable public API ----
pub use crate::context::AppContext;
pub use crate::deal::Deal;
pub use crate::notify::{Fanout, FanoutReport};
pub use crate::schedule::{Scheduler, Shutdown};
pub use crate::source::{Source, SourceId};
