//! zkminer node: the long-running session coordinator.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  zkminer (this)                              │
//! │                                              │
//! │  ┌───────────────┐    POST /v1/proof         │
//! │  │  HTTP server  │ ← validators              │
//! │  │  (axum)       │                           │
//! │  └──────┬────────┘                           │
//! │         │ one task per request               │
//! │  ┌──────▼────────────┐   ┌────────────────┐  │
//! │  │ ProofRequest-     │──►│ ProofBackend   │  │
//! │  │ Handler           │   │ (session/req)  │  │
//! │  └──────┬────────────┘   └────────────────┘  │
//! │         │ reads                              │
//! │  ┌──────▼────────────┐                       │
//! │  │ NetworkStateCache │ ◄── refresh ──┐       │
//! │  └───────────────────┘               │       │
//! │                         ┌────────────┴─────┐ │
//! │                         │ Maintenance-     │ │
//! │                         │ Scheduler (tick) │─┼─► setWeights (chain)
//! │                         └────────────▲─────┘ │
//! │                                      │       │
//! │                         ┌────────────┴─────┐ │
//! │                         │ MinerSession     │ │
//! │                         │ (lifecycle loop) │ │
//! │                         └──────────────────┘ │
//! └──────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod handler;
pub mod logging;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod updater;

pub use cache::NetworkStateCache;
pub use handler::{FallbackPolicy, HandlerConfig, ProofRequestHandler};
pub use scheduler::{ActionOutcome, MaintenanceScheduler, SchedulerConfig, TickReport};
pub use session::{Collaborators, MinerSession, SessionExit, SessionSettings};
pub use updater::{GitUpdater, UpdateError, Updater};
