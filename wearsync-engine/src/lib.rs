//! # wearsync-engine
//!
//! The sync engine for wearsync: everything between the UI and the data
//! bus on one peer.
//!
//! ## Architecture
//!
//! ```text
//!    UI ──mutate──▶ SyncCore ──txn──▶ Store (tasks + outbox)
//!                       │                                  ▲
//!    bus event ──▶ InboxRouter ──▶ SyncCore ──txn──▶ Store │
//!                                                          │
//!    OutboxPump ◀── drains PENDING ──Store                 │
//!            │                                             │
//!            └─ Transport.put(path, payload) ──▶ bus       │
//!    bus ack ──▶ InboxRouter ──▶ SyncCore.mark_acked ──────┘
//! ```
//!
//! The merge algorithm and routing rules are pure functions in
//! `wearsync-core`; this crate interprets them against the store and the
//! [`Transport`]. [`bootstrap`] wires the process-wide singletons.

#![warn(clippy::all)]

pub mod alarm;
mod bootstrap;
mod clock;
pub mod config;
mod core;
mod error;
mod maintenance;
mod pump;
mod router;
pub mod transport;

pub use alarm::{AlarmScheduler, NullAlarms, RecordingAlarms};
pub use bootstrap::{bootstrap, bootstrap_with_store, Engine};
pub use clock::now_ms;
pub use config::{ConfigError, SyncConfig};
pub use self::core::{ApplyOutcome, SyncCore};
pub use error::{EngineError, EngineResult};
pub use maintenance::Maintenance;
pub use pump::{DrainStats, OutboxPump};
pub use router::{BusEventKind, InboxRouter};
pub use transport::{MockTransport, Transport, TransportError};
