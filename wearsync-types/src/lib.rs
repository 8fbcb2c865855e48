//! # wearsync-types
//!
//! Data model and wire format types for the wearsync two-peer task sync
//! protocol.
//!
//! This crate provides the foundational types used across all wearsync
//! crates:
//! - [`TaskId`], [`PeerId`], [`OpId`] - Identity types
//! - [`Task`], [`TaskDelta`], [`NewTask`] - The task record and its deltas
//! - [`OpKind`], [`OutboxState`], [`OutboxEntry`] - Outbox data model
//! - [`OpEnvelope`], [`AckPayload`], [`Snapshot`], [`SyncRequest`] - Bus
//!   payloads
//! - [`Settings`] - Singleton UI preferences record
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod outbox;
mod payload;
mod settings;
mod task;

pub use error::SyncError;
pub use ids::{OpId, PeerId, TaskId};
pub use outbox::{OpKind, OutboxEntry, OutboxState};
pub use payload::{
    AckFields, AckPayload, InboundOp, OpEnvelope, Snapshot, SnapshotTask, SyncRequest,
};
pub use settings::{decode_groups, encode_groups, Settings, SettingsDelta};
pub use task::{NewTask, Task, TaskDelta};
