//! # System Constants
//!
//! Queue names, key prefixes and status codes shared by the coordinator, courier,
//! task queues and the relational schema.

/// Low volume, low latency task queue
pub const HANDLER_QUEUE: &str = "handler";

/// High volume, latency tolerant task queue
pub const BATCH_QUEUE: &str = "batch";

/// Suffix of the per-queue sorted set of organizations with pending tasks
pub const ACTIVE_SUFFIX: &str = "active";

/// Prefix of courier message batch queues
pub const COURIER_QUEUE_PREFIX: &str = "msgs";

/// Sorted set indexing every courier queue key that has ever received a batch
pub const COURIER_ACTIVE_KEY: &str = "msgs:active";

/// Incident type raised for persistently failing webhook nodes
pub const INCIDENT_WEBHOOKS_UNHEALTHY: &str = "webhooks:unhealthy";

/// Task types pushed to the async task queues after commit
pub mod task_types {
    pub const START_SESSION: &str = "start_session";
    pub const SEND_BROADCAST: &str = "send_broadcast";
}

/// Single-character message status codes stored in the message table
pub mod msg_status {
    pub const PENDING: &str = "P";
    pub const QUEUED: &str = "Q";
    pub const WIRED: &str = "W";
    pub const SENT: &str = "S";
    pub const HANDLED: &str = "H";
    pub const FAILED: &str = "F";
}

/// Single-character contact status codes stored in the contact table
pub mod contact_status {
    pub const ACTIVE: &str = "A";
    pub const BLOCKED: &str = "B";
    pub const STOPPED: &str = "S";
    pub const ARCHIVED: &str = "V";
}
