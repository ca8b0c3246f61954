//! # Channel Model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ChannelId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub uuid: Uuid,
    pub name: String,
    /// Short transport type code, e.g. `T` for Twilio or `A` for Android
    pub channel_type: String,
    /// Messages per second the transport accepts; `None` uses the configured default
    pub tps: Option<u32>,
}

impl Channel {
    pub fn new(id: ChannelId, channel_type: impl Into<String>) -> Self {
        Self {
            id,
            uuid: Uuid::new_v4(),
            name: format!("Channel {id}"),
            channel_type: channel_type.into(),
            tps: None,
        }
    }
}
