//! Resource scopes that buckets partition their state by.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SnowgateError;

/// Resource target types used by cooldown and concurrency buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketResource {
    /// Per-user
    User,
    /// Per guild member. In a DM this is per-DM channel.
    Member,
    /// Per-channel
    Channel,
    /// Per parent channel. Per-DM for DM channels and per-guild for guild
    /// channels without a parent.
    ParentChannel,
    /// Per highest role. Per-DM in DMs, and the guild (@everyone) when the
    /// member holds no real roles.
    TopRole,
    /// Per-guild, or per-DM outside a guild
    Guild,
    /// One bucket shared by everything
    Global,
}

impl BucketResource {
    /// All exposed resources, in discriminant order.
    pub const ALL: [BucketResource; 7] = [
        BucketResource::User,
        BucketResource::Member,
        BucketResource::Channel,
        BucketResource::ParentChannel,
        BucketResource::TopRole,
        BucketResource::Guild,
        BucketResource::Global,
    ];

    /// Convert from the stable integer value.
    ///
    /// `4` is reserved for a per-category resource that has no resolution
    /// rule yet and is rejected along with any other unknown value.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(BucketResource::User),
            1 => Some(BucketResource::Member),
            2 => Some(BucketResource::Channel),
            3 => Some(BucketResource::ParentChannel),
            5 => Some(BucketResource::TopRole),
            6 => Some(BucketResource::Guild),
            7 => Some(BucketResource::Global),
            _ => None,
        }
    }

    /// Convert to the stable integer value.
    pub fn to_value(&self) -> i32 {
        match self {
            BucketResource::User => 0,
            BucketResource::Member => 1,
            BucketResource::Channel => 2,
            BucketResource::ParentChannel => 3,
            BucketResource::TopRole => 5,
            BucketResource::Guild => 6,
            BucketResource::Global => 7,
        }
    }

    /// The snake_case name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketResource::User => "user",
            BucketResource::Member => "member",
            BucketResource::Channel => "channel",
            BucketResource::ParentChannel => "parent_channel",
            BucketResource::TopRole => "top_role",
            BucketResource::Guild => "guild",
            BucketResource::Global => "global",
        }
    }
}

impl TryFrom<i32> for BucketResource {
    type Error = SnowgateError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_value(value)
            .ok_or_else(|| SnowgateError::Config(format!("Unknown bucket resource value {}", value)))
    }
}

impl FromStr for BucketResource {
    type Err = SnowgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|resource| resource.as_str() == s)
            .ok_or_else(|| SnowgateError::Config(format!("Unknown bucket resource {:?}", s)))
    }
}

impl fmt::Display for BucketResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
