//! Execution context collaborators.
//!
//! The limiters never talk to a gateway or REST client directly. Everything
//! they need to know about a command invocation comes through the [`Context`]
//! trait, and any cached or fetched entities come back as the plain
//! [`Channel`] and [`Role`] values defined here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::error::BoxError;

/// A 64-bit entity identifier (user, guild, channel or role).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snowflake(pub u64);

impl Snowflake {
    /// Get the raw identifier.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one logical command invocation.
///
/// Generated once when a command starts and carried through both the pre-
/// and post-execution hooks, so the concurrency limiter can match a release
/// with the acquisition it undoes. Serializes as the bare UUID so it can
/// travel with a command across process boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh request id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The parts of a guild channel the limiters care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: Snowflake,
    /// Parent category (or parent channel for threads)
    pub parent_id: Option<Snowflake>,
}

/// The parts of a guild role the limiters care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: Snowflake,
    /// Position in the guild's role hierarchy; higher is more senior
    pub position: i32,
}

/// Why an [`AsyncCache`] lookup returned nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The entry isn't cached; it may still exist upstream.
    #[error("Entry not cached")]
    Miss,
    /// The entry is known not to exist.
    #[error("Entry not found")]
    NotFound,
}

/// A read-through entity cache injected alongside the context.
#[async_trait]
pub trait AsyncCache<T>: Send + Sync {
    /// Look up an entity by id.
    async fn get(&self, id: Snowflake) -> Result<T, CacheError>;
}

/// The guild member that triggered a command.
#[async_trait]
pub trait Member: Send + Sync {
    /// Ids of every role the member holds, including @everyone.
    fn role_ids(&self) -> Vec<Snowflake>;

    /// Roles available from the local cache. May be partial or empty.
    fn cached_roles(&self) -> Vec<Role>;

    /// Fetch all of the member's roles over REST.
    async fn fetch_roles(&self) -> Result<Vec<Role>, BoxError>;
}

/// Execution context of a single command invocation.
#[async_trait]
pub trait Context: Send + Sync {
    /// Identity of this invocation, stable between pre- and post-execution.
    fn request_id(&self) -> RequestId;

    /// The user who triggered the command.
    fn author_id(&self) -> Snowflake;

    /// The guild the command was triggered in, `None` in DMs.
    fn guild_id(&self) -> Option<Snowflake>;

    /// The channel the command was triggered in.
    fn channel_id(&self) -> Snowflake;

    /// The guild member who triggered the command, if known.
    fn member(&self) -> Option<&dyn Member> {
        None
    }

    /// The invoking channel from the local entity cache, if present.
    fn cached_channel(&self) -> Option<Channel> {
        None
    }

    /// Fetch the invoking channel over REST.
    async fn fetch_channel(&self) -> Result<Channel, BoxError>;

    /// Injected read-through channel cache, if one is registered.
    fn channel_cache(&self) -> Option<Arc<dyn AsyncCache<Channel>>> {
        None
    }

    /// Injected read-through role cache, if one is registered.
    fn role_cache(&self) -> Option<Arc<dyn AsyncCache<Role>>> {
        None
    }
}
