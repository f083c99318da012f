//! Bucket topologies.
//!
//! A bucket maps whatever a context resolves to onto a lazily created inner
//! state (a [`Cooldown`](super::Cooldown) or a
//! [`ConcurrencyLimit`](super::ConcurrencyLimit)). The layout depends on
//! the bucket's resource:
//!
//! - **Flat**: `key -> state`, where the key comes from [`resolve_key`].
//! - **Member**: `guild -> user -> state`, with a separate `channel -> state`
//!   map for DMs.
//! - **Global**: a single state shared by every context.
//!
//! Every bucket carries the factory that makes its states, so limits travel
//! with the bucket rather than with the manager.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::trace;

use super::context::{Context, Snowflake};
use super::key::resolve_key;
use super::resource::BucketResource;
use crate::error::Result;

/// Inner state that the sweep can drop once it's no longer useful.
pub trait Expire {
    fn has_expired(&self, now: Instant) -> bool;
}

/// Makes fresh inner state for a bucket.
pub type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Inner state shared between a bucket and whoever is using it.
pub type Shared<T> = Arc<Mutex<T>>;

/// A bucket of per-key inner states.
pub enum Bucket<T> {
    Flat(FlatBucket<T>),
    Member(MemberBucket<T>),
    Global(GlobalBucket<T>),
}

impl<T: Expire> Bucket<T> {
    /// Build the topology that matches `resource`.
    pub fn new(resource: BucketResource, factory: Factory<T>) -> Self {
        match resource {
            BucketResource::Member => Bucket::Member(MemberBucket::new(factory)),
            BucketResource::Global => Bucket::Global(GlobalBucket::new(factory)),
            resource => Bucket::Flat(FlatBucket::new(resource, factory)),
        }
    }

    /// The resource this bucket partitions by.
    pub fn resource(&self) -> BucketResource {
        match self {
            Bucket::Flat(bucket) => bucket.resource,
            Bucket::Member(_) => BucketResource::Member,
            Bucket::Global(_) => BucketResource::Global,
        }
    }

    /// Get the state for `ctx`, creating it if this is the first access.
    pub async fn get_or_create(&self, ctx: &dyn Context) -> Result<Shared<T>> {
        match self {
            Bucket::Flat(bucket) => bucket.get_or_create(ctx).await,
            Bucket::Member(bucket) => Ok(bucket.get_or_create(ctx)),
            Bucket::Global(bucket) => Ok(bucket.state.clone()),
        }
    }

    /// Get the state for `ctx` without creating it.
    pub async fn try_get(&self, ctx: &dyn Context) -> Result<Option<Shared<T>>> {
        match self {
            Bucket::Flat(bucket) => bucket.try_get(ctx).await,
            Bucket::Member(bucket) => Ok(bucket.try_get(ctx)),
            Bucket::Global(bucket) => Ok(Some(bucket.state.clone())),
        }
    }

    /// Drop expired states that nobody else holds. Returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        match self {
            Bucket::Flat(bucket) => sweep_states(&mut bucket.states.lock(), now),
            Bucket::Member(bucket) => bucket.sweep(now),
            // The global state lives as long as the bucket.
            Bucket::Global(_) => 0,
        }
    }

    /// An empty bucket of the same topology sharing this bucket's factory.
    pub fn copy(&self) -> Self {
        match self {
            Bucket::Flat(bucket) => Bucket::Flat(FlatBucket::new(bucket.resource, bucket.factory.clone())),
            Bucket::Member(bucket) => Bucket::Member(MemberBucket::new(bucket.factory.clone())),
            Bucket::Global(bucket) => Bucket::Global(GlobalBucket::new(bucket.factory.clone())),
        }
    }

    /// Number of live inner states.
    pub fn len(&self) -> usize {
        match self {
            Bucket::Flat(bucket) => bucket.states.lock().len(),
            Bucket::Member(bucket) => {
                let states = bucket.states.lock();
                states.guilds.values().map(HashMap::len).sum::<usize>() + states.dm_fallback.len()
            }
            Bucket::Global(_) => 1,
        }
    }

    /// Whether the bucket holds no inner states.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Expire> fmt::Debug for Bucket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("resource", &self.resource())
            .field("states", &self.len())
            .finish()
    }
}

/// Single-level `key -> state` bucket.
pub struct FlatBucket<T> {
    resource: BucketResource,
    factory: Factory<T>,
    states: Mutex<HashMap<Snowflake, Shared<T>>>,
}

impl<T> FlatBucket<T> {
    fn new(resource: BucketResource, factory: Factory<T>) -> Self {
        Self {
            resource,
            factory,
            states: Mutex::new(HashMap::new()),
        }
    }

    async fn get_or_create(&self, ctx: &dyn Context) -> Result<Shared<T>> {
        let key = resolve_key(ctx, self.resource).await?;
        let mut states = self.states.lock();
        let state = states.entry(key).or_insert_with(|| {
            trace!(resource = %self.resource, key = %key, "Creating bucket state");
            Arc::new(Mutex::new((self.factory)()))
        });
        Ok(state.clone())
    }

    async fn try_get(&self, ctx: &dyn Context) -> Result<Option<Shared<T>>> {
        let key = resolve_key(ctx, self.resource).await?;
        Ok(self.states.lock().get(&key).cloned())
    }
}

struct MemberStates<T> {
    guilds: HashMap<Snowflake, HashMap<Snowflake, Shared<T>>>,
    /// DMs are bucketed per channel
    dm_fallback: HashMap<Snowflake, Shared<T>>,
}

/// Two-level `guild -> user -> state` bucket with a per-DM fallback.
pub struct MemberBucket<T> {
    factory: Factory<T>,
    states: Mutex<MemberStates<T>>,
}

impl<T> MemberBucket<T> {
    fn new(factory: Factory<T>) -> Self {
        Self {
            factory,
            states: Mutex::new(MemberStates {
                guilds: HashMap::new(),
                dm_fallback: HashMap::new(),
            }),
        }
    }

    fn get_or_create(&self, ctx: &dyn Context) -> Shared<T> {
        let mut states = self.states.lock();
        let map = match ctx.guild_id() {
            Some(guild_id) => states.guilds.entry(guild_id).or_default(),
            None => &mut states.dm_fallback,
        };
        let key = match ctx.guild_id() {
            Some(_) => ctx.author_id(),
            None => ctx.channel_id(),
        };

        map.entry(key)
            .or_insert_with(|| Arc::new(Mutex::new((self.factory)())))
            .clone()
    }

    fn try_get(&self, ctx: &dyn Context) -> Option<Shared<T>> {
        let states = self.states.lock();
        match ctx.guild_id() {
            Some(guild_id) => states.guilds.get(&guild_id)?.get(&ctx.author_id()).cloned(),
            None => states.dm_fallback.get(&ctx.channel_id()).cloned(),
        }
    }
}

impl<T: Expire> MemberBucket<T> {
    fn sweep(&self, now: Instant) -> usize {
        let mut states = self.states.lock();
        let mut removed = 0;
        states.guilds.retain(|_, members| {
            removed += sweep_states(members, now);
            !members.is_empty()
        });
        removed + sweep_states(&mut states.dm_fallback, now)
    }
}

/// Bucket with one state shared by every context.
pub struct GlobalBucket<T> {
    factory: Factory<T>,
    state: Shared<T>,
}

impl<T> GlobalBucket<T> {
    fn new(factory: Factory<T>) -> Self {
        let state = Arc::new(Mutex::new(factory()));
        Self { factory, state }
    }
}

/// Remove expired states. A state someone else still holds (an in-flight
/// check or a ledger entry) is in use and stays.
fn sweep_states<T: Expire>(states: &mut HashMap<Snowflake, Shared<T>>, now: Instant) -> usize {
    let before = states.len();
    states.retain(|_, state| Arc::strong_count(state) > 1 || !state.lock().has_expired(now));
    before - states.len()
}
