//! In-memory context fixtures for unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::context::{AsyncCache, CacheError, Channel, Context, Member, RequestId, Role, Snowflake};
use crate::error::BoxError;

pub(crate) fn role(id: u64, position: i32) -> Role {
    Role {
        id: Snowflake(id),
        position,
    }
}

pub(crate) fn channel(id: u64, parent_id: Option<u64>) -> Channel {
    Channel {
        id: Snowflake(id),
        parent_id: parent_id.map(Snowflake),
    }
}

/// Cache backed by a fixed map; ids not in the map are misses.
pub(crate) struct MapCache<T> {
    entries: HashMap<Snowflake, Result<T, CacheError>>,
    lookups: AtomicUsize,
}

impl<T> MapCache<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            lookups: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with(mut self, id: u64, entry: Result<T, CacheError>) -> Self {
        self.entries.insert(Snowflake(id), entry);
        self
    }

    pub(crate) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> AsyncCache<T> for MapCache<T> {
    async fn get(&self, id: Snowflake) -> Result<T, CacheError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.entries.get(&id).cloned().unwrap_or(Err(CacheError::Miss))
    }
}

pub(crate) struct TestMember {
    pub(crate) role_ids: Vec<Snowflake>,
    pub(crate) cached_roles: Vec<Role>,
    /// `None` makes `fetch_roles` fail
    pub(crate) fetched_roles: Option<Vec<Role>>,
    pub(crate) fetches: AtomicUsize,
}

impl TestMember {
    pub(crate) fn new(role_ids: &[u64]) -> Self {
        Self {
            role_ids: role_ids.iter().copied().map(Snowflake).collect(),
            cached_roles: Vec::new(),
            fetched_roles: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_cached_roles(mut self, roles: Vec<Role>) -> Self {
        self.cached_roles = roles;
        self
    }

    pub(crate) fn with_fetched_roles(mut self, roles: Vec<Role>) -> Self {
        self.fetched_roles = Some(roles);
        self
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Member for TestMember {
    fn role_ids(&self) -> Vec<Snowflake> {
        self.role_ids.clone()
    }

    fn cached_roles(&self) -> Vec<Role> {
        self.cached_roles.clone()
    }

    async fn fetch_roles(&self) -> Result<Vec<Role>, BoxError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetched_roles
            .clone()
            .ok_or_else(|| "roles unavailable".into())
    }
}

pub(crate) struct TestContext {
    pub(crate) request_id: RequestId,
    pub(crate) author_id: Snowflake,
    pub(crate) guild_id: Option<Snowflake>,
    pub(crate) channel_id: Snowflake,
    pub(crate) member: Option<TestMember>,
    pub(crate) cached_channel: Option<Channel>,
    /// `None` makes `fetch_channel` fail
    pub(crate) fetched_channel: Option<Channel>,
    pub(crate) channel_cache: Option<Arc<MapCache<Channel>>>,
    pub(crate) role_cache: Option<Arc<MapCache<Role>>>,
    pub(crate) channel_fetches: AtomicUsize,
}

impl TestContext {
    /// A DM context.
    pub(crate) fn dm(author_id: u64, channel_id: u64) -> Self {
        Self {
            request_id: RequestId::new(),
            author_id: Snowflake(author_id),
            guild_id: None,
            channel_id: Snowflake(channel_id),
            member: None,
            cached_channel: None,
            fetched_channel: None,
            channel_cache: None,
            role_cache: None,
            channel_fetches: AtomicUsize::new(0),
        }
    }

    /// A guild context.
    pub(crate) fn guild(author_id: u64, guild_id: u64, channel_id: u64) -> Self {
        let mut ctx = Self::dm(author_id, channel_id);
        ctx.guild_id = Some(Snowflake(guild_id));
        ctx
    }

    pub(crate) fn with_member(mut self, member: TestMember) -> Self {
        self.member = Some(member);
        self
    }

    pub(crate) fn with_cached_channel(mut self, channel: Channel) -> Self {
        self.cached_channel = Some(channel);
        self
    }

    pub(crate) fn with_fetched_channel(mut self, channel: Channel) -> Self {
        self.fetched_channel = Some(channel);
        self
    }

    pub(crate) fn with_channel_cache(mut self, cache: MapCache<Channel>) -> Self {
        self.channel_cache = Some(Arc::new(cache));
        self
    }

    pub(crate) fn with_role_cache(mut self, cache: MapCache<Role>) -> Self {
        self.role_cache = Some(Arc::new(cache));
        self
    }

    pub(crate) fn channel_fetches(&self) -> usize {
        self.channel_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Context for TestContext {
    fn request_id(&self) -> RequestId {
        self.request_id
    }

    fn author_id(&self) -> Snowflake {
        self.author_id
    }

    fn guild_id(&self) -> Option<Snowflake> {
        self.guild_id
    }

    fn channel_id(&self) -> Snowflake {
        self.channel_id
    }

    fn member(&self) -> Option<&dyn Member> {
        self.member.as_ref().map(|m| m as &dyn Member)
    }

    fn cached_channel(&self) -> Option<Channel> {
        self.cached_channel.clone()
    }

    async fn fetch_channel(&self) -> Result<Channel, BoxError> {
        self.channel_fetches.fetch_add(1, Ordering::SeqCst);
        // REST calls suspend; let overlapping calls interleave.
        tokio::task::yield_now().await;
        self.fetched_channel
            .clone()
            .ok_or_else(|| "channel unavailable".into())
    }

    fn channel_cache(&self) -> Option<Arc<dyn AsyncCache<Channel>>> {
        self.channel_cache
            .clone()
            .map(|cache| cache as Arc<dyn AsyncCache<Channel>>)
    }

    fn role_cache(&self) -> Option<Arc<dyn AsyncCache<Role>>> {
        self.role_cache
            .clone()
            .map(|cache| cache as Arc<dyn AsyncCache<Role>>)
    }
}
