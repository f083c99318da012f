//! Resource key resolution.
//!
//! Turns a command [`Context`] into the id a flat bucket is keyed by. Most
//! resources are read straight off the context. Parent channels and top
//! roles may need entities that aren't on the context, so they walk an
//! ordered list of lookup tiers: the context's local cache, then the
//! injected read-through cache, then a REST fetch. A tier that can't answer
//! reports a miss and the next tier runs; only the final fetch can fail.

use futures::future::join_all;
use tracing::{debug, trace};

use super::context::{CacheError, Channel, Context, Member, Role, Snowflake};
use super::resource::BucketResource;
use crate::error::{Result, SnowgateError};

/// Outcome of a non-final lookup tier.
enum Lookup<T> {
    Hit(T),
    Miss,
}

/// Resolve the key a flat bucket for `resource` should use for `ctx`.
///
/// [`BucketResource::Member`] and [`BucketResource::Global`] aren't keyed by
/// a single id; their buckets handle the context themselves and asking for
/// them here is an error.
pub async fn resolve_key(ctx: &dyn Context, resource: BucketResource) -> Result<Snowflake> {
    let key = match resource {
        BucketResource::User => ctx.author_id(),
        BucketResource::Channel => ctx.channel_id(),
        BucketResource::ParentChannel => parent_channel_key(ctx).await?,
        BucketResource::TopRole => top_role_key(ctx).await?,
        BucketResource::Guild => ctx.guild_id().unwrap_or_else(|| ctx.channel_id()),
        BucketResource::Member | BucketResource::Global => {
            return Err(SnowgateError::Unresolvable {
                reason: format!("{} buckets aren't keyed by a single id", resource),
                source: None,
            });
        }
    };

    trace!(resource = %resource, key = %key, "Resolved resource key");
    Ok(key)
}

async fn parent_channel_key(ctx: &dyn Context) -> Result<Snowflake> {
    // DM channels have no parent.
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(ctx.channel_id());
    };

    let channel = if let Lookup::Hit(channel) = local_channel(ctx) {
        channel
    } else if let Lookup::Hit(channel) = injected_channel(ctx).await {
        channel
    } else {
        fetched_channel(ctx).await?
    };

    Ok(channel.parent_id.unwrap_or(guild_id))
}

fn local_channel(ctx: &dyn Context) -> Lookup<Channel> {
    match ctx.cached_channel() {
        Some(channel) => Lookup::Hit(channel),
        None => Lookup::Miss,
    }
}

async fn injected_channel(ctx: &dyn Context) -> Lookup<Channel> {
    let Some(cache) = ctx.channel_cache() else {
        return Lookup::Miss;
    };

    match cache.get(ctx.channel_id()).await {
        Ok(channel) => Lookup::Hit(channel),
        // Not-found is treated like a miss; the fetch gives the final answer.
        Err(_) => Lookup::Miss,
    }
}

async fn fetched_channel(ctx: &dyn Context) -> Result<Channel> {
    debug!(channel_id = %ctx.channel_id(), "Channel not cached, fetching");
    ctx.fetch_channel()
        .await
        .map_err(|e| SnowgateError::Unresolvable {
            reason: format!("failed to fetch channel {}", ctx.channel_id()),
            source: Some(e),
        })
}

async fn top_role_key(ctx: &dyn Context) -> Result<Snowflake> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(ctx.channel_id());
    };

    // Without a member object (webhooks and the like) or with only the
    // @everyone role, the guild id stands in for @everyone.
    let member = match ctx.member() {
        Some(member) if member.role_ids().len() > 1 => member,
        _ => return Ok(guild_id),
    };

    let roles = if let Lookup::Hit(roles) = local_roles(member) {
        roles
    } else if let Lookup::Hit(roles) = injected_roles(ctx, member).await {
        roles
    } else {
        fetched_roles(member).await?
    };

    Ok(highest_role(&roles).map(|role| role.id).unwrap_or(guild_id))
}

fn local_roles(member: &dyn Member) -> Lookup<Vec<Role>> {
    let roles = member.cached_roles();
    if roles.is_empty() {
        Lookup::Miss
    } else {
        Lookup::Hit(roles)
    }
}

async fn injected_roles(ctx: &dyn Context, member: &dyn Member) -> Lookup<Vec<Role>> {
    let Some(cache) = ctx.role_cache() else {
        return Lookup::Miss;
    };

    let results = join_all(member.role_ids().into_iter().map(|id| cache.get(id))).await;
    let mut roles = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(role) => roles.push(role),
            // Deleted roles can linger on a member; skip them.
            Err(CacheError::NotFound) => {}
            Err(CacheError::Miss) => return Lookup::Miss,
        }
    }

    Lookup::Hit(roles)
}

async fn fetched_roles(member: &dyn Member) -> Result<Vec<Role>> {
    debug!("Member roles not cached, fetching");
    member
        .fetch_roles()
        .await
        .map_err(|e| SnowgateError::Unresolvable {
            reason: "failed to fetch member roles".to_string(),
            source: Some(e),
        })
}

/// Highest positioned role; equal positions go to the lowest id.
fn highest_role(roles: &[Role]) -> Option<&Role> {
    roles
        .iter()
        .max_by(|a, b| a.position.cmp(&b.position).then_with(|| b.id.cmp(&a.id)))
}
