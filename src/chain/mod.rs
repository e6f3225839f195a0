//! Typed access to mainchain and sidechain nodes.
//!
//! [`Mainchain`] and [`Sidechain`] wrap an [`RpcProxy`](crate::rpc::RpcProxy)
//! with the calls scenarios and the convergence engine need. Both implement
//! [`ChainNode`], the query surface that convergence waits poll.

mod mainchain;
mod sidechain;

pub use mainchain::Mainchain;
pub use sidechain::{ForgingInfo, Sidechain};

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;

/// Chain state every node can report through its query API.
#[async_trait]
pub trait ChainNode: Send + Sync {
    /// Label used in logs and error messages, e.g. `mc-node0`.
    fn label(&self) -> &str;

    /// Identifier of the best block.
    async fn best_block_id(&self) -> Result<String>;

    /// Height of the best block.
    async fn block_height(&self) -> Result<u64>;

    /// Identifiers of the pending transactions.
    async fn mempool_ids(&self) -> Result<BTreeSet<String>>;
}

/// Look up a JSON pointer in a reply.
pub(crate) fn member<'a>(method: &str, reply: &'a Value, pointer: &str) -> Result<&'a Value> {
    reply.pointer(pointer).ok_or_else(|| {
        Error::Serialization(format!("{method}: reply has no {pointer} member: {reply}"))
    })
}

pub(crate) fn member_str(method: &str, reply: &Value, pointer: &str) -> Result<String> {
    member(method, reply, pointer)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::Serialization(format!("{method}: {pointer} is not a string")))
}

/// Unsigned integer member; sidechain nodes sometimes encode counts as strings.
pub(crate) fn member_u64(method: &str, reply: &Value, pointer: &str) -> Result<u64> {
    let value = member(method, reply, pointer)?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| {
            Error::Serialization(format!("{method}: {pointer} is not an unsigned integer"))
        })
}

/// Collect the `id` member of every entry of an array.
pub(crate) fn ids_of(method: &str, reply: &Value, pointer: &str) -> Result<Vec<String>> {
    let entries = member(method, reply, pointer)?
        .as_array()
        .ok_or_else(|| Error::Serialization(format!("{method}: {pointer} is not an array")))?;
    entries
        .iter()
        .map(|entry| member_str(method, entry, "/id"))
        .collect()
}
