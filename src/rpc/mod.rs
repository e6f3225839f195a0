//! RPC proxy for mainchain and sidechain node APIs.
//!
//! Mainchain daemons speak authenticated JSON-RPC over `POST /`. Sidechain
//! nodes expose a JSON HTTP API with one path per method and signal errors
//! through the status code. Both are reached through [`RpcProxy`], which keeps
//! one persistent connection per endpoint and reconnects once when the peer
//! drops it.

mod endpoint;
mod proxy;
pub mod wire;

pub use endpoint::{Credentials, Dialect, NodeEndpoint};
pub use proxy::{ProxyOptions, RpcProxy, DEFAULT_RPC_TIMEOUT, HARNESS_USER_AGENT};
pub use wire::{decode_amount, encode_amount};
