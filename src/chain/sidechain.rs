//! Sidechain node wrapper (JSON HTTP API).

use crate::chain::{ids_of, member_str, member_u64, ChainNode};
use crate::error::{Error, Result};
use crate::rpc::RpcProxy;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::debug;

/// Forging position reported by `block/forgingInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForgingInfo {
    /// Consensus epoch of the best block.
    pub epoch: u64,
    /// Slot of the best block within its epoch.
    pub slot: u64,
    /// Slots per consensus epoch.
    pub slots_in_epoch: u64,
}

impl ForgingInfo {
    /// Epoch and slot immediately after the best block.
    #[must_use]
    pub fn next_slot(&self) -> (u64, u64) {
        if self.slot >= self.slots_in_epoch {
            (self.epoch + 1, 1)
        } else {
            (self.epoch, self.slot + 1)
        }
    }
}

/// Typed handle on one sidechain node.
#[derive(Debug, Clone)]
pub struct Sidechain {
    label: String,
    rpc: RpcProxy,
}

impl Sidechain {
    /// Wrap a REST proxy.
    pub fn new(label: impl Into<String>, rpc: RpcProxy) -> Self {
        Self {
            label: label.into(),
            rpc,
        }
    }

    /// Underlying proxy.
    #[must_use]
    pub fn rpc(&self) -> &RpcProxy {
        &self.rpc
    }

    /// Invoke `method` and unwrap the reply envelope.
    ///
    /// Newer nodes wrap replies as `{"result": ..}` and report rejected
    /// requests as `{"error": ..}` with status 200; older nodes return the
    /// bare object.
    async fn request(&self, method: &str, body: Option<Value>) -> Result<Value> {
        let params = body.map(|b| vec![Value::String(b.to_string())]).unwrap_or_default();
        let reply = self.rpc.invoke(method, params).await?;
        match reply {
            Value::Object(mut map) => {
                if let Some(err) = map.remove("error").filter(|e| !e.is_null()) {
                    return Err(Error::Api {
                        method: self.rpc.wire_method(method),
                        status: Some(200),
                        payload: err.to_string(),
                    });
                }
                Ok(map.remove("result").unwrap_or(Value::Object(map)))
            }
            other => Ok(other),
        }
    }

    /// `debug/info`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn info(&self) -> Result<Value> {
        self.request("debug_info", None).await
    }

    /// Ids of the transactions in the best block.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn best_block_tx_ids(&self) -> Result<Vec<String>> {
        let info = self.info().await?;
        ids_of("debug/info", &info, "/bestBlock/transactions")
    }

    /// `nodeView/pool`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn pool(&self) -> Result<Value> {
        self.request("nodeView_pool", None).await
    }

    /// Ids of the pending transactions.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn pool_ids(&self) -> Result<Vec<String>> {
        let pool = self.pool().await?;
        ids_of("nodeView/pool", &pool, "/transactions")
    }

    /// Number of pending transactions.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn pool_size(&self) -> Result<u64> {
        let pool = self.pool().await?;
        member_u64("nodeView/pool", &pool, "/size")
    }

    /// `wallet/balances`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn balances(&self) -> Result<Value> {
        self.request("wallet_balances", None).await
    }

    /// Total wallet balance.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn total_balance(&self) -> Result<u64> {
        let balances = self.balances().await?;
        member_u64("wallet/balances", &balances, "/totalBalance")
    }

    /// First wallet public key.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails or the wallet has no keys.
    pub async fn first_public_key(&self) -> Result<String> {
        let balances = self.balances().await?;
        member_str("wallet/balances", &balances, "/publicKeys/0")
    }

    /// Transfer `amount` to `recipient`, returning the transaction id.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn transfer(&self, recipient: &str, amount: u64, fee: u64) -> Result<String> {
        let body = json!({"amount": amount, "recipient": recipient, "fee": fee});
        let reply = self.request("wallet_transfer", Some(body)).await?;
        member_str("wallet/transfer", &reply, "/id")
    }

    /// Start forging; the node acknowledges with `{"response": "ok"}`.
    ///
    /// # Errors
    ///
    /// Returns an API error if the node does not acknowledge.
    pub async fn start_mining(&self) -> Result<()> {
        let reply = self.request("debug_startMining", None).await?;
        let ack = member_str("debug/startMining", &reply, "/response")?;
        if ack == "ok" {
            Ok(())
        } else {
            Err(Error::Api {
                method: self.rpc.wire_method("debug_startMining"),
                status: Some(200),
                payload: reply.to_string(),
            })
        }
    }

    /// Connect to the peer listening on `host:port`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn connect(&self, host: &str, port: u16) -> Result<()> {
        let body = json!({"host": host, "port": port});
        self.request("node_connect", Some(body)).await.map(|_| ())
    }

    /// `block/forgingInfo`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn forging_info(&self) -> Result<ForgingInfo> {
        let info = self.request("block_forgingInfo", None).await?;
        Ok(ForgingInfo {
            epoch: member_u64("block/forgingInfo", &info, "/bestEpochNumber")?,
            slot: member_u64("block/forgingInfo", &info, "/bestSlotNumber")?,
            slots_in_epoch: member_u64("block/forgingInfo", &info, "/consensusSlotsInEpoch")?,
        })
    }

    /// Forge a block in the slot after the best block, returning its id.
    ///
    /// # Errors
    ///
    /// Returns an API error if the node rejects the block.
    pub async fn generate_next_block(&self) -> Result<String> {
        let (epoch, slot) = self.forging_info().await?.next_slot();
        debug!("{}: forging block at epoch {} slot {}", self.label, epoch, slot);
        let body = json!({"epochNumber": epoch, "slotNumber": slot});
        let reply = self.request("block_generate", Some(body)).await?;
        member_str("block/generate", &reply, "/blockId")
    }
}

#[async_trait]
impl ChainNode for Sidechain {
    fn label(&self) -> &str {
        &self.label
    }

    async fn best_block_id(&self) -> Result<String> {
        let info = self.info().await?;
        member_str("debug/info", &info, "/bestBlock/id")
    }

    async fn block_height(&self) -> Result<u64> {
        let info = self.info().await?;
        member_u64("debug/info", &info, "/height")
    }

    async fn mempool_ids(&self) -> Result<BTreeSet<String>> {
        Ok(self.pool_ids().await?.into_iter().collect())
    }
}
