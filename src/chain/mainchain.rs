//! Mainchain daemon wrapper (JSON-RPC).

use crate::chain::{member, member_str, ChainNode};
use crate::error::{Error, Result};
use crate::rpc::{decode_amount, encode_amount, RpcProxy};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Typed handle on one mainchain node.
#[derive(Debug, Clone)]
pub struct Mainchain {
    label: String,
    rpc: RpcProxy,
}

impl Mainchain {
    /// Wrap a JSON-RPC proxy.
    pub fn new(label: impl Into<String>, rpc: RpcProxy) -> Self {
        Self {
            label: label.into(),
            rpc,
        }
    }

    /// Underlying proxy, for calls without a typed wrapper.
    #[must_use]
    pub fn rpc(&self) -> &RpcProxy {
        &self.rpc
    }

    /// `getblockcount`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn block_count(&self) -> Result<u64> {
        self.rpc.call("getblockcount", vec![]).await
    }

    /// `getbestblockhash`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn best_block_hash(&self) -> Result<String> {
        self.rpc.call("getbestblockhash", vec![]).await
    }

    /// `getblock`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn block(&self, hash: &str) -> Result<Value> {
        self.rpc.invoke("getblock", vec![json!(hash)]).await
    }

    /// Transaction ids included in block `hash`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails or the block has no `tx` list.
    pub async fn block_tx_ids(&self, hash: &str) -> Result<Vec<String>> {
        let block = self.block(hash).await?;
        serde_json::from_value(member("getblock", &block, "/tx")?.clone()).map_err(Error::from)
    }

    /// `getrawmempool`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn raw_mempool(&self) -> Result<Vec<String>> {
        self.rpc.call("getrawmempool", vec![]).await
    }

    /// `size` member of `getmempoolinfo`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn mempool_size(&self) -> Result<u64> {
        let info = self.rpc.invoke("getmempoolinfo", vec![]).await?;
        member("getmempoolinfo", &info, "/size")?
            .as_u64()
            .ok_or_else(|| Error::Serialization("getmempoolinfo: size is not a count".to_string()))
    }

    /// Mine `blocks` blocks and return their hashes.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn generate(&self, blocks: u64) -> Result<Vec<String>> {
        self.rpc.call("generate", vec![json!(blocks)]).await
    }

    /// `getnewaddress`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn new_address(&self) -> Result<String> {
        self.rpc.call("getnewaddress", vec![]).await
    }

    /// Wallet balance, exact.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn balance(&self) -> Result<Decimal> {
        decode_amount(&self.rpc.invoke("getbalance", vec![]).await?)
    }

    /// Send `amount` to `address`, returning the transaction id.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn send_to_address(&self, address: &str, amount: Decimal) -> Result<String> {
        self.rpc
            .call("sendtoaddress", vec![json!(address), encode_amount(amount)?])
            .await
    }

    /// `fee` member of `gettransaction`; negative for outgoing transactions.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn transaction_fee(&self, txid: &str) -> Result<Decimal> {
        let tx = self.rpc.invoke("gettransaction", vec![json!(txid)]).await?;
        decode_amount(member("gettransaction", &tx, "/fee")?)
    }

    /// `getinfo`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn info(&self) -> Result<Value> {
        self.rpc.invoke("getinfo", vec![]).await
    }

    /// Declare a sidechain with the given withdrawal epoch length; returns the
    /// raw creation reply.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn create_sidechain(
        &self,
        withdrawal_epoch_length: u32,
        address: &str,
        amount: Decimal,
    ) -> Result<Value> {
        self.rpc
            .invoke(
                "sc_create",
                vec![
                    json!(withdrawal_epoch_length),
                    json!(address),
                    encode_amount(amount)?,
                ],
            )
            .await
    }

    /// `state` of the first item of `getscinfo` for `sidechain_id`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails or the sidechain is unknown.
    pub async fn sidechain_state(&self, sidechain_id: &str) -> Result<String> {
        let info = self.rpc.invoke("getscinfo", vec![json!(sidechain_id)]).await?;
        member_str("getscinfo", &info, "/items/0/state")
    }

    /// `addnode <peer> onetry`.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn add_node(&self, peer: &str) -> Result<()> {
        self.rpc
            .invoke("addnode", vec![json!(peer), json!("onetry")])
            .await
            .map(|_| ())
    }

    /// Peers that have not completed the version handshake yet.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn peers_pending_handshake(&self) -> Result<usize> {
        let peers: Vec<Value> = self.rpc.call("getpeerinfo", vec![]).await?;
        Ok(peers
            .iter()
            .filter(|p| p.get("version").and_then(Value::as_u64).unwrap_or(0) == 0)
            .count())
    }

    /// Ask the daemon to shut down.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the call fails.
    pub async fn stop(&self) -> Result<()> {
        self.rpc.invoke("stop", vec![]).await.map(|_| ())
    }
}

#[async_trait]
impl ChainNode for Mainchain {
    fn label(&self) -> &str {
        &self.label
    }

    async fn best_block_id(&self) -> Result<String> {
        self.best_block_hash().await
    }

    async fn block_height(&self) -> Result<u64> {
        self.block_count().await
    }

    async fn mempool_ids(&self) -> Result<BTreeSet<String>> {
        Ok(self.raw_mempool().await?.into_iter().collect())
    }
}
