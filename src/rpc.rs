//! The node RPC surface consumed by the harness.
//!
//! Every query goes through the [L2Rpc] trait so that the readiness poll, the environment loader
//! and the interop decoder can be driven by an in-memory node in tests.

use crate::interop::abi::l2TokenAddressCall;
use alloy_primitives::{Address, Bytes, B256, U64};
use alloy_provider::{network::Ethereum, Provider, ReqwestProvider};
use alloy_rpc_types::{TransactionInput, TransactionRequest};
use alloy_sol_types::SolCall;
use alloy_transport_http::reqwest::Url;
use async_trait::async_trait;
use color_eyre::Result;
use serde::{Deserialize, Serialize};

/// The minimal interface of an L2 node, as seen by the harness.
#[async_trait]
pub(crate) trait L2Rpc: Send + Sync {
    /// Returns the chain ID of the node. Fails if the node is unreachable.
    async fn chain_id(&self) -> Result<u64>;

    /// Returns the default bridge contracts (`zks_getBridgeContracts`).
    async fn bridge_contracts(&self) -> Result<BridgeAddresses>;

    /// Returns the deployed bytecode at `address`. Empty when nothing is deployed.
    async fn code_at(&self, address: Address) -> Result<Bytes>;

    /// Returns the L1 address of the chain's base token (`zks_getBaseTokenL1Address`).
    async fn base_token_l1_address(&self) -> Result<Address>;

    /// Returns the L2 address of a bridged token by asking the shared L2 bridge.
    async fn l2_token_address(&self, bridge: Address, l1_token: Address) -> Result<Address>;

    /// Returns the node-flavoured receipt of a transaction, if it is known.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ZkReceipt>>;

    /// Returns the proof of the L2 to L1 log at `log_index` within the transaction's logs
    /// (`zks_getL2ToL1LogProof`). The proof stops at `proof_until_chain_id` when it is given.
    async fn l2_to_l1_log_proof(
        &self,
        hash: B256,
        log_index: u64,
        proof_until_chain_id: Option<u64>,
    ) -> Result<Option<L2ToL1LogProof>>;
}

/// Partial response for the `zks_getBridgeContracts` RPC.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BridgeAddresses {
    /// The shared bridge on L1.
    #[serde(default)]
    pub(crate) l1_shared_default_bridge: Option<Address>,
    /// The shared bridge on L2.
    #[serde(default)]
    pub(crate) l2_shared_default_bridge: Option<Address>,
}

/// Partial transaction receipt as returned by the L2 node's `eth_getTransactionReceipt`.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ZkReceipt {
    /// The batch the transaction was sealed in, once sealed.
    #[serde(default)]
    pub(crate) l1_batch_number: Option<U64>,
    /// The position of the transaction within its batch.
    #[serde(default)]
    pub(crate) l1_batch_tx_index: Option<U64>,
    /// The event logs emitted by the transaction.
    #[serde(default)]
    pub(crate) logs: Vec<ReceiptLog>,
    /// The L2 to L1 logs emitted by the transaction.
    #[serde(default)]
    pub(crate) l2_to_l1_logs: Vec<L2ToL1Log>,
}

/// An event log inside a [ZkReceipt].
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ReceiptLog {
    /// The emitting contract.
    pub(crate) address: Address,
    /// The indexed topics.
    pub(crate) topics: Vec<B256>,
    /// The non-indexed payload.
    pub(crate) data: Bytes,
}

/// An L2 to L1 log inside a [ZkReceipt].
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct L2ToL1Log {
    /// The system contract that emitted the log.
    pub(crate) sender: Address,
    /// The log key.
    pub(crate) key: B256,
    /// The log value.
    pub(crate) value: B256,
}

/// Response for the `zks_getL2ToL1LogProof` RPC.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct L2ToL1LogProof {
    /// The merkle path of the log.
    pub(crate) proof: Vec<B256>,
    /// The position of the log within the batch.
    pub(crate) id: u32,
    /// The root the proof resolves to.
    pub(crate) root: B256,
}

/// An [L2Rpc] backed by an HTTP alloy provider.
#[derive(Debug, Clone)]
pub(crate) struct ZkProvider {
    inner: ReqwestProvider<Ethereum>,
}

impl ZkProvider {
    /// Create a new [ZkProvider] for the given HTTP endpoint.
    pub(crate) fn new_http(url: &str) -> Result<Self> {
        Ok(Self {
            inner: ReqwestProvider::<Ethereum>::new_http(Url::parse(url)?),
        })
    }
}

#[async_trait]
impl L2Rpc for ZkProvider {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.inner.get_chain_id().await?)
    }

    async fn bridge_contracts(&self) -> Result<BridgeAddresses> {
        Ok(self
            .inner
            .raw_request::<(), BridgeAddresses>("zks_getBridgeContracts".into(), ())
            .await?)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        Ok(self.inner.get_code_at(address).await?)
    }

    async fn base_token_l1_address(&self) -> Result<Address> {
        Ok(self
            .inner
            .raw_request::<(), Address>("zks_getBaseTokenL1Address".into(), ())
            .await?)
    }

    async fn l2_token_address(&self, bridge: Address, l1_token: Address) -> Result<Address> {
        let call = l2TokenAddressCall { _l1Token: l1_token };
        let tx = TransactionRequest::default()
            .to(bridge)
            .input(TransactionInput::new(call.abi_encode().into()));
        let ret = self.inner.call(&tx).await?;
        Ok(l2TokenAddressCall::abi_decode_returns(&ret, true)?._0)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ZkReceipt>> {
        Ok(self
            .inner
            .raw_request::<[B256; 1], Option<ZkReceipt>>(
                "eth_getTransactionReceipt".into(),
                [hash],
            )
            .await?)
    }

    async fn l2_to_l1_log_proof(
        &self,
        hash: B256,
        log_index: u64,
        proof_until_chain_id: Option<u64>,
    ) -> Result<Option<L2ToL1LogProof>> {
        Ok(self
            .inner
            .raw_request::<(B256, u64, Option<U64>), Option<L2ToL1LogProof>>(
                "zks_getL2ToL1LogProof".into(),
                (hash, log_index, proof_until_chain_id.map(U64::from)),
            )
            .await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy_primitives::address;
    use color_eyre::eyre::{bail, eyre};
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicU32, Ordering},
    };

    /// The shared L2 bridge address reported by [MockNode].
    pub(crate) const MOCK_L2_BRIDGE: Address = address!("0000000000000000000000000000000000010003");

    /// An in-memory [L2Rpc].
    #[derive(Debug, Default)]
    pub(crate) struct MockNode {
        /// The chain ID reported by the node.
        pub(crate) chain_id: u64,
        /// Number of `chain_id` calls that fail before the node answers.
        pub(crate) unreachable_for: u32,
        /// Number of `chain_id` calls made so far.
        pub(crate) chain_id_calls: AtomicU32,
        /// Bytecode deployed at the shared L2 bridge.
        pub(crate) bridge_code: Bytes,
        /// The base token's L1 address.
        pub(crate) base_token: Address,
        /// L1 to L2 token address mapping served by the bridge.
        pub(crate) l2_tokens: HashMap<Address, Address>,
        /// Known transaction receipts.
        pub(crate) receipts: HashMap<B256, ZkReceipt>,
        /// Whether log proof queries fail.
        pub(crate) fail_proofs: bool,
    }

    impl MockNode {
        /// A node that answers immediately and has its bridge deployed.
        pub(crate) fn ready(chain_id: u64) -> Self {
            Self {
                chain_id,
                bridge_code: Bytes::from_static(&[0x60, 0x80]),
                ..Default::default()
            }
        }

        /// Number of `chain_id` calls made so far.
        pub(crate) fn attempts(&self) -> u32 {
            self.chain_id_calls.load(Ordering::SeqCst)
        }

        /// Fails until a `chain_id` call has gone through.
        fn ensure_reachable(&self) -> Result<()> {
            if self.unreachable_for > 0 && self.attempts() <= self.unreachable_for {
                bail!("connection refused");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl L2Rpc for MockNode {
        async fn chain_id(&self) -> Result<u64> {
            let call = self.chain_id_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.unreachable_for {
                bail!("connection refused");
            }
            Ok(self.chain_id)
        }

        async fn bridge_contracts(&self) -> Result<BridgeAddresses> {
            Ok(BridgeAddresses {
                l1_shared_default_bridge: None,
                l2_shared_default_bridge: Some(MOCK_L2_BRIDGE),
            })
        }

        async fn code_at(&self, address: Address) -> Result<Bytes> {
            Ok(if address == MOCK_L2_BRIDGE {
                self.bridge_code.clone()
            } else {
                Bytes::new()
            })
        }

        async fn base_token_l1_address(&self) -> Result<Address> {
            self.ensure_reachable()?;
            Ok(self.base_token)
        }

        async fn l2_token_address(&self, bridge: Address, l1_token: Address) -> Result<Address> {
            if bridge != MOCK_L2_BRIDGE {
                bail!("unknown bridge {bridge}");
            }
            self.l2_tokens
                .get(&l1_token)
                .copied()
                .ok_or_else(|| eyre!("token {l1_token} is not bridged"))
        }

        async fn transaction_receipt(&self, hash: B256) -> Result<Option<ZkReceipt>> {
            Ok(self.receipts.get(&hash).cloned())
        }

        async fn l2_to_l1_log_proof(
            &self,
            hash: B256,
            log_index: u64,
            _: Option<u64>,
        ) -> Result<Option<L2ToL1LogProof>> {
            if self.fail_proofs {
                bail!("proof unavailable");
            }
            let Some(receipt) = self.receipts.get(&hash) else {
                return Ok(None);
            };
            Ok((log_index < receipt.l2_to_l1_logs.len() as u64).then(|| L2ToL1LogProof {
                proof: vec![B256::repeat_byte(0x77)],
                id: log_index as u32,
                root: B256::repeat_byte(0x88),
            }))
        }
    }

    #[test]
    fn deserialize_node_receipt() {
        let raw = r#"{
            "transactionHash": "0x0101010101010101010101010101010101010101010101010101010101010101",
            "l1BatchNumber": "0x2a",
            "l1BatchTxIndex": "0x3",
            "logs": [{
                "address": "0x0000000000000000000000000000000000008008",
                "topics": ["0x0202020202020202020202020202020202020202020202020202020202020202"],
                "data": "0x",
                "logType": null
            }],
            "l2ToL1Logs": [{
                "sender": "0x0000000000000000000000000000000000008008",
                "key": "0x0303030303030303030303030303030303030303030303030303030303030303",
                "value": "0x0404040404040404040404040404040404040404040404040404040404040404",
                "isService": true
            }]
        }"#;
        let receipt: ZkReceipt = serde_json::from_str(raw).unwrap();
        assert_eq!(receipt.l1_batch_number, Some(U64::from(42)));
        assert_eq!(receipt.l1_batch_tx_index, Some(U64::from(3)));
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(
            receipt.l2_to_l1_logs[0].sender,
            address!("0000000000000000000000000000000000008008")
        );
    }

    #[test]
    fn deserialize_pending_receipt() {
        let receipt: ZkReceipt =
            serde_json::from_str(r#"{"l1BatchNumber": null, "logs": []}"#).unwrap();
        assert_eq!(receipt.l1_batch_number, None);
        assert!(receipt.l2_to_l1_logs.is_empty());
    }

    #[test]
    fn deserialize_bridge_contracts() {
        let raw = r#"{
            "l1Erc20DefaultBridge": "0x0000000000000000000000000000000000000001",
            "l2SharedDefaultBridge": "0x0000000000000000000000000000000000010003"
        }"#;
        let bridges: BridgeAddresses = serde_json::from_str(raw).unwrap();
        assert_eq!(
            bridges.l2_shared_default_bridge,
            Some(address!("0000000000000000000000000000000000010003"))
        );
        assert_eq!(bridges.l1_shared_default_bridge, None);
    }
}
