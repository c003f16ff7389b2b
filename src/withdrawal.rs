//! Resolves the finalize-withdrawal parameters of an L2 to L1 message.

use crate::{
    interop::abi::L1MessageSent,
    rpc::{L2Rpc, ZkReceipt},
};
use alloy_primitives::{address, Address, Bytes, B256};
use alloy_sol_types::{SolEvent, SolValue};
use color_eyre::{eyre::eyre, Result};
use tracing::debug;

/// The `L1Messenger` system contract.
pub(crate) const L1_MESSENGER_ADDRESS: Address =
    address!("0000000000000000000000000000000000008008");

/// The chain ID of the gateway settlement layer that interop proofs are built against.
pub(crate) const GATEWAY_CHAIN_ID: u64 = 506;

/// Identifies one withdrawal message of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FinalizeWithdrawalRequest {
    /// The withdrawal transaction hash.
    pub(crate) withdrawal_hash: B256,
    /// Which of the transaction's messages to resolve.
    pub(crate) index: usize,
    /// Index within the message's log group. Always `0` for interop messages.
    pub(crate) sub_index: usize,
    /// The settlement layer the proof should stop at.
    pub(crate) gateway_chain_id: u64,
}

impl FinalizeWithdrawalRequest {
    /// Create a request for the `index`-th message of `withdrawal_hash`, proven up to the gateway.
    pub(crate) fn new(withdrawal_hash: B256, index: usize) -> Self {
        Self {
            withdrawal_hash,
            index,
            sub_index: 0,
            gateway_chain_id: GATEWAY_CHAIN_ID,
        }
    }
}

/// Everything needed to prove a message on its destination.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub(crate) struct FinalizeWithdrawalParams {
    /// The batch the message was sealed in.
    pub(crate) l1_batch_number: u64,
    /// The position of the message's log within the batch.
    pub(crate) l2_message_index: u64,
    /// The position of the transaction within the batch.
    pub(crate) l2_tx_number_in_block: u64,
    /// The raw message, including its identifier prefix.
    pub(crate) message: Bytes,
    /// The account that sent the message.
    pub(crate) sender: Address,
    /// The inclusion proof of the message's log.
    pub(crate) proof: Vec<B256>,
}

/// Looks up the finalize-withdrawal parameters for a request.
///
/// Returns `Ok(None)` when the transaction, its `index`-th message, or the message's proof does
/// not exist (yet). Errors are reserved for transport failures and undecodable logs.
pub(crate) async fn finalize_withdrawal_params<R: L2Rpc + ?Sized>(
    rpc: &R,
    request: &FinalizeWithdrawalRequest,
) -> Result<Option<FinalizeWithdrawalParams>> {
    debug!(
        target: "withdrawal",
        "Resolving message #{}.{} of {} (proof until chain {})",
        request.index,
        request.sub_index,
        request.withdrawal_hash,
        request.gateway_chain_id
    );
    let Some(receipt) = rpc.transaction_receipt(request.withdrawal_hash).await? else {
        debug!(target: "withdrawal", "No receipt for {}", request.withdrawal_hash);
        return Ok(None);
    };
    let (Some(l1_batch_number), Some(l1_batch_tx_index)) =
        (receipt.l1_batch_number, receipt.l1_batch_tx_index)
    else {
        debug!(target: "withdrawal", "Transaction {} is not sealed in a batch yet", request.withdrawal_hash);
        return Ok(None);
    };

    let Some((sender, message)) = withdrawal_message(&receipt, request.index)? else {
        return Ok(None);
    };
    let Some(log_index) = withdrawal_l2_to_l1_log_index(&receipt, request.index) else {
        return Ok(None);
    };

    let Some(log_proof) = rpc
        .l2_to_l1_log_proof(
            request.withdrawal_hash,
            log_index as u64,
            Some(request.gateway_chain_id),
        )
        .await?
    else {
        debug!(target: "withdrawal", "No log proof for {} at log #{log_index}", request.withdrawal_hash);
        return Ok(None);
    };

    Ok(Some(FinalizeWithdrawalParams {
        l1_batch_number: l1_batch_number.to(),
        l2_message_index: log_proof.id as u64,
        l2_tx_number_in_block: l1_batch_tx_index.to(),
        message,
        sender,
        proof: log_proof.proof,
    }))
}

/// Returns the sender and payload of the `index`-th `L1MessageSent` event in the receipt.
pub(crate) fn withdrawal_message(
    receipt: &ZkReceipt,
    index: usize,
) -> Result<Option<(Address, Bytes)>> {
    let Some(log) = receipt
        .logs
        .iter()
        .filter(|log| {
            log.address == L1_MESSENGER_ADDRESS
                && log.topics.first() == Some(&L1MessageSent::SIGNATURE_HASH)
        })
        .nth(index)
    else {
        return Ok(None);
    };

    let sender = log
        .topics
        .get(1)
        .map(|topic| Address::from_word(*topic))
        .ok_or_else(|| eyre!("L1MessageSent log is missing its sender topic"))?;
    let message = Bytes::abi_decode(&log.data, true)?;
    Ok(Some((sender, message)))
}

/// Returns the position, within all of the receipt's L2 to L1 logs, of the `index`-th log sent by
/// the `L1Messenger`.
pub(crate) fn withdrawal_l2_to_l1_log_index(receipt: &ZkReceipt, index: usize) -> Option<usize> {
    receipt
        .l2_to_l1_logs
        .iter()
        .enumerate()
        .filter(|(_, log)| log.sender == L1_MESSENGER_ADDRESS)
        .nth(index)
        .map(|(position, _)| position)
}
