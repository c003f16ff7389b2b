//! Decoding of interop bundles and triggers out of withdrawal messages.

use crate::{
    error::HarnessError,
    rpc::L2Rpc,
    withdrawal::{finalize_withdrawal_params, FinalizeWithdrawalParams, FinalizeWithdrawalRequest},
};
use abi::{
    InteropBundle, InteropTrigger, L2Message, MessageInclusionProof, L2_INTEROP_CENTER_ADDRESS,
    MESSAGE_PREFIX_LEN, TRIGGER_GAS_PER_PUBDATA,
};
use alloy_primitives::{Bytes, B256, U256};
use alloy_sol_types::SolValue;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use tracing::{debug, warn};

pub(crate) mod abi;

/// A decoded interop message together with its re-encodings.
///
/// The [Default] value means "no message found"; check `l1_batch_number == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Output<T> {
    /// The decoded message.
    pub(crate) output: Option<T>,
    /// The canonical ABI encoding of `output`.
    pub(crate) raw_data: Option<Bytes>,
    /// The batch the message was sealed in.
    pub(crate) l1_batch_number: u64,
    /// The position of the transaction within the batch.
    pub(crate) l2_tx_number_in_block: u64,
    /// The position of the message's log within the batch.
    pub(crate) l2_message_index: u64,
    /// The ABI-encoded [MessageInclusionProof] for the message.
    pub(crate) full_proof: Bytes,
}

impl<T> Default for Output<T> {
    fn default() -> Self {
        Self {
            output: None,
            raw_data: None,
            l1_batch_number: 0,
            l2_tx_number_in_block: 0,
            l2_message_index: 0,
            full_proof: Bytes::new(),
        }
    }
}

impl<T> Output<T> {
    /// Whether a message was found.
    pub(crate) fn is_found(&self) -> bool {
        self.l1_batch_number != 0
    }
}

/// Retrieves and decodes the `index`-th interop bundle sent by `withdrawal_hash`.
pub(crate) async fn get_interop_bundle_data<R: L2Rpc + ?Sized>(
    rpc: &R,
    withdrawal_hash: B256,
    index: usize,
) -> Result<Output<InteropBundle>> {
    let Some(params) = try_get_message_data(rpc, withdrawal_hash, index).await else {
        return Ok(Output::default());
    };

    let bundle = InteropBundle::abi_decode(message_payload(&params.message)?, true)?;
    debug!(
        target: "interop",
        "Decoded bundle for chain {} with {} calls",
        bundle.destinationChainId,
        bundle.calls.len()
    );

    build_output(rpc, params, bundle).await
}

/// Retrieves and decodes the `index`-th interop trigger sent by `withdrawal_hash`.
///
/// Fails with [HarnessError::MalformedTrigger] when the message does not carry the trigger's
/// gas-per-pubdata marker.
pub(crate) async fn get_interop_trigger_data<R: L2Rpc + ?Sized>(
    rpc: &R,
    withdrawal_hash: B256,
    index: usize,
) -> Result<Output<InteropTrigger>> {
    let Some(params) = try_get_message_data(rpc, withdrawal_hash, index).await else {
        return Ok(Output::default());
    };

    let trigger = InteropTrigger::abi_decode(message_payload(&params.message)?, true)?;
    let gas_per_pubdata = trigger.gasFields.gasPerPubdataByteLimit;
    if gas_per_pubdata != U256::from(TRIGGER_GAS_PER_PUBDATA) {
        return Err(HarnessError::MalformedTrigger { gas_per_pubdata }.into());
    }

    build_output(rpc, params, trigger).await
}

/// Looks up the message parameters, treating every failure as "no message".
async fn try_get_message_data<R: L2Rpc + ?Sized>(
    rpc: &R,
    withdrawal_hash: B256,
    index: usize,
) -> Option<FinalizeWithdrawalParams> {
    let request = FinalizeWithdrawalRequest::new(withdrawal_hash, index);
    match finalize_withdrawal_params(rpc, &request).await {
        Ok(Some(params)) if !params.message.is_empty() => Some(params),
        Ok(_) => {
            debug!(target: "interop", "No interop message #{index} for {withdrawal_hash}");
            None
        }
        // Running out of messages for a transaction surfaces as an RPC error on some nodes.
        Err(e) => {
            warn!(target: "interop", "Error reading interop message: {e}");
            None
        }
    }
}

/// Strips the message identifier off a raw message.
fn message_payload(message: &Bytes) -> Result<&[u8]> {
    message
        .get(MESSAGE_PREFIX_LEN..)
        .ok_or_else(|| eyre!("interop message is shorter than its identifier"))
}

/// Re-encodes a decoded message and wraps it into its inclusion proof.
async fn build_output<R, T>(
    rpc: &R,
    params: FinalizeWithdrawalParams,
    decoded: T,
) -> Result<Output<T>>
where
    R: L2Rpc + ?Sized,
    T: SolValue,
{
    let raw_data = Bytes::from(decoded.abi_encode());
    let tx_number_in_batch = u16::try_from(params.l2_tx_number_in_block)
        .map_err(|_| eyre!("tx number {} does not fit a u16", params.l2_tx_number_in_block))?;

    let full_proof = MessageInclusionProof {
        chainId: U256::from(rpc.chain_id().await?),
        l1BatchNumber: U256::from(params.l1_batch_number),
        l2MessageIndex: U256::from(params.l2_message_index),
        message: L2Message {
            txNumberInBatch: tx_number_in_batch,
            sender: L2_INTEROP_CENTER_ADDRESS,
            data: raw_data.clone(),
        },
        proof: params.proof,
    }
    .abi_encode();

    Ok(Output {
        output: Some(decoded),
        raw_data: Some(raw_data),
        l1_batch_number: params.l1_batch_number,
        l2_tx_number_in_block: params.l2_tx_number_in_block,
        l2_message_index: params.l2_message_index,
        full_proof: full_proof.into(),
    })
}
