//! ABI schemas for interop messages and the inclusion-proof envelope.

use alloy_primitives::{address, Address};

/// The interop center system contract, the sender of every interop message.
pub(crate) const L2_INTEROP_CENTER_ADDRESS: Address =
    address!("000000000000000000000000000000000001000d");

/// The gas-per-pubdata value every genuine trigger message carries.
pub(crate) const TRIGGER_GAS_PER_PUBDATA: u64 = 800;

/// Length of the message identifier that precedes the ABI payload.
pub(crate) const MESSAGE_PREFIX_LEN: usize = 1;

alloy_sol_types::sol! {
    /// A single call inside an [InteropBundle].
    #[derive(Debug, PartialEq, Eq, serde::Serialize)]
    struct InteropCall {
        address to;
        address from;
        uint256 value;
        bytes data;
    }

    /// A batch of cross-chain calls.
    #[derive(Debug, PartialEq, Eq, serde::Serialize)]
    struct InteropBundle {
        uint256 destinationChainId;
        InteropCall[] calls;
        address[] executionAddresses;
        address cancellationAddress;
    }

    /// Gas parameters of an [InteropTrigger].
    #[derive(Debug, PartialEq, Eq, serde::Serialize)]
    struct GasFields {
        uint256 gasLimit;
        uint256 gasPerPubdataByteLimit;
        address refundRecipient;
    }

    /// A dispatch instruction for a pair of fee and execution bundles.
    #[derive(Debug, PartialEq, Eq, serde::Serialize)]
    struct InteropTrigger {
        uint256 destinationChainId;
        address from;
        address recipient;
        bytes32 feeBundleHash;
        bytes32 executionBundleHash;
        GasFields gasFields;
    }

    /// The L2 message carried by a [MessageInclusionProof].
    #[derive(Debug, PartialEq, Eq)]
    struct L2Message {
        uint16 txNumberInBatch;
        address sender;
        bytes data;
    }

    /// Proof that a message was included in a batch.
    #[derive(Debug, PartialEq, Eq)]
    struct MessageInclusionProof {
        uint256 chainId;
        uint256 l1BatchNumber;
        uint256 l2MessageIndex;
        L2Message message;
        bytes32[] proof;
    }

    /// `L1Messenger` event emitted for every L2 to L1 message.
    event L1MessageSent(address indexed _sender, bytes32 indexed _hash, bytes _message);

    /// Shared L2 bridge view used to resolve bridged token addresses.
    function l2TokenAddress(address _l1Token) external view returns (address);
}
