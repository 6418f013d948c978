//! Wire frames and their bincode codec.
//!
//! Decoding is bounded by [`MAX_FRAME_BYTES`] so a hostile length prefix
//! cannot force a large allocation on the authority.

use bincode::Options;
use inventory_core::{ReplicationDelta, ServerRequest};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::Result;

/// Upper bound on one encoded frame.
pub const MAX_FRAME_BYTES: u64 = 1 << 20;

/// Client → authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientFrame {
    Request(ServerRequest),
    /// Every delta up to `sequence` has been applied.
    Ack { sequence: u64 },
}

/// Authority → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerFrame {
    Delta(ReplicationDelta),
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_FRAME_BYTES)
}

pub fn encode<T: Serialize>(frame: &T) -> Result<Vec<u8>> {
    Ok(options().serialize(frame)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(options().deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_core::{ContainerId, ControllerId, ItemId, Transaction};

    #[test]
    fn request_frames_survive_the_codec() {
        let frame = ClientFrame::Request(ServerRequest {
            controller: ControllerId(4),
            transaction: Transaction::RemoveItem {
                container: ContainerId(1),
                item: ItemId(9),
            },
        });
        let bytes = encode(&frame).unwrap();
        assert_eq!(decode::<ClientFrame>(&bytes).unwrap(), frame);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode::<ClientFrame>(&[0xff, 0xff, 0xff, 0xff, 0x01]).is_err());
        assert!(decode::<ServerFrame>(&[]).is_err());
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        // variant 0 (Delta) followed by a huge vector length
        let mut bytes = 0u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(decode::<ServerFrame>(&bytes).is_err());
    }
}
