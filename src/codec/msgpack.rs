//! MsgPack codec using `rmp-serde`.
//!
//! This is the opaque object-graph strategy: any parameter type that is
//! serde-serializable but does not describe its own wire layout is encoded
//! here.
//!
//! Structs are written with `to_vec_named` (struct-as-map), so fields are
//! matched by name on decode.
//!
//! # Example
//!
//! ```
//! use netcode_rpc::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Loadout {
//!     slot: u32,
//!     item: String,
//! }
//!
//! let msg = Loadout { slot: 2, item: "shovel".to_string() };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: Loadout = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use crate::error::Result;

/// MessagePack codec for opaque parameter values.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Emote {
        slot: u8,
        label: String,
        looping: bool,
    }

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct EmoteV2 {
        slot: u8,
        label: String,
        looping: bool,
        #[serde(default)]
        speed: Option<f32>,
    }

    #[test]
    fn test_struct_parameter() {
        let wave = Emote {
            slot: 3,
            label: "wave".to_string(),
            looping: true,
        };
        let bytes = MsgPackCodec::encode(&wave).unwrap();
        assert_eq!(MsgPackCodec::decode::<Emote>(&bytes).unwrap(), wave);
    }

    #[test]
    fn test_struct_is_written_as_map() {
        let bytes = MsgPackCodec::encode(&Emote {
            slot: 0,
            label: String::new(),
            looping: false,
        })
        .unwrap();
        // fixmap with 3 entries, not fixarray (0x93)
        assert_eq!(bytes[0], 0x83, "Expected fixmap, got {:02X}", bytes[0]);
    }

    #[test]
    fn test_added_field_tolerated_by_name() {
        let bytes = MsgPackCodec::encode(&Emote {
            slot: 1,
            label: "bow".to_string(),
            looping: false,
        })
        .unwrap();
        let newer: EmoteV2 = MsgPackCodec::decode(&bytes).unwrap();
        assert_eq!(newer.label, "bow");
        assert_eq!(newer.speed, None);
    }

    #[test]
    fn test_argument_primitives() {
        let health: i32 = -40;
        let bytes = MsgPackCodec::encode(&health).unwrap();
        assert_eq!(MsgPackCodec::decode::<i32>(&bytes).unwrap(), health);

        let ids: Vec<u64> = vec![7, 8, 9];
        let bytes = MsgPackCodec::encode(&ids).unwrap();
        assert_eq!(MsgPackCodec::decode::<Vec<u64>>(&bytes).unwrap(), ids);

        let bytes = MsgPackCodec::encode("lobby").unwrap();
        assert_eq!(MsgPackCodec::decode::<String>(&bytes).unwrap(), "lobby");
    }

    #[test]
    fn test_wrong_type_is_decode_error() {
        let bytes = MsgPackCodec::encode("not an emote").unwrap();
        let err = MsgPackCodec::decode::<Emote>(&bytes).unwrap_err();
        assert!(matches!(err, crate::error::RpcError::MsgPackDecode(_)));
    }

    #[test]
    fn test_binary_blob_uses_bin_format() {
        let blob = [0xde_u8, 0xad, 0xbe, 0xef];
        let bytes = MsgPackCodec::encode(&serde_bytes::Bytes::new(&blob)).unwrap();
        // bin8
        assert_eq!(bytes[0], 0xc4);

        let decoded: serde_bytes::ByteBuf = MsgPackCodec::decode(&bytes).unwrap();
        assert_eq!(decoded.as_ref(), &blob);
    }
}
