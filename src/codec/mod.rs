//! Codec module - per-parameter serialization strategies.
//!
//! Every procedure parameter is bound to exactly one strategy when the
//! procedure is registered:
//!
//! - [`ParamCodec::SelfDescribing`] - the type implements [`NetworkSerializable`]
//!   and writes its own layout into a fixed scratch buffer
//! - [`ParamCodec::OpaqueGraph`] - the type is serde-serializable and is
//!   written with [`MsgPackCodec`]
//!
//! The strategy is resolved from the declared type on both peers, so nothing
//! about it travels on the wire. Each slot is written as an `is_null` byte
//! followed, for non-null values, by `(length: i32, bytes)`.
//!
//! # Example
//!
//! ```
//! use netcode_rpc::codec::{Args, Parameter};
//! use netcode_rpc::protocol::{BufferReader, BufferWriter};
//!
//! let param = Parameter::of::<i32>("x");
//! let args = Args::new().with(42i32);
//!
//! let mut out = BufferWriter::new();
//! param.encode_slot(0, args.slot(0), 1024, &mut out).unwrap();
//!
//! let bytes = out.into_vec();
//! let mut reader = BufferReader::new(&bytes);
//! let value = param.decode_slot(&mut reader).unwrap().unwrap();
//! assert_eq!(value.downcast_ref::<i32>(), Some(&42));
//! ```

mod args;
mod msgpack;
mod network;

use std::any::{type_name, Any, TypeId};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use args::{ArgValue, Args};
pub use msgpack::MsgPackCodec;
pub use network::NetworkSerializable;

use crate::error::{RpcError, Result};
use crate::protocol::{BufferReader, BufferWriter};

/// Type-erased encode/decode pair for one concrete parameter type.
#[derive(Clone, Copy)]
pub struct ErasedCodec {
    accepts: fn(&(dyn Any + Send)) -> bool,
    encode: fn(&(dyn Any + Send), usize) -> Result<Vec<u8>>,
    decode: fn(&[u8]) -> Result<ArgValue>,
}

impl ErasedCodec {
    /// True if `value` has the concrete type this codec was built for.
    #[inline]
    pub fn accepts(&self, value: &(dyn Any + Send)) -> bool {
        (self.accepts)(value)
    }

    /// Encode `value` to payload bytes.
    pub fn encode(&self, value: &(dyn Any + Send), scratch_size: usize) -> Result<Vec<u8>> {
        (self.encode)(value, scratch_size)
    }

    /// Decode payload bytes back into a boxed value.
    pub fn decode(&self, payload: &[u8]) -> Result<ArgValue> {
        (self.decode)(payload)
    }
}

/// Serialization strategy bound to a parameter at registration time.
#[derive(Clone, Copy)]
pub enum ParamCodec {
    /// Type writes itself into a fixed-size scratch buffer.
    SelfDescribing(ErasedCodec),
    /// Generic object-graph serializer (MessagePack).
    OpaqueGraph(ErasedCodec),
}

impl ParamCodec {
    /// Self-describing strategy for `T`.
    pub fn self_describing<T: NetworkSerializable + Send + 'static>() -> Self {
        ParamCodec::SelfDescribing(ErasedCodec {
            accepts: accepts::<T>,
            encode: encode_network::<T>,
            decode: decode_network::<T>,
        })
    }

    /// Opaque object-graph strategy for `T`.
    pub fn opaque<T: Serialize + DeserializeOwned + Send + 'static>() -> Self {
        ParamCodec::OpaqueGraph(ErasedCodec {
            accepts: accepts::<T>,
            encode: encode_opaque::<T>,
            decode: decode_opaque::<T>,
        })
    }

    #[inline]
    pub fn erased(&self) -> &ErasedCodec {
        match self {
            ParamCodec::SelfDescribing(c) | ParamCodec::OpaqueGraph(c) => c,
        }
    }

    #[inline]
    pub fn is_self_describing(&self) -> bool {
        matches!(self, ParamCodec::SelfDescribing(_))
    }
}

impl fmt::Debug for ParamCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamCodec::SelfDescribing(_) => f.write_str("SelfDescribing"),
            ParamCodec::OpaqueGraph(_) => f.write_str("OpaqueGraph"),
        }
    }
}

fn accepts<T: Any>(value: &(dyn Any + Send)) -> bool {
    value.is::<T>()
}

fn wrong_type<T>() -> RpcError {
    RpcError::Protocol(format!("Value is not a {}", type_name::<T>()))
}

fn encode_network<T: NetworkSerializable + Any>(value: &(dyn Any + Send), scratch_size: usize) -> Result<Vec<u8>> {
    let value = value.downcast_ref::<T>().ok_or_else(wrong_type::<T>)?;
    network::write_scratch(value, scratch_size)
}

fn decode_network<T: NetworkSerializable + Send + 'static>(payload: &[u8]) -> Result<ArgValue> {
    Ok(Box::new(network::read_scratch::<T>(payload)?))
}

fn encode_opaque<T: Serialize + Any>(value: &(dyn Any + Send), _scratch_size: usize) -> Result<Vec<u8>> {
    let value = value.downcast_ref::<T>().ok_or_else(wrong_type::<T>)?;
    MsgPackCodec::encode(value)
}

fn decode_opaque<T: DeserializeOwned + Send + 'static>(payload: &[u8]) -> Result<ArgValue> {
    Ok(Box::new(MsgPackCodec::decode::<T>(payload)?))
}

/// Types with a default strategy, usable with [`Parameter::of`].
///
/// Primitives, `String` and `Vec<T>` use the opaque strategy. Implement this
/// for your own types to pick a strategy once instead of at every
/// declaration.
pub trait RpcArgument: Send + 'static {
    fn param_codec() -> Option<ParamCodec>;
}

macro_rules! opaque_argument {
    ($($ty:ty),* $(,)?) => {
        $(
            impl RpcArgument for $ty {
                fn param_codec() -> Option<ParamCodec> {
                    Some(ParamCodec::opaque::<$ty>())
                }
            }
        )*
    };
}

opaque_argument!(bool, u8, i8, u16, i16, u32, i32, u64, i64, f32, f64, char, String);

impl<T: Serialize + DeserializeOwned + Send + 'static> RpcArgument for Vec<T> {
    fn param_codec() -> Option<ParamCodec> {
        Some(ParamCodec::opaque::<Vec<T>>())
    }
}

/// One declared parameter of a procedure.
#[derive(Clone)]
pub struct Parameter {
    name: String,
    type_name: &'static str,
    type_id: TypeId,
    codec: Option<ParamCodec>,
}

impl Parameter {
    /// Parameter using the type's [`RpcArgument`] strategy.
    pub fn of<T: RpcArgument>(name: impl Into<String>) -> Self {
        Self::with_codec::<T>(name, T::param_codec())
    }

    /// Self-describing parameter.
    pub fn network<T: NetworkSerializable + Send + 'static>(name: impl Into<String>) -> Self {
        Self::with_codec::<T>(name, Some(ParamCodec::self_describing::<T>()))
    }

    /// Opaque (MessagePack) parameter.
    pub fn opaque<T: Serialize + DeserializeOwned + Send + 'static>(name: impl Into<String>) -> Self {
        Self::with_codec::<T>(name, Some(ParamCodec::opaque::<T>()))
    }

    /// Parameter whose type has no strategy.
    ///
    /// Such a procedure still registers, but every non-null value for this
    /// slot fails with [`RpcError::NotSerializable`].
    pub fn unsupported<T: 'static>(name: impl Into<String>) -> Self {
        Self::with_codec::<T>(name, None)
    }

    fn with_codec<T: 'static>(name: impl Into<String>, codec: Option<ParamCodec>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            codec,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn codec(&self) -> Option<&ParamCodec> {
        self.codec.as_ref()
    }

    /// True if the declared type is `T`.
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    fn require_codec(&self) -> Result<&ErasedCodec> {
        self.codec
            .as_ref()
            .map(ParamCodec::erased)
            .ok_or_else(|| RpcError::NotSerializable {
                type_name: self.type_name,
                name: self.name.clone(),
            })
    }

    /// Write one argument slot.
    ///
    /// `index` is only used for error reporting.
    pub fn encode_slot(
        &self,
        index: usize,
        value: Option<&(dyn Any + Send)>,
        scratch_size: usize,
        out: &mut BufferWriter,
    ) -> Result<()> {
        let Some(value) = value else {
            return out.write_bool(true);
        };

        let codec = self.require_codec()?;
        if !codec.accepts(value) {
            return Err(RpcError::ArgumentTypeMismatch {
                index,
                name: self.name.clone(),
                expected: self.type_name,
            });
        }

        let payload = codec.encode(value, scratch_size)?;
        out.write_bool(false)?;
        out.write_len_prefixed(&payload)
    }

    /// Read one argument slot. Null slots decode to `None`.
    pub fn decode_slot(&self, reader: &mut BufferReader<'_>) -> Result<Option<ArgValue>> {
        if reader.read_bool()? {
            return Ok(None);
        }
        let payload = reader.read_len_prefixed()?;
        let codec = self.require_codec()?;
        codec.decode(payload).map(Some)
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("codec", &self.codec)
            .finish()
    }
}
