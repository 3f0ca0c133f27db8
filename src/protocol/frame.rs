//! Procedure call frames.
//!
//! A frame carries one call: the target (object id, behaviour index, method
//! name) followed by the parameter count and one slot per parameter.
//!
//! Decoding is split in two so the receiver can resolve the method from the
//! header before it knows how to read the parameters:
//!
//! ```
//! use netcode_rpc::codec::{Args, Parameter};
//! use netcode_rpc::protocol::{encode_call, FrameHeader, FrameReader};
//!
//! let params = vec![Parameter::of::<i32>("x")];
//! let header = FrameHeader::new(7, 0, "PingServerRpc");
//! let bytes = encode_call(&header, &params, &Args::new().with(5i32), 1024, 128).unwrap();
//!
//! let mut reader = FrameReader::new(&bytes);
//! let peeked = reader.read_header().unwrap();
//! assert_eq!(peeked.method_name, "PingServerRpc");
//!
//! let args = reader.read_arguments(&peeked.method_name, &params).unwrap();
//! assert_eq!(args.get::<i32>(0), Some(&5));
//! ```

use bytes::Bytes;

use super::wire_format::{BufferReader, BufferWriter};
use crate::codec::{Args, Parameter};
use crate::error::{RpcError, Result};

/// Call target at the start of every frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub target_object_id: u64,
    /// Order index of the behaviour on its object.
    pub target_behaviour_id: u16,
    pub method_name: String,
}

impl FrameHeader {
    pub fn new(target_object_id: u64, target_behaviour_id: u16, method_name: impl Into<String>) -> Self {
        Self {
            target_object_id,
            target_behaviour_id,
            method_name: method_name.into(),
        }
    }

    pub fn encode_into(&self, out: &mut BufferWriter) -> Result<()> {
        out.write_u64(self.target_object_id)?;
        out.write_u16(self.target_behaviour_id)?;
        out.write_str(&self.method_name)
    }

    pub fn decode(reader: &mut BufferReader<'_>) -> Result<Self> {
        Ok(Self {
            target_object_id: reader.read_u64()?,
            target_behaviour_id: reader.read_u16()?,
            method_name: reader.read_string()?,
        })
    }
}

/// One raw argument slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSlot {
    pub payload: Option<Bytes>,
}

impl ParameterSlot {
    pub fn null() -> Self {
        Self { payload: None }
    }

    pub fn value(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: Some(payload.into()),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.payload.is_none()
    }
}

/// Frame with undecoded slot payloads.
///
/// Useful for inspecting traffic without knowing parameter types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub header: FrameHeader,
    pub slots: Vec<ParameterSlot>,
}

impl WireFrame {
    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.slots.len()
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut out = BufferWriter::new();
        self.header.encode_into(&mut out)?;
        out.write_i32(slot_count(self.slots.len())?)?;
        for slot in &self.slots {
            match &slot.payload {
                None => out.write_bool(true)?,
                Some(payload) => {
                    out.write_bool(false)?;
                    out.write_len_prefixed(payload)?;
                }
            }
        }
        Ok(out.freeze())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = BufferReader::new(bytes);
        let header = FrameHeader::decode(&mut reader)?;
        let count = read_count(&mut reader)?;

        let mut slots = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            if reader.read_bool()? {
                slots.push(ParameterSlot::null());
            } else {
                let payload = reader.read_len_prefixed()?;
                slots.push(ParameterSlot::value(Bytes::copy_from_slice(payload)));
            }
        }
        Ok(Self { header, slots })
    }
}

fn slot_count(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| RpcError::Protocol(format!("Too many parameters: {}", len)))
}

fn read_count(reader: &mut BufferReader<'_>) -> Result<usize> {
    let count = reader.read_i32()?;
    usize::try_from(count).map_err(|_| RpcError::Protocol(format!("Negative parameter count {}", count)))
}

/// Encode a complete call frame.
///
/// `(params + 1) * bytes_per_parameter` is only a capacity hint; oversized
/// values are clamped.
pub fn encode_call(
    header: &FrameHeader,
    params: &[Parameter],
    args: &Args,
    scratch_size: usize,
    bytes_per_parameter: usize,
) -> Result<Bytes> {
    if args.len() != params.len() {
        return Err(RpcError::ArgumentCount {
            method: header.method_name.clone(),
            supplied: args.len(),
            expected: params.len(),
        });
    }

    let hint = params.len().saturating_add(1).saturating_mul(bytes_per_parameter);
    let mut out = BufferWriter::with_capacity(hint);
    header.encode_into(&mut out)?;
    out.write_i32(slot_count(params.len())?)?;
    for (index, param) in params.iter().enumerate() {
        param.encode_slot(index, args.slot(index), scratch_size, &mut out)?;
    }

    tracing::trace!(
        method = %header.method_name,
        object = header.target_object_id,
        len = out.len(),
        "Encoded call frame"
    );
    Ok(out.freeze())
}

/// Cursor over an inbound frame that supports reading the header first.
#[derive(Debug, Clone)]
pub struct FrameReader<'a> {
    reader: BufferReader<'a>,
}

impl<'a> FrameReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: BufferReader::new(bytes),
        }
    }

    /// Read `(object id, behaviour id, method name)`.
    ///
    /// The cursor is left at the parameter count.
    pub fn read_header(&mut self) -> Result<FrameHeader> {
        FrameHeader::decode(&mut self.reader)
    }

    /// Read the parameter section against the resolved method's parameters.
    ///
    /// A count that differs from `params.len()` fails with
    /// [`RpcError::InconsistentParameterCount`] before any slot is read.
    pub fn read_arguments(&mut self, method: &str, params: &[Parameter]) -> Result<Args> {
        let sent = self.reader.read_i32()?;
        if sent < 0 {
            return Err(RpcError::Protocol(format!("Negative parameter count {}", sent)));
        }
        if sent as usize != params.len() {
            return Err(RpcError::InconsistentParameterCount {
                method: method.to_string(),
                sent,
                expected: params.len(),
            });
        }

        let mut args = Args::with_capacity(params.len());
        for param in params {
            args.push_slot(param.decode_slot(&mut self.reader)?);
        }
        Ok(args)
    }

    /// Current cursor position.
    #[inline]
    pub fn position(&self) -> usize {
        self.reader.position()
    }
}

/// Fully decoded call.
#[derive(Debug)]
pub struct DecodedCall {
    pub header: FrameHeader,
    pub args: Args,
}

/// Decode a call frame, resolving the parameter list from the header.
pub fn decode_call<'p, F>(bytes: &[u8], lookup: F) -> Result<DecodedCall>
where
    F: FnOnce(&FrameHeader) -> Result<&'p [Parameter]>,
{
    let mut reader = FrameReader::new(bytes);
    let header = reader.read_header()?;
    let params = lookup(&header)?;
    let args = reader.read_arguments(&header.method_name, params)?;
    Ok(DecodedCall { header, args })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TARGET_PREFIX_SIZE;

    fn ping_params() -> Vec<Parameter> {
        vec![Parameter::of::<i32>("x")]
    }

    #[test]
    fn test_ping_frame_layout() {
        let header = FrameHeader::new(3, 1, "PingServerRpc");
        let bytes = encode_call(&header, &ping_params(), &Args::new().with(9i32), 1024, 128).unwrap();

        let frame = WireFrame::decode(&bytes).unwrap();
        assert_eq!(frame.header, header);
        assert_eq!(frame.parameter_count(), 1);
        assert!(!frame.slots[0].is_null());

        // u64 + u16 + (u32 + 13 name bytes) + i32 count
        let mut r = BufferReader::new(&bytes);
        assert_eq!(r.read_u64().unwrap(), 3);
        assert_eq!(r.read_u16().unwrap(), 1);
        assert_eq!(r.read_string().unwrap(), "PingServerRpc");
        assert_eq!(r.read_i32().unwrap(), 1);
        assert!(!r.read_bool().unwrap());
    }

    #[derive(Default, Debug, PartialEq)]
    struct Tile(u16);

    impl crate::codec::NetworkSerializable for Tile {
        fn network_serialize(&self, writer: &mut BufferWriter) -> Result<()> {
            writer.write_u16(self.0)
        }

        fn network_deserialize(&mut self, reader: &mut BufferReader<'_>) -> Result<()> {
            self.0 = reader.read_u16()?;
            Ok(())
        }
    }

    #[test]
    fn test_huge_sizes_are_only_hints() {
        let params = vec![Parameter::network::<Tile>("tile"), Parameter::of::<i32>("x")];
        let header = FrameHeader::new(1, 0, "PlaceServerRpc");
        let args = Args::new().with(Tile(12)).with(-3i32);

        let bytes = encode_call(&header, &params, &args, usize::MAX, usize::MAX).unwrap();
        let mut frame = FrameReader::new(&bytes);
        frame.read_header().unwrap();
        let mut decoded = frame.read_arguments("PlaceServerRpc", &params).unwrap();
        assert_eq!(decoded.take::<Tile>(0), Some(Tile(12)));
        assert_eq!(decoded.get::<i32>(1), Some(&-3));
    }

    #[test]
    fn test_decode_call_resolves_params() {
        let params = vec![Parameter::of::<String>("who"), Parameter::of::<u64>("n")];
        let header = FrameHeader::new(10, 2, "GreetClientRpc");
        let args = Args::new().with_null().with(77u64);
        let bytes = encode_call(&header, &params, &args, 1024, 128).unwrap();

        let call = decode_call(&bytes, |h| {
            assert_eq!(h.method_name, "GreetClientRpc");
            Ok(&params[..])
        })
        .unwrap();

        assert_eq!(call.header.target_behaviour_id, 2);
        assert!(call.args.is_null(0));
        assert_eq!(call.args.get::<u64>(1), Some(&77));
    }

    #[test]
    fn test_lookup_failure_aborts() {
        let bytes = encode_call(&FrameHeader::new(1, 0, "Gone"), &[], &Args::new(), 1024, 128).unwrap();
        let err = decode_call(&bytes, |_| Err(RpcError::Protocol("no such method".into()))).unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[test]
    fn test_parameter_count_mismatch() {
        let header = FrameHeader::new(1, 0, "PingServerRpc");
        let bytes = encode_call(&header, &ping_params(), &Args::new().with(1i32), 1024, 128).unwrap();

        let two = vec![Parameter::of::<i32>("x"), Parameter::of::<i32>("y")];
        let mut reader = FrameReader::new(&bytes);
        let h = reader.read_header().unwrap();
        let err = reader.read_arguments(&h.method_name, &two).unwrap_err();
        assert!(matches!(
            err,
            RpcError::InconsistentParameterCount {
                sent: 1,
                expected: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_argument_count_checked_on_encode() {
        let err = encode_call(&FrameHeader::new(1, 0, "PingServerRpc"), &ping_params(), &Args::new(), 1024, 128)
            .unwrap_err();
        assert!(matches!(
            err,
            RpcError::ArgumentCount {
                supplied: 0,
                expected: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_header_peek_then_resume() {
        let header = FrameHeader::new(u64::MAX, u16::MAX, "X");
        let bytes = encode_call(&header, &ping_params(), &Args::new().with(-1i32), 1024, 128).unwrap();

        let mut reader = FrameReader::new(&bytes);
        let peeked = reader.read_header().unwrap();
        assert_eq!(peeked, header);
        assert_eq!(reader.position(), TARGET_PREFIX_SIZE + 4 + 1);

        let args = reader.read_arguments("X", &ping_params()).unwrap();
        assert_eq!(args.get::<i32>(0), Some(&-1));
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut w = BufferWriter::new();
        FrameHeader::new(1, 0, "M").encode_into(&mut w).unwrap();
        w.write_i32(-1).unwrap();
        let bytes = w.into_vec();

        assert!(matches!(WireFrame::decode(&bytes).unwrap_err(), RpcError::Protocol(_)));
        let mut reader = FrameReader::new(&bytes);
        reader.read_header().unwrap();
        assert!(matches!(
            reader.read_arguments("M", &[]).unwrap_err(),
            RpcError::Protocol(_)
        ));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut frame = WireFrame {
            header: FrameHeader::new(1, 0, "M"),
            slots: vec![ParameterSlot::null()],
        }
        .encode()
        .unwrap()
        .to_vec();
        frame.extend_from_slice(&[0xAA, 0xBB]);

        let decoded = WireFrame::decode(&frame).unwrap();
        assert_eq!(decoded.slots, vec![ParameterSlot::null()]);
    }

    #[test]
    fn test_truncated_frame() {
        let bytes = encode_call(&FrameHeader::new(1, 0, "PingServerRpc"), &ping_params(), &Args::new().with(1i32), 1024, 128)
            .unwrap();
        let cut = &bytes[..bytes.len() - 2];
        assert!(matches!(WireFrame::decode(cut).unwrap_err(), RpcError::Truncated { .. }));
    }
}
