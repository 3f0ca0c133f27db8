//! Protocol module - wire primitives and call frames.
//!
//! This module implements the binary layout of procedure calls:
//! - Little-endian [`BufferWriter`] / [`BufferReader`] primitives
//! - [`FrameHeader`] with the call target
//! - [`encode_call`] / [`FrameReader`] for typed argument lists
//! - [`WireFrame`] for untyped inspection of raw slots

mod frame;
mod wire_format;

pub use frame::{decode_call, encode_call, DecodedCall, FrameHeader, FrameReader, ParameterSlot, WireFrame};
pub use wire_format::{
    BufferReader, BufferWriter, CHANNEL_PREFIX, DEFAULT_FRAME_BYTES_PER_PARAMETER,
    DEFAULT_SCRATCH_BUFFER_SIZE, MAX_PREALLOCATED_BYTES, TARGET_PREFIX_SIZE,
};
