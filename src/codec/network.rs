//! Self-describing parameter strategy.
//!
//! Types implementing [`NetworkSerializable`] write their own layout into a
//! fixed-size scratch buffer. On the receiving side a default instance is
//! created and asked to read itself back.

use crate::error::Result;
use crate::protocol::{BufferReader, BufferWriter};

/// A type that serializes itself field by field.
///
/// `Default` provides the zero-initialized instance the receiver fills in.
///
/// # Example
///
/// ```
/// use netcode_rpc::codec::NetworkSerializable;
/// use netcode_rpc::protocol::{BufferReader, BufferWriter};
/// use netcode_rpc::Result;
///
/// #[derive(Default, Debug, PartialEq)]
/// struct Position { x: f32, y: f32 }
///
/// impl NetworkSerializable for Position {
///     fn network_serialize(&self, writer: &mut BufferWriter) -> Result<()> {
///         writer.write_f32(self.x)?;
///         writer.write_f32(self.y)
///     }
///
///     fn network_deserialize(&mut self, reader: &mut BufferReader<'_>) -> Result<()> {
///         self.x = reader.read_f32()?;
///         self.y = reader.read_f32()?;
///         Ok(())
///     }
/// }
/// ```
pub trait NetworkSerializable: Default {
    /// Write this value.
    fn network_serialize(&self, writer: &mut BufferWriter) -> Result<()>;

    /// Overwrite this value from `reader`.
    fn network_deserialize(&mut self, reader: &mut BufferReader<'_>) -> Result<()>;
}

/// Serialize `value` into a scratch buffer of `scratch_size` bytes.
pub(crate) fn write_scratch<T: NetworkSerializable>(value: &T, scratch_size: usize) -> Result<Vec<u8>> {
    let mut scratch = BufferWriter::with_limit(scratch_size);
    value.network_serialize(&mut scratch)?;
    Ok(scratch.into_vec())
}

/// Reconstruct a `T` from captured bytes.
pub(crate) fn read_scratch<T: NetworkSerializable>(payload: &[u8]) -> Result<T> {
    let mut value = T::default();
    let mut reader = BufferReader::new(payload);
    value.network_deserialize(&mut reader)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;

    #[derive(Default, Debug, PartialEq)]
    struct Health {
        current: i32,
        max: i32,
        label: String,
    }

    impl NetworkSerializable for Health {
        fn network_serialize(&self, writer: &mut BufferWriter) -> Result<()> {
            writer.write_i32(self.current)?;
            writer.write_i32(self.max)?;
            writer.write_str(&self.label)
        }

        fn network_deserialize(&mut self, reader: &mut BufferReader<'_>) -> Result<()> {
            self.current = reader.read_i32()?;
            self.max = reader.read_i32()?;
            self.label = reader.read_string()?;
            Ok(())
        }
    }

    #[test]
    fn test_scratch_roundtrip() {
        let hp = Health {
            current: 40,
            max: 100,
            label: "player".into(),
        };
        let bytes = write_scratch(&hp, 1024).unwrap();
        assert_eq!(bytes.len(), 4 + 4 + 4 + 6);

        let back: Health = read_scratch(&bytes).unwrap();
        assert_eq!(back, hp);
    }

    #[test]
    fn test_scratch_overflow() {
        let hp = Health {
            current: 1,
            max: 1,
            label: "x".repeat(64),
        };
        let err = write_scratch(&hp, 16).unwrap_err();
        assert!(matches!(err, RpcError::BufferOverflow { capacity: 16, .. }));
    }

    #[test]
    fn test_short_payload_fails() {
        let err = read_scratch::<Health>(&[1, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, RpcError::Truncated { .. }));
    }
}
