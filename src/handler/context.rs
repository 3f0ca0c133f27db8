//! Call-scoped invocation state.
//!
//! Every interception reads the origin of the call exactly once. Reading
//! resets it to [`Origin::LocalCall`], so an arrival can never leak into a
//! later, unrelated call that happens to reuse the same context.
//!
//! # Example
//!
//! ```
//! use netcode_rpc::handler::{InvocationContext, Origin};
//! use netcode_rpc::protocol::FrameReader;
//!
//! let bytes = [0u8; 0];
//! let mut ctx = InvocationContext::arrival(3, FrameReader::new(&bytes));
//! assert!(ctx.is_network_arrival());
//!
//! assert!(matches!(ctx.take_origin(), Origin::NetworkArrival(_)));
//! // Consumed: the next read is a local call
//! assert!(matches!(ctx.take_origin(), Origin::LocalCall));
//! ```

use std::mem;

use crate::protocol::FrameReader;
use crate::spawn::BehaviourRef;
use crate::transport::ClientId;

/// A received frame waiting to be decoded by the interception point.
#[derive(Debug, Clone)]
pub struct Arrival<'a> {
    pub sender: ClientId,
    /// Positioned right after the frame header.
    pub frame: FrameReader<'a>,
}

/// Which path triggered an interception.
#[derive(Debug, Clone, Default)]
pub enum Origin<'a> {
    /// User code called the procedure.
    #[default]
    LocalCall,
    /// A frame arrived and is replaying the call.
    NetworkArrival(Arrival<'a>),
}

/// State threaded from the caller (or the inbound handler) into the
/// interception point.
#[derive(Debug, Default)]
pub struct InvocationContext<'a> {
    origin: Origin<'a>,
}

impl<'a> InvocationContext<'a> {
    /// Context for a call made by local code.
    pub fn local() -> Self {
        Self::default()
    }

    /// Context for replaying a received frame.
    pub fn arrival(sender: ClientId, frame: FrameReader<'a>) -> Self {
        Self {
            origin: Origin::NetworkArrival(Arrival { sender, frame }),
        }
    }

    /// Read the origin and reset it to [`Origin::LocalCall`].
    #[inline]
    pub fn take_origin(&mut self) -> Origin<'a> {
        mem::take(&mut self.origin)
    }

    #[inline]
    pub fn is_network_arrival(&self) -> bool {
        matches!(self.origin, Origin::NetworkArrival(_))
    }
}

/// What a procedure body is told about the call it is running for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallInfo {
    pub target: BehaviourRef,
    /// Client that sent the frame.
    pub sender: ClientId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_is_default() {
        let mut ctx = InvocationContext::local();
        assert!(!ctx.is_network_arrival());
        assert!(matches!(ctx.take_origin(), Origin::LocalCall));
    }

    #[test]
    fn test_arrival_is_consumed_once() {
        let bytes = [1u8, 2, 3];
        let mut ctx = InvocationContext::arrival(7, FrameReader::new(&bytes));

        match ctx.take_origin() {
            Origin::NetworkArrival(arrival) => assert_eq!(arrival.sender, 7),
            Origin::LocalCall => panic!("expected arrival"),
        }
        assert!(!ctx.is_network_arrival());
        assert!(matches!(ctx.take_origin(), Origin::LocalCall));
    }
}
