//! Network message markers.

/// Delivery priority hint for outbound messages.
///
/// Transports may use this to order sends under contention. Fee-sync
/// traffic is coordination: losing or delaying it degrades subsidy
/// accuracy but never safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePriority {
    /// Consensus-critical traffic.
    Consensus,
    /// Cross-shard coordination traffic.
    Coordination,
    /// Best-effort background traffic.
    Background,
}

/// Marker trait for types that travel between shards.
pub trait NetworkMessage: Sized {
    /// Stable identifier used for dispatch on the receiving side.
    fn message_type_id() -> &'static str;

    /// Delivery priority hint.
    fn priority() -> MessagePriority {
        MessagePriority::Coordination
    }
}
