//! Control messages
//!
//! Fixed 32-byte messages sent from clients to their server over the named
//! control queue. The wire layout is kept bit-for-bit compatible with
//! earlier implementations:
//!
//! ```text
//! byte  0       options
//! byte  1       server id (target peer for remote operations)
//! byte  2       client id
//! bytes 3..28   buffer name, NUL padded
//! bytes 28..32  footer: u16 LE size (create) or IPv4 address (remote ops)
//! ```
//!
//! The footer is a union on the wire but an explicit enum here; application
//! logic never touches raw bytes.

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, BytesMut};

use super::constants::{CONTROL_MESSAGE_SIZE, MAX_NAME_SIZE};
use super::error::ProtoError;

/// Control message commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlOp {
    /// Create a local buffer streamed to its multicast group
    CreateLocal = 0,
    /// Begin replicating a buffer owned by another server
    FetchRemote = 1,
    /// Create a local buffer that is never streamed
    CreateLocalOnly = 2,
    /// Drop interest in a local buffer
    DisconnectLocal = 3,
    /// Drop interest in a remote buffer
    DisconnectRemote = 4,
    /// Drop all of a client's subscriptions
    DisconnectClient = 5,
    /// Announce a client, resetting any stale subscriptions it left behind
    ConnectClient = 6,
    /// Announce a client without touching existing state
    ConnectClientNoReset = 7,
}

impl TryFrom<u8> for ControlOp {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, ProtoError> {
        match value {
            0 => Ok(ControlOp::CreateLocal),
            1 => Ok(ControlOp::FetchRemote),
            2 => Ok(ControlOp::CreateLocalOnly),
            3 => Ok(ControlOp::DisconnectLocal),
            4 => Ok(ControlOp::DisconnectRemote),
            5 => Ok(ControlOp::DisconnectClient),
            6 => Ok(ControlOp::ConnectClient),
            7 => Ok(ControlOp::ConnectClientNoReset),
            other => Err(ProtoError::UnknownOption(other)),
        }
    }
}

/// Trailing field of a control message; which variant applies is determined
/// by the option byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Footer {
    /// No footer payload
    None,
    /// Requested buffer size (create operations)
    Size(u16),
    /// Owning peer's address (remote operations)
    Addr(Ipv4Addr),
}

/// A decoded control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub op: ControlOp,
    pub server_id: u8,
    pub client_id: u8,
    pub name: String,
    pub footer: Footer,
}

/// Check a buffer name against the protocol bound
pub fn validate_name(name: &str) -> Result<(), ProtoError> {
    if name.is_empty() {
        return Err(ProtoError::InvalidName("empty".into()));
    }
    if name.len() > MAX_NAME_SIZE {
        return Err(ProtoError::InvalidName(format!(
            "{} exceeds {} bytes",
            name, MAX_NAME_SIZE
        )));
    }
    Ok(())
}

impl ControlMessage {
    /// Encode into the fixed 32-byte wire layout
    ///
    /// Client-scope operations carry no name, so only the length bound is
    /// enforced here; buffer operations validate the name at the API edge.
    pub fn encode(&self) -> Result<BytesMut, ProtoError> {
        if self.name.len() > MAX_NAME_SIZE {
            return Err(ProtoError::InvalidName(format!(
                "{} exceeds {} bytes",
                self.name, MAX_NAME_SIZE
            )));
        }

        let mut buf = BytesMut::with_capacity(CONTROL_MESSAGE_SIZE);
        buf.put_u8(self.op as u8);
        buf.put_u8(self.server_id);
        buf.put_u8(self.client_id);
        buf.put_slice(self.name.as_bytes());
        buf.put_bytes(0, MAX_NAME_SIZE - self.name.len());
        match self.footer {
            Footer::None => buf.put_bytes(0, 4),
            Footer::Size(size) => {
                buf.put_u16_le(size);
                buf.put_bytes(0, 2);
            }
            Footer::Addr(addr) => buf.put_slice(&addr.octets()),
        }
        debug_assert_eq!(buf.len(), CONTROL_MESSAGE_SIZE);
        Ok(buf)
    }

    /// Decode from the fixed 32-byte wire layout
    pub fn decode(mut buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < CONTROL_MESSAGE_SIZE {
            return Err(ProtoError::Truncated {
                got: buf.len(),
                need: CONTROL_MESSAGE_SIZE,
            });
        }

        let op = ControlOp::try_from(buf.get_u8())?;
        let server_id = buf.get_u8();
        let client_id = buf.get_u8();

        let raw_name = &buf[..MAX_NAME_SIZE];
        let end = raw_name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_SIZE);
        let name = std::str::from_utf8(&raw_name[..end])
            .map_err(|_| ProtoError::InvalidName("not UTF-8".into()))?
            .to_owned();
        buf.advance(MAX_NAME_SIZE);

        let footer = match op {
            ControlOp::CreateLocal | ControlOp::CreateLocalOnly => Footer::Size(buf.get_u16_le()),
            ControlOp::FetchRemote | ControlOp::DisconnectRemote => {
                Footer::Addr(Ipv4Addr::new(buf.get_u8(), buf.get_u8(), buf.get_u8(), buf.get_u8()))
            }
            _ => Footer::None,
        };

        Ok(Self {
            op,
            server_id,
            client_id,
            name,
            footer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_round_trip() {
        let msg = ControlMessage {
            op: ControlOp::CreateLocal,
            server_id: 0,
            client_id: 3,
            name: "temp".into(),
            footer: Footer::Size(16),
        };

        let wire = msg.encode().unwrap();
        assert_eq!(wire.len(), CONTROL_MESSAGE_SIZE);

        let decoded = ControlMessage::decode(&wire).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_fetch_round_trip() {
        let msg = ControlMessage {
            op: ControlOp::FetchRemote,
            server_id: 2,
            client_id: 1,
            name: "telemetry".into(),
            footer: Footer::Addr(Ipv4Addr::new(10, 0, 0, 42)),
        };

        let wire = msg.encode().unwrap();
        let decoded = ControlMessage::decode(&wire).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_name_at_bound() {
        let name = "a".repeat(MAX_NAME_SIZE);
        let msg = ControlMessage {
            op: ControlOp::DisconnectLocal,
            server_id: 0,
            client_id: 0,
            name: name.clone(),
            footer: Footer::None,
        };

        let wire = msg.encode().unwrap();
        assert_eq!(ControlMessage::decode(&wire).unwrap().name, name);
    }

    #[test]
    fn test_name_over_bound_rejected() {
        let msg = ControlMessage {
            op: ControlOp::CreateLocal,
            server_id: 0,
            client_id: 0,
            name: "b".repeat(MAX_NAME_SIZE + 1),
            footer: Footer::Size(1),
        };

        assert!(matches!(msg.encode(), Err(ProtoError::InvalidName(_))));
    }

    #[test]
    fn test_client_scope_message_has_no_name() {
        let msg = ControlMessage {
            op: ControlOp::ConnectClient,
            server_id: 0,
            client_id: 7,
            name: String::new(),
            footer: Footer::None,
        };

        let wire = msg.encode().unwrap();
        assert_eq!(ControlMessage::decode(&wire).unwrap(), msg);
    }

    #[test]
    fn test_truncated_rejected() {
        let wire = [0u8; CONTROL_MESSAGE_SIZE - 1];
        assert!(matches!(
            ControlMessage::decode(&wire),
            Err(ProtoError::Truncated { .. })
        ));
    }

    #[test]
    fn test_unknown_option_rejected() {
        let mut wire = [0u8; CONTROL_MESSAGE_SIZE];
        wire[0] = 9;
        assert!(matches!(
            ControlMessage::decode(&wire),
            Err(ProtoError::UnknownOption(9))
        ));
    }
}
