//! Server-to-server datagrams
//!
//! Three fixed-layout datagram kinds flow between peer servers on the
//! request port:
//!
//! ```text
//! request:  [0, requester_server_id, name_len, name...]
//! ack:      [1, acking_server_id, name_len,
//!            buffer_len: u16 LE, mcast_addr: 4 octets, mcast_port: u16 LE,
//!            name...]
//! sentinel: [0xFF]
//! ```
//!
//! The sentinel exists only to unblock the receiver during shutdown; it is
//! recognized and discarded, never acted on.

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, BytesMut};

use super::constants::{
    DISCRIMINATOR_ACK, DISCRIMINATOR_REQUEST, DISCRIMINATOR_SENTINEL, MAX_NAME_SIZE,
};
use super::control::validate_name;
use super::error::ProtoError;

/// A decoded peer datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    /// Ask the owning server to announce a buffer's multicast coordinates
    Request { server_id: u8, name: String },
    /// The owning server's announcement of size and multicast coordinates
    Ack {
        server_id: u8,
        buffer_len: u16,
        multicast_addr: Ipv4Addr,
        multicast_port: u16,
        name: String,
    },
    /// Shutdown sentinel; ignored by the receive path
    Sentinel,
}

impl Datagram {
    /// Encode to wire bytes
    pub fn encode(&self) -> Result<BytesMut, ProtoError> {
        match self {
            Datagram::Request { server_id, name } => {
                validate_name(name)?;
                let mut buf = BytesMut::with_capacity(3 + name.len());
                buf.put_u8(DISCRIMINATOR_REQUEST);
                buf.put_u8(*server_id);
                buf.put_u8(name.len() as u8);
                buf.put_slice(name.as_bytes());
                Ok(buf)
            }
            Datagram::Ack {
                server_id,
                buffer_len,
                multicast_addr,
                multicast_port,
                name,
            } => {
                validate_name(name)?;
                let mut buf = BytesMut::with_capacity(11 + name.len());
                buf.put_u8(DISCRIMINATOR_ACK);
                buf.put_u8(*server_id);
                buf.put_u8(name.len() as u8);
                buf.put_u16_le(*buffer_len);
                buf.put_slice(&multicast_addr.octets());
                buf.put_u16_le(*multicast_port);
                buf.put_slice(name.as_bytes());
                Ok(buf)
            }
            Datagram::Sentinel => {
                let mut buf = BytesMut::with_capacity(1);
                buf.put_u8(DISCRIMINATOR_SENTINEL);
                Ok(buf)
            }
        }
    }

    /// Decode from wire bytes
    pub fn decode(mut buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.is_empty() {
            return Err(ProtoError::Truncated { got: 0, need: 1 });
        }
        match buf.get_u8() {
            DISCRIMINATOR_REQUEST => {
                if buf.len() < 2 {
                    return Err(ProtoError::Truncated {
                        got: buf.len() + 1,
                        need: 3,
                    });
                }
                let server_id = buf.get_u8();
                let name = take_name(&mut buf)?;
                Ok(Datagram::Request { server_id, name })
            }
            DISCRIMINATOR_ACK => {
                if buf.len() < 10 {
                    return Err(ProtoError::Truncated {
                        got: buf.len() + 1,
                        need: 11,
                    });
                }
                let server_id = buf.get_u8();
                let name_len = buf.get_u8();
                let buffer_len = buf.get_u16_le();
                let multicast_addr =
                    Ipv4Addr::new(buf.get_u8(), buf.get_u8(), buf.get_u8(), buf.get_u8());
                let multicast_port = buf.get_u16_le();
                let name = read_name(buf, name_len)?;
                Ok(Datagram::Ack {
                    server_id,
                    buffer_len,
                    multicast_addr,
                    multicast_port,
                    name,
                })
            }
            DISCRIMINATOR_SENTINEL => Ok(Datagram::Sentinel),
            other => Err(ProtoError::UnknownDiscriminator(other)),
        }
    }
}

fn take_name(buf: &mut &[u8]) -> Result<String, ProtoError> {
    let len = buf.get_u8();
    read_name(buf, len)
}

fn read_name(buf: &[u8], len: u8) -> Result<String, ProtoError> {
    let len = len as usize;
    if len == 0 || len > MAX_NAME_SIZE {
        return Err(ProtoError::InvalidName(format!("length {}", len)));
    }
    if buf.len() < len {
        return Err(ProtoError::Truncated {
            got: buf.len(),
            need: len,
        });
    }
    std::str::from_utf8(&buf[..len])
        .map(str::to_owned)
        .map_err(|_| ProtoError::InvalidName("not UTF-8".into()))
}
