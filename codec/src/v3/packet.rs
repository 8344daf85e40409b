// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use super::{
    ConnectAckPacket, ConnectPacket, DisconnectPacket, PingRequestPacket, PingResponsePacket,
    PublishAckPacket, PublishCompletePacket, PublishPacket, PublishReceivedPacket,
    PublishReleasePacket, SubscribeAckPacket, SubscribePacket, UnsubscribeAckPacket,
    UnsubscribePacket,
};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, PacketType, VarInt,
};

/// A control packet of any type.
///
/// This is the tagged union used wherever one end of a channel has to carry
/// packets of mixed types, and by the stream reader which does not know the
/// type of the next packet in advance.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnectAck(ConnectAckPacket),
    Publish(PublishPacket),
    PublishAck(PublishAckPacket),
    PublishReceived(PublishReceivedPacket),
    PublishRelease(PublishReleasePacket),
    PublishComplete(PublishCompletePacket),
    Subscribe(SubscribePacket),
    SubscribeAck(SubscribeAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubscribeAck(UnsubscribeAckPacket),
    PingRequest(PingRequestPacket),
    PingResponse(PingResponsePacket),
    Disconnect(DisconnectPacket),
}

impl Packet {
    /// Get packet type of inner packet.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        use crate::Packet as PacketTrait;
        match self {
            Self::Connect(p) => p.packet_type(),
            Self::ConnectAck(p) => p.packet_type(),
            Self::Publish(p) => p.packet_type(),
            Self::PublishAck(p) => p.packet_type(),
            Self::PublishReceived(p) => p.packet_type(),
            Self::PublishRelease(p) => p.packet_type(),
            Self::PublishComplete(p) => p.packet_type(),
            Self::Subscribe(p) => p.packet_type(),
            Self::SubscribeAck(p) => p.packet_type(),
            Self::Unsubscribe(p) => p.packet_type(),
            Self::UnsubscribeAck(p) => p.packet_type(),
            Self::PingRequest(p) => p.packet_type(),
            Self::PingResponse(p) => p.packet_type(),
            Self::Disconnect(p) => p.packet_type(),
        }
    }

    /// Probe `buf` for one complete packet frame.
    ///
    /// Returns `Ok(Some(total_len))` when the buffer starts with a complete
    /// packet of `total_len` bytes, `Ok(None)` when more bytes are required,
    /// and an error when the header itself is malformed. The probe never
    /// reads past the declared frame.
    ///
    /// # Errors
    ///
    /// Returns error if the type byte or the remaining length field
    /// is invalid.
    pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, DecodeError> {
        if buf.is_empty() {
            return Ok(None);
        }
        // Validate the type byte before waiting for more data, so a corrupt
        // stream is reported early.
        let _packet_type = PacketType::try_from(buf[0])?;

        let mut ba = ByteArray::new(buf);
        let _byte = ba.read_byte()?;
        let remaining_length = match VarInt::decode(&mut ba) {
            Ok(var_int) => var_int,
            Err(DecodeError::OutOfRange) => return Ok(None),
            Err(err) => return Err(err),
        };

        let total = 1 + remaining_length.bytes() + remaining_length.value();
        if buf.len() < total {
            Ok(None)
        } else {
            Ok(Some(total))
        }
    }
}

impl DecodePacket for Packet {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let packet_type = PacketType::try_from(ba.peek_byte()?)?;
        match packet_type {
            PacketType::Connect => ConnectPacket::decode(ba).map(Self::Connect),
            PacketType::ConnectAck => ConnectAckPacket::decode(ba).map(Self::ConnectAck),
            PacketType::Publish { .. } => PublishPacket::decode(ba).map(Self::Publish),
            PacketType::PublishAck => PublishAckPacket::decode(ba).map(Self::PublishAck),
            PacketType::PublishReceived => {
                PublishReceivedPacket::decode(ba).map(Self::PublishReceived)
            }
            PacketType::PublishRelease => {
                PublishReleasePacket::decode(ba).map(Self::PublishRelease)
            }
            PacketType::PublishComplete => {
                PublishCompletePacket::decode(ba).map(Self::PublishComplete)
            }
            PacketType::Subscribe => SubscribePacket::decode(ba).map(Self::Subscribe),
            PacketType::SubscribeAck => SubscribeAckPacket::decode(ba).map(Self::SubscribeAck),
            PacketType::Unsubscribe => UnsubscribePacket::decode(ba).map(Self::Unsubscribe),
            PacketType::UnsubscribeAck => {
                UnsubscribeAckPacket::decode(ba).map(Self::UnsubscribeAck)
            }
            PacketType::PingRequest => PingRequestPacket::decode(ba).map(Self::PingRequest),
            PacketType::PingResponse => PingResponsePacket::decode(ba).map(Self::PingResponse),
            PacketType::Disconnect => DisconnectPacket::decode(ba).map(Self::Disconnect),
        }
    }
}

impl EncodePacket for Packet {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        match self {
            Self::Connect(p) => p.encode(buf),
            Self::ConnectAck(p) => p.encode(buf),
            Self::Publish(p) => p.encode(buf),
            Self::PublishAck(p) => p.encode(buf),
            Self::PublishReceived(p) => p.encode(buf),
            Self::PublishRelease(p) => p.encode(buf),
            Self::PublishComplete(p) => p.encode(buf),
            Self::Subscribe(p) => p.encode(buf),
            Self::SubscribeAck(p) => p.encode(buf),
            Self::Unsubscribe(p) => p.encode(buf),
            Self::UnsubscribeAck(p) => p.encode(buf),
            Self::PingRequest(p) => p.encode(buf),
            Self::PingResponse(p) => p.encode(buf),
            Self::Disconnect(p) => p.encode(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PacketId, QoS};

    #[test]
    fn test_decode_dispatch() {
        let mut buf = Vec::new();
        let publish = PublishPacket::new("t/a", QoS::AtMostOnce, b"hi").unwrap();
        publish.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let packet = Packet::decode(&mut ba).unwrap();
        assert_eq!(packet, Packet::Publish(publish));
    }

    #[test]
    fn test_decode_concatenated_packets() {
        let mut buf = Vec::new();
        let ack = PublishAckPacket::new(PacketId::new(1));
        let ping = PingResponsePacket::new();
        ack.encode(&mut buf).unwrap();
        ping.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        assert_eq!(Packet::decode(&mut ba), Ok(Packet::PublishAck(ack)));
        assert_eq!(Packet::decode(&mut ba), Ok(Packet::PingResponse(ping)));
        assert_eq!(ba.remaining_bytes(), 0);
    }

    #[test]
    fn test_frame_len() {
        let mut buf = Vec::new();
        let publish = PublishPacket::new("t/a", QoS::AtMostOnce, b"hi").unwrap();
        publish.encode(&mut buf).unwrap();

        assert_eq!(Packet::frame_len(&buf), Ok(Some(buf.len())));
        // Truncated tail is not an error, just incomplete.
        assert_eq!(Packet::frame_len(&buf[..buf.len() - 1]), Ok(None));
        assert_eq!(Packet::frame_len(&buf[..1]), Ok(None));
        assert_eq!(Packet::frame_len(&[]), Ok(None));
    }

    #[test]
    fn test_frame_len_bad_type() {
        // Type 0 is reserved.
        assert_eq!(
            Packet::frame_len(&[0x00, 0x00]),
            Err(DecodeError::InvalidPacketType)
        );
    }
}
