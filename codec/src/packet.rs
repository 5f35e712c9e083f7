// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Tagged union over the twelve MQTT v3.1.1 control packet variants.

use crate::{
    ByteArray, ConnectAckPacket, ConnectPacket, DecodeError, DecodePacket, DisconnectPacket,
    EncodeError, EncodePacket, FixedHeader, Packet, PacketType, PingRequestPacket,
    PingResponsePacket, PublishAckPacket, PublishCompletePacket, PublishPacket,
    PublishReceivedPacket, PublishReleasePacket, SubscribeAckPacket, SubscribePacket,
    UnsubscribeAckPacket, UnsubscribePacket, VarIntError,
};

/// One decoded MQTT control packet.
///
/// Decoding dispatches on the type nibble of the fixed header; encoding is
/// variant specific.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, PartialEq)]
pub enum ControlPacket {
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

impl ControlPacket {
    /// Decode one complete frame from `ba`.
    ///
    /// `ba` must be positioned at the start of a fixed header. On success
    /// the cursor has consumed exactly the frame, even when the variant
    /// parser left trailing declared bytes untouched.
    ///
    /// # Errors
    ///
    /// - `Incomplete` when the buffer does not yet hold the whole frame;
    ///   read more bytes and call again.
    /// - `PacketOversize` when the declared remaining length exceeds
    ///   `max_packet_bytes`. Checked before the body is inspected, so no
    ///   body buffer is ever allocated for such a packet.
    /// - any other `DecodeError` when the frame is malformed.
    pub fn decode(ba: &mut ByteArray, max_packet_bytes: usize) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;

        if fixed_header.remaining_length() > max_packet_bytes {
            return Err(DecodeError::PacketOversize);
        }
        if ba.remaining_bytes() < fixed_header.remaining_length() {
            return Err(DecodeError::Incomplete);
        }

        // Variant parsers read their own fixed header.
        ba.reset_offset();

        // The whole frame is buffered at this point, so a cursor overrun
        // inside a variant parser means a length field disagrees with the
        // declared remaining length.
        let packet =
            Self::decode_body(ba, fixed_header.packet_type()).map_err(|err| match err {
                DecodeError::OutOfRange => DecodeError::InvalidRemainingLength,
                err => err,
            })?;

        // A parser running past the declared frame end means the length
        // fields disagree as well.
        let frame_len = fixed_header.bytes() + fixed_header.remaining_length();
        if ba.offset() > frame_len {
            return Err(DecodeError::InvalidRemainingLength);
        }
        if ba.offset() < frame_len {
            ba.read_bytes(frame_len - ba.offset())?;
        }

        Ok(packet)
    }

    fn decode_body(ba: &mut ByteArray, packet_type: PacketType) -> Result<Self, DecodeError> {
        Ok(match packet_type {
            PacketType::Connect => Self::Connect(ConnectPacket::decode(ba)?),
            PacketType::ConnectAck => Self::ConnectAck(ConnectAckPacket::decode(ba)?),
            PacketType::Publish { .. } => Self::Publish(PublishPacket::decode(ba)?),
            PacketType::PublishAck => Self::PublishAck(PublishAckPacket::decode(ba)?),
            PacketType::PublishReceived => {
                Self::PublishReceived(PublishReceivedPacket::decode(ba)?)
            }
            PacketType::PublishRelease => Self::PublishRelease(PublishReleasePacket::decode(ba)?),
            PacketType::PublishComplete => {
                Self::PublishComplete(PublishCompletePacket::decode(ba)?)
            }
            PacketType::Subscribe => Self::Subscribe(SubscribePacket::decode(ba)?),
            PacketType::SubscribeAck => Self::SubscribeAck(SubscribeAckPacket::decode(ba)?),
            PacketType::Unsubscribe => Self::Unsubscribe(UnsubscribePacket::decode(ba)?),
            PacketType::UnsubscribeAck => {
                Self::UnsubscribeAck(UnsubscribeAckPacket::decode(ba)?)
            }
            PacketType::PingRequest => Self::PingRequest(PingRequestPacket::decode(ba)?),
            PacketType::PingResponse => Self::PingResponse(PingResponsePacket::decode(ba)?),
            PacketType::Disconnect => Self::Disconnect(DisconnectPacket::decode(ba)?),
        })
    }
}

impl EncodePacket for ControlPacket {
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

impl Packet for ControlPacket {
    fn packet_type(&self) -> PacketType {
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

    fn bytes(&self) -> Result<usize, VarIntError> {
        match self {
            Self::Connect(p) => p.bytes(),
            Self::ConnectAck(p) => p.bytes(),
            Self::Publish(p) => p.bytes(),
            Self::PublishAck(p) => p.bytes(),
            Self::PublishReceived(p) => p.bytes(),
            Self::PublishRelease(p) => p.bytes(),
            Self::PublishComplete(p) => p.bytes(),
            Self::Subscribe(p) => p.bytes(),
            Self::SubscribeAck(p) => p.bytes(),
            Self::Unsubscribe(p) => p.bytes(),
            Self::UnsubscribeAck(p) => p.bytes(),
            Self::PingRequest(p) => p.bytes(),
            Self::PingResponse(p) => p.bytes(),
            Self::Disconnect(p) => p.bytes(),
        }
    }
}
