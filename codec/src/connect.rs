// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::base::PROTOCOL_NAME;
use crate::connect_flags::ConnectFlags;
use crate::topic::PubTopic;
use crate::utils::validate_client_id;
use crate::{
    BinaryData, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader,
    Packet, PacketType, ProtocolLevel, QoS, StringData, VarIntError,
};

/// Will Message registered at connect time, published by the broker when
/// the session ends without a Disconnect packet.
#[derive(Clone, Debug, Default, PartialEq)]
struct LastWill {
    topic: PubTopic,
    message: BinaryData,
}

/// `ConnectPacket` is the first packet a client sends after the network
/// connection is established.
///
/// The variable header carries the protocol name `MQTT`, the protocol
/// level, the connect flags and the keep alive interval. The payload
/// starts with the client id, followed by the will topic/message,
/// username and password fields, each present iff the matching connect
/// flag is set.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectPacket {
    /// Protocol name can only be `MQTT`.
    protocol_name: StringData,

    protocol_level: ProtocolLevel,

    connect_flags: ConnectFlags,

    /// Time interval between two control packets, in seconds.
    ///
    /// If this value is nonzero and the broker receives nothing from the
    /// client within one and a half keep alive periods, the network
    /// connection is closed as if the network had failed [MQTT-3.1.2-24].
    keep_alive: u16,

    /// Identifies the session on the broker side. Generated by the client.
    client_id: StringData,

    will: Option<LastWill>,

    username: Option<StringData>,

    password: Option<BinaryData>,
}

impl ConnectPacket {
    /// Create a new connect packet with `client_id`.
    ///
    /// # Errors
    ///
    /// Returns error if `client_id` is invalid.
    pub fn new(client_id: &str) -> Result<Self, EncodeError> {
        validate_client_id(client_id).map_err(|_err| EncodeError::InvalidClientId)?;
        Ok(Self {
            protocol_name: StringData::from(PROTOCOL_NAME)?,
            protocol_level: ProtocolLevel::V311,
            keep_alive: 60,
            client_id: StringData::from(client_id)?,
            ..Self::default()
        })
    }

    #[must_use]
    #[inline]
    pub const fn protocol_level(&self) -> ProtocolLevel {
        self.protocol_level
    }

    pub fn set_connect_flags(&mut self, flags: ConnectFlags) -> &mut Self {
        self.connect_flags = flags;
        self
    }

    #[must_use]
    #[inline]
    pub const fn connect_flags(&self) -> &ConnectFlags {
        &self.connect_flags
    }

    pub fn set_keep_alive(&mut self, keep_alive: u16) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    #[inline]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    /// Update client id.
    ///
    /// # Errors
    ///
    /// Returns error if `client_id` is invalid.
    pub fn set_client_id(&mut self, client_id: &str) -> Result<&mut Self, EncodeError> {
        validate_client_id(client_id).map_err(|_err| EncodeError::InvalidClientId)?;
        self.client_id = StringData::from(client_id)?;
        Ok(self)
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        self.client_id.as_ref()
    }

    /// Update username value. An empty string removes the field.
    ///
    /// # Errors
    ///
    /// Returns error if `username` contains invalid chars or is too long.
    pub fn set_username(&mut self, username: &str) -> Result<&mut Self, EncodeError> {
        self.username = if username.is_empty() {
            None
        } else {
            Some(StringData::from(username)?)
        };
        Ok(self)
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_ref().map(AsRef::as_ref)
    }

    /// Update password value. An empty slice removes the field.
    ///
    /// # Errors
    ///
    /// Returns error if `password` is too long.
    pub fn set_password(&mut self, password: &[u8]) -> Result<&mut Self, EncodeError> {
        self.password = if password.is_empty() {
            None
        } else {
            Some(BinaryData::from_slice(password)?)
        };
        Ok(self)
    }

    #[must_use]
    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_ref().map(AsRef::as_ref)
    }

    /// Update will-topic. An empty topic removes the whole will.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is invalid.
    pub fn set_will_topic(&mut self, topic: &str) -> Result<&mut Self, EncodeError> {
        if topic.is_empty() {
            self.will = None;
            return Ok(self);
        }
        let topic = PubTopic::new(topic)?;
        match &mut self.will {
            Some(will) => will.topic = topic,
            None => {
                self.will = Some(LastWill {
                    topic,
                    message: BinaryData::new(),
                });
            }
        }
        Ok(self)
    }

    #[must_use]
    pub fn will_topic(&self) -> Option<&str> {
        self.will.as_ref().map(|will| will.topic.as_ref())
    }

    /// Update will-message. A will-topic must be set first.
    ///
    /// # Errors
    ///
    /// Returns error if no will-topic is set or `message` is too long.
    pub fn set_will_message(&mut self, message: &[u8]) -> Result<&mut Self, EncodeError> {
        let Some(will) = &mut self.will else {
            return Err(EncodeError::InvalidData);
        };
        will.message = BinaryData::from_slice(message)?;
        Ok(self)
    }

    #[must_use]
    pub fn will_message(&self) -> Option<&[u8]> {
        self.will.as_ref().map(|will| will.message.as_ref())
    }

    /// Connect flags as they go on the wire: the presence bits are derived
    /// from the optional fields, so the flag byte can never disagree with
    /// the payload.
    fn wire_flags(&self) -> ConnectFlags {
        let mut flags = self.connect_flags.clone();
        flags
            .set_will(self.will.is_some())
            .set_has_username(self.username.is_some())
            .set_has_password(self.password.is_some());
        if self.will.is_none() {
            flags.set_will_qos(QoS::AtMostOnce).set_will_retain(false);
        }
        flags
    }

    fn body_len(&self) -> usize {
        let mut len = self.protocol_name.bytes()
            + ProtocolLevel::bytes()
            + ConnectFlags::bytes()
            + 2 // keep_alive
            + self.client_id.bytes();
        if let Some(will) = &self.will {
            len += will.topic.bytes() + will.message.bytes();
        }
        if let Some(username) = &self.username {
            len += username.bytes();
        }
        if let Some(password) = &self.password {
            len += password.bytes();
        }
        len
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let mut body = Vec::with_capacity(self.body_len());

        self.protocol_name.encode(&mut body)?;
        self.protocol_level.encode(&mut body)?;
        self.wire_flags().encode(&mut body)?;
        body.extend_from_slice(&self.keep_alive.to_be_bytes());

        self.client_id.encode(&mut body)?;
        if let Some(will) = &self.will {
            will.topic.encode(&mut body)?;
            will.message.encode(&mut body)?;
        }
        if let Some(username) = &self.username {
            username.encode(&mut body)?;
        }
        if let Some(password) = &self.password {
            password.encode(&mut body)?;
        }

        let fixed_header = FixedHeader::new(PacketType::Connect, body.len())?;
        let header_len = fixed_header.encode(buf)?;
        buf.extend_from_slice(&body);
        Ok(header_len + body.len())
    }
}

impl DecodePacket for ConnectPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Connect {
            return Err(DecodeError::InvalidPacketType);
        }

        let protocol_name = StringData::decode(ba)?;
        if protocol_name.as_ref() != PROTOCOL_NAME {
            return Err(DecodeError::InvalidProtocolName);
        }
        let protocol_level = ProtocolLevel::try_from(ba.read_byte()?)?;
        // The broker only accepts level 4; 3 and 5 get a proper
        // `UnacceptedProtocol` reply from the caller.
        if protocol_level != ProtocolLevel::V311 {
            return Err(DecodeError::InvalidProtocolLevel);
        }

        let connect_flags = ConnectFlags::decode(ba)?;
        let keep_alive = ba.read_u16()?;

        let client_id = StringData::decode(ba).map_err(|_err| DecodeError::InvalidClientId)?;
        // If the Client supplies a zero-byte ClientId with CleanSession set
        // to 0, the Server MUST respond with a CONNACK return code 0x02
        // (Identifier rejected) and close the connection [MQTT-3.1.3-8].
        if client_id.is_empty() && !connect_flags.clean_session() {
            return Err(DecodeError::InvalidClientId);
        }

        let will = if connect_flags.will() {
            Some(LastWill {
                topic: PubTopic::decode(ba)?,
                message: BinaryData::decode(ba)?,
            })
        } else {
            None
        };
        let username = connect_flags
            .has_username()
            .then(|| StringData::decode(ba))
            .transpose()?;
        let password = connect_flags
            .has_password()
            .then(|| BinaryData::decode(ba))
            .transpose()?;

        Ok(Self {
            protocol_name,
            protocol_level,
            connect_flags,
            keep_alive,
            client_id,
            will,
            username,
            password,
        })
    }
}

impl Packet for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = FixedHeader::new(PacketType::Connect, self.body_len())?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() {
        // Clean-session connect, keep-alive 30, client id "bench-7".
        let buf: Vec<u8> = vec![
            0x10, 0x13, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x1e, 0x00, 0x07,
            b'b', b'e', b'n', b'c', b'h', b'-', b'7',
        ];
        let mut ba = ByteArray::new(&buf);
        let packet = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(packet.client_id(), "bench-7");
        assert_eq!(packet.keep_alive(), 30);
        assert!(packet.connect_flags().clean_session());
        assert!(packet.will_topic().is_none());
        assert!(packet.username().is_none());
    }

    #[test]
    fn test_encode() {
        let mut packet = ConnectPacket::new("bench-7").unwrap();
        let mut flags = ConnectFlags::default();
        flags.set_clean_session(true);
        packet.set_connect_flags(flags);
        packet.set_keep_alive(30);

        let mut buf = Vec::new();
        let written = packet.encode(&mut buf).unwrap();
        assert_eq!(written, buf.len());
        assert_eq!(
            &buf,
            &[
                0x10, 0x13, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x1e, 0x00,
                0x07, b'b', b'e', b'n', b'c', b'h', b'-', b'7',
            ]
        );
    }

    #[test]
    fn test_decode_empty_client_id() {
        // CONNECT, protocol level 4, clean-session, keep-alive 60,
        // zero-byte client id.
        let buf: Vec<u8> = vec![
            0x10, 0x0c, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x3c, 0x00, 0x00,
        ];
        let mut ba = ByteArray::new(&buf);
        let packet = ConnectPacket::decode(&mut ba).unwrap();
        assert!(packet.client_id().is_empty());
        assert!(packet.connect_flags().clean_session());
        assert_eq!(packet.keep_alive(), 60);

        // The same packet with clean-session unset must be rejected.
        let mut buf = buf;
        buf[9] = 0x00;
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            ConnectPacket::decode(&mut ba),
            Err(DecodeError::InvalidClientId)
        );
    }

    #[test]
    fn test_decode_rejects_unknown_protocol_level() {
        let buf: Vec<u8> = vec![
            0x10, 0x0c, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x05, 0x02, 0x00, 0x3c, 0x00, 0x00,
        ];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            ConnectPacket::decode(&mut ba),
            Err(DecodeError::InvalidProtocolLevel)
        );
    }

    #[test]
    fn test_decode_rejects_bad_protocol_name() {
        let buf: Vec<u8> = vec![
            0x10, 0x0c, 0x00, 0x04, b'M', b'Q', b'T', b'X', 0x04, 0x02, 0x00, 0x3c, 0x00, 0x00,
        ];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            ConnectPacket::decode(&mut ba),
            Err(DecodeError::InvalidProtocolName)
        );
    }

    #[test]
    fn test_round_trip_with_will() {
        let mut packet = ConnectPacket::new("sensor-17").unwrap();
        let mut flags = ConnectFlags::default();
        flags
            .set_clean_session(true)
            .set_will(true)
            .set_will_qos(QoS::AtLeastOnce);
        packet.set_connect_flags(flags);
        packet.set_will_topic("devices/sensor-17/state").unwrap();
        packet.set_will_message(b"offline").unwrap();
        packet.set_keep_alive(30);

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.will_topic(), Some("devices/sensor-17/state"));
        assert_eq!(decoded.will_message(), Some(&b"offline"[..]));
    }

    #[test]
    fn test_will_message_requires_topic() {
        let mut packet = ConnectPacket::new("sensor-18").unwrap();
        assert_eq!(
            packet.set_will_message(b"offline").err(),
            Some(EncodeError::InvalidData)
        );
    }

    #[test]
    fn test_round_trip_with_credentials() {
        let mut packet = ConnectPacket::new("gateway-3").unwrap();
        let mut flags = ConnectFlags::default();
        flags
            .set_clean_session(true)
            .set_has_username(true)
            .set_has_password(true);
        packet.set_connect_flags(flags);
        packet.set_username("operator").unwrap();
        packet.set_password(b"s3cret").unwrap();

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.username(), Some("operator"));
        assert_eq!(decoded.password(), Some(&b"s3cret"[..]));
    }
}
