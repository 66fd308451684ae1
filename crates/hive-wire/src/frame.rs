//! Cluster frame header encode/decode
//!
//! A frame carries a frame-control byte, an optional 16-bit manufacturer code
//! (present iff the manufacturer-specific flag is set), an 8-bit sequence
//! number, an 8-bit command id and a variable payload. All multi-byte fields
//! are little-endian.

use crate::error::{Result, WireError};
use crate::stream::{WireReader, WireWriter};

/// Frame-control bit: command is cluster-specific (vs profile-wide).
pub const FC_CLUSTER_COMMAND: u8 = 0x01;
/// Frame-control bit: manufacturer code follows the control byte.
pub const FC_MANUFACTURER_SPECIFIC: u8 = 0x04;
/// Frame-control bit: direction is server-to-client.
pub const FC_DIRECTION_SERVER_TO_CLIENT: u8 = 0x08;
/// Frame-control bit: default response is disabled.
pub const FC_DISABLE_DEFAULT_RESPONSE: u8 = 0x10;

/// Direction of a cluster frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to server (requests from us towards the device).
    ClientToServer,
    /// Server to client (reports and responses from the device).
    ServerToClient,
}

/// A decoded cluster frame: header fields plus the raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw frame-control byte
    pub control: u8,
    /// Manufacturer code, present iff the manufacturer-specific flag is set
    pub manufacturer: Option<u16>,
    /// Transaction sequence number
    pub seq: u8,
    /// Command identifier
    pub command: u8,
    /// Command payload
    pub payload: Vec<u8>,
}

impl Frame {
    /// Decode a frame from raw bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(WireError::FrameTooShort(data.len()));
        }
        let mut r = WireReader::new(data);
        let control = r.read_u8();
        let manufacturer = if control & FC_MANUFACTURER_SPECIFIC != 0 {
            let code = r.read_u16();
            if !r.ok() {
                return Err(WireError::MissingManufacturerCode);
            }
            Some(code)
        } else {
            None
        };
        let seq = r.read_u8();
        let command = r.read_u8();
        if !r.ok() {
            return Err(WireError::FrameTooShort(data.len()));
        }
        let payload = data[r.position()..].to_vec();
        Ok(Self { control, manufacturer, seq, command, payload })
    }

    /// Encode the frame header and payload into wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(self.payload.len() + 5);
        let mut control = self.control;
        if self.manufacturer.is_some() {
            control |= FC_MANUFACTURER_SPECIFIC;
        }
        w.write_u8(control);
        if let Some(code) = self.manufacturer {
            w.write_u16(code);
        }
        w.write_u8(self.seq);
        w.write_u8(self.command);
        w.write_raw(&self.payload);
        w.into_bytes()
    }

    /// True if the command is cluster-specific.
    pub fn is_cluster_command(&self) -> bool {
        self.control & FC_CLUSTER_COMMAND != 0
    }

    /// True if the command is profile-wide (read/write/report/default-rsp).
    pub fn is_profile_command(&self) -> bool {
        !self.is_cluster_command()
    }

    /// Frame direction from the control byte.
    pub fn direction(&self) -> Direction {
        if self.control & FC_DIRECTION_SERVER_TO_CLIENT != 0 {
            Direction::ServerToClient
        } else {
            Direction::ClientToServer
        }
    }

    /// True if the sender asked us not to answer with a default response.
    pub fn default_response_disabled(&self) -> bool {
        self.control & FC_DISABLE_DEFAULT_RESPONSE != 0
    }
}

/// Builder for outbound frames.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    control: u8,
    manufacturer: Option<u16>,
    seq: u8,
    command: u8,
    payload: WireWriter,
}

impl FrameBuilder {
    pub fn new(seq: u8, command: u8) -> Self {
        Self { seq, command, ..Default::default() }
    }

    /// Mark the command cluster-specific.
    pub fn cluster_command(mut self) -> Self {
        self.control |= FC_CLUSTER_COMMAND;
        self
    }

    /// Set server-to-client direction.
    pub fn server_to_client(mut self) -> Self {
        self.control |= FC_DIRECTION_SERVER_TO_CLIENT;
        self
    }

    /// Suppress the default response.
    pub fn disable_default_response(mut self) -> Self {
        self.control |= FC_DISABLE_DEFAULT_RESPONSE;
        self
    }

    /// Attach a manufacturer code.
    pub fn manufacturer(mut self, code: u16) -> Self {
        self.manufacturer = Some(code);
        self
    }

    /// Append payload bytes through a writer closure.
    pub fn payload(mut self, f: impl FnOnce(&mut WireWriter)) -> Self {
        f(&mut self.payload);
        self
    }

    pub fn build(self) -> Frame {
        Frame {
            control: self.control,
            manufacturer: self.manufacturer,
            seq: self.seq,
            command: self.command,
            payload: self.payload.into_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let frame = FrameBuilder::new(0x42, 0x0A)
            .server_to_client()
            .disable_default_response()
            .payload(|w| {
                w.write_u16(0x050B);
                w.write_u8(0x29);
                w.write_i16(273);
            })
            .build();

        let bytes = frame.encode();
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded, frame);
        assert!(decoded.is_profile_command());
        assert_eq!(decoded.direction(), Direction::ServerToClient);
        assert!(decoded.default_response_disabled());
    }

    #[test]
    fn test_manufacturer_code() {
        let frame = FrameBuilder::new(1, 0x00)
            .cluster_command()
            .manufacturer(0x1135)
            .build();
        let bytes = frame.encode();
        // control, manu lo, manu hi, seq, cmd
        assert_eq!(bytes.len(), 5);
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded.manufacturer, Some(0x1135));
        assert!(decoded.is_cluster_command());
    }

    #[test]
    fn test_frame_too_short() {
        assert!(matches!(
            Frame::decode(&[0x00, 0x01]),
            Err(WireError::FrameTooShort(2))
        ));
    }

    #[test]
    fn test_missing_manufacturer_code() {
        // Manufacturer flag set but only three bytes total.
        assert!(Frame::decode(&[FC_MANUFACTURER_SPECIFIC, 0x01, 0x02]).is_err());
    }
}
