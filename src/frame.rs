//! Fixed offset view over the ethernet II header of a captured frame
//!
//! ```text
//! 0                    6                    12                   14
//! |---6 byte dst mac---|---6 byte src mac---|--2 byte ethertype--|
//! ```
//!
//! Nothing past the header is decoded.

use bytes::Bytes;

use crate::control::{MacAddress, PortId, MIN_FRAME_SIZE};
use crate::error::FrameError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst_mac: MacAddress,
    pub src_mac: MacAddress,
    pub ether_type: u16,
}

impl EthernetHeader {
    /// Parse the header at the start of `data`.
    ///
    /// # Example
    /// ```
    /// use tapswitch::control::MacAddress;
    /// use tapswitch::frame::EthernetHeader;
    ///
    /// let data = hex::decode("ffffffffffff4a60b989d99a0806").unwrap();
    /// let header = EthernetHeader::parse(&data).unwrap();
    ///
    /// assert!(header.dst_mac.is_broadcast());
    /// assert_eq!(header.src_mac, MacAddress::new([0x4a, 0x60, 0xb9, 0x89, 0xd9, 0x9a]));
    /// assert_eq!(header.ether_type, 0x0806);
    ///
    /// assert!(EthernetHeader::parse(&data[..13]).is_err());
    /// ```
    pub fn parse(data: &[u8]) -> Result<EthernetHeader, FrameError> {
        if data.len() < MIN_FRAME_SIZE {
            return Err(FrameError::Malformed { len: data.len() });
        }

        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&data[0..6]);
        src.copy_from_slice(&data[6..12]);

        Ok(EthernetHeader {
            dst_mac: MacAddress::new(dst),
            src_mac: MacAddress::new(src),
            ether_type: u16::from_be_bytes([data[12], data[13]]),
        })
    }
}

#[derive(Clone, Debug)]
/// A captured frame on its way through one forwarding engine.
pub struct Frame {
    pub raw: Bytes,
    pub header: EthernetHeader,
    pub ingress: PortId,
}

impl Frame {
    pub fn parse(raw: Bytes, ingress: PortId) -> Result<Frame, FrameError> {
        let header = EthernetHeader::parse(&raw)?;
        Ok(Frame { raw, header, ingress })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_frame_ignores_payload() {
        let data = hex::decode("0001223344550001aabb00011234c0ffee").unwrap();
        let header = EthernetHeader::parse(&data).unwrap();
        assert_eq!(header.dst_mac, MacAddress::new([0x00, 0x01, 0x22, 0x33, 0x44, 0x55]));
        assert_eq!(header.src_mac, MacAddress::new([0x00, 0x01, 0xaa, 0xbb, 0x00, 0x01]));
        assert_eq!(header.ether_type, 0x1234);
    }

    #[test]
    fn test_parse_bare_header() {
        let data = hex::decode("0001223344550001aabb000186dd").unwrap();
        assert_eq!(EthernetHeader::parse(&data).unwrap().ether_type, 0x86dd);
    }

    #[test]
    fn test_short_input_is_malformed() {
        for len in [0usize, 1, 6, 12, 13] {
            let data = vec![0u8; len];
            assert_eq!(EthernetHeader::parse(&data), Err(FrameError::Malformed { len }));
        }
    }

    #[test]
    fn test_frame_keeps_raw_bytes_and_ingress() {
        let raw = Bytes::from(hex::decode("ffffffffffff0001aaaaaaff4321c0ff").unwrap());
        let frame = Frame::parse(raw.clone(), PortId::PortB).unwrap();
        assert_eq!(frame.raw, raw);
        assert_eq!(frame.ingress, PortId::PortB);
        assert_eq!(frame.header.ether_type, 0x4321);
    }
}
