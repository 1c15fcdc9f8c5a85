// Reparse point wire format
// Header layout is fixed by the platform and must match
// REPARSE_GUID_DATA_BUFFER byte for byte: tag, data length, reserved, guid,
// then the tag-specific payload.

use crate::error::{ReparseError, ReparseResult};

// Well-known reparse tags
pub const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA0000003;
pub const IO_REPARSE_TAG_SYMLINK: u32 = 0xA000000C;
pub const IO_REPARSE_TAG_APPEXECLINK: u32 = 0x8000001B;

/// Largest buffer the filesystem accepts for a reparse point, header included.
pub const MAXIMUM_REPARSE_DATA_BUFFER_SIZE: usize = 16 * 1024;

/// Size of the guid-bearing header: tag + data length + reserved + guid.
pub const REPARSE_GUID_DATA_BUFFER_HEADER_SIZE: usize = 24;

/// Size of the short header (no guid) the driver uses for Microsoft tags.
pub const REPARSE_DATA_BUFFER_HEADER_SIZE: usize = 8;

/// Largest payload that still fits under the platform maximum.
pub const MAXIMUM_REPARSE_PAYLOAD_SIZE: usize =
    MAXIMUM_REPARSE_DATA_BUFFER_SIZE - REPARSE_GUID_DATA_BUFFER_HEADER_SIZE;

/// Check if a tag is Microsoft-reserved (high bit set). Informational only;
/// tags are passed through to the driver unmodified either way.
pub fn is_microsoft_tag(tag: u32) -> bool {
    tag & 0x8000_0000 != 0
}

/// 128-bit reparse type id, laid out like a Windows GUID.
///
/// Only meaningful for third-party reparse points. Microsoft-defined tags
/// carry no guid; reading one back yields an implementation-defined value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReparseGuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl ReparseGuid {
    pub const NULL: ReparseGuid = ReparseGuid {
        data1: 0,
        data2: 0,
        data3: 0,
        data4: [0; 8],
    };

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Serialize in the on-disk order: three little-endian integer fields
    /// followed by the eight raw bytes.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&self.data1.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.data2.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.data3.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.data4);
        bytes
    }

    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        ReparseGuid {
            data1: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            data2: u16::from_le_bytes([bytes[4], bytes[5]]),
            data3: u16::from_le_bytes([bytes[6], bytes[7]]),
            data4: [
                bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14],
                bytes[15],
            ],
        }
    }
}

/// Decoded REPARSE_GUID_DATA_BUFFER: the structure exchanged with the
/// filesystem driver for get, set, and delete requests.
///
/// Constructed fresh for each call and discarded afterwards; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReparseGuidDataBuffer {
    pub tag: u32,
    pub guid: ReparseGuid,
    pub payload: Vec<u8>,
}

impl ReparseGuidDataBuffer {
    /// Build a full buffer, rejecting payloads that would overflow the
    /// platform maximum once the header is added.
    pub fn new(tag: u32, guid: ReparseGuid, payload: Vec<u8>) -> ReparseResult<Self> {
        if payload.len() > MAXIMUM_REPARSE_PAYLOAD_SIZE {
            return Err(ReparseError::InvalidArgument(format!(
                "reparse payload of {} bytes exceeds the {} byte maximum",
                payload.len(),
                MAXIMUM_REPARSE_PAYLOAD_SIZE
            )));
        }
        Ok(ReparseGuidDataBuffer { tag, guid, payload })
    }

    /// Header-only buffer with a null guid and zero payload length, as sent
    /// by the first delete attempt.
    pub fn header_only(tag: u32) -> Self {
        ReparseGuidDataBuffer {
            tag,
            guid: ReparseGuid::NULL,
            payload: Vec::new(),
        }
    }

    /// Encoded size: fixed header plus payload.
    pub fn encoded_len(&self) -> usize {
        REPARSE_GUID_DATA_BUFFER_HEADER_SIZE + self.payload.len()
    }

    /// Serialize into the exact wire layout the driver expects.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.tag.to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // reserved
        out.extend_from_slice(&self.guid.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a driver response.
    ///
    /// The driver answers FSCTL_GET_REPARSE_POINT with the short 8-byte
    /// header for Microsoft tags, so anything from 8 bytes up is accepted:
    /// the guid is zero-filled when the response stops before the guid
    /// field, and the payload is clamped to the bytes actually returned
    /// past the full header. Guid and payload are only trustworthy for the
    /// guid-bearing variant.
    pub fn decode(data: &[u8]) -> ReparseResult<Self> {
        if data.len() < REPARSE_DATA_BUFFER_HEADER_SIZE {
            return Err(ReparseError::InvalidArgument(format!(
                "reparse buffer of {} bytes is smaller than the {} byte header",
                data.len(),
                REPARSE_DATA_BUFFER_HEADER_SIZE
            )));
        }

        let tag = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let data_length = u16::from_le_bytes([data[4], data[5]]) as usize;

        let guid = if data.len() >= REPARSE_GUID_DATA_BUFFER_HEADER_SIZE {
            let mut guid_bytes = [0u8; 16];
            guid_bytes.copy_from_slice(&data[8..24]);
            ReparseGuid::from_bytes(&guid_bytes)
        } else {
            ReparseGuid::NULL
        };

        let payload = match data.get(REPARSE_GUID_DATA_BUFFER_HEADER_SIZE..) {
            Some(rest) => rest[..data_length.min(rest.len())].to_vec(),
            None => Vec::new(),
        };

        Ok(ReparseGuidDataBuffer { tag, guid, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_guid() -> ReparseGuid {
        ReparseGuid {
            data1: 0x11223344,
            data2: 0x5566,
            data3: 0x7788,
            data4: [0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00],
        }
    }

    #[test]
    fn test_guid_byte_layout() {
        let bytes = sample_guid().to_bytes();
        // Little-endian integer fields, raw trailing bytes
        assert_eq!(
            bytes,
            [
                0x44, 0x33, 0x22, 0x11, // data1
                0x66, 0x55, // data2
                0x88, 0x77, // data3
                0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00,
            ]
        );
        assert_eq!(ReparseGuid::from_bytes(&bytes), sample_guid());
    }

    #[test]
    fn test_null_guid() {
        assert!(ReparseGuid::NULL.is_null());
        assert!(!sample_guid().is_null());
        assert_eq!(ReparseGuid::default(), ReparseGuid::NULL);
    }

    #[test]
    fn test_encode_wire_layout() {
        let buffer = ReparseGuidDataBuffer::new(0x00000101, sample_guid(), vec![0x01, 0x02, 0x03])
            .expect("within limits");
        let encoded = buffer.encode();

        assert_eq!(encoded.len(), REPARSE_GUID_DATA_BUFFER_HEADER_SIZE + 3);
        assert_eq!(&encoded[0..4], &[0x01, 0x01, 0x00, 0x00]); // tag, LE
        assert_eq!(&encoded[4..6], &[0x03, 0x00]); // data length
        assert_eq!(&encoded[6..8], &[0x00, 0x00]); // reserved
        assert_eq!(&encoded[8..24], &sample_guid().to_bytes());
        assert_eq!(&encoded[24..], &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_header_only_is_header_sized() {
        let encoded = ReparseGuidDataBuffer::header_only(IO_REPARSE_TAG_MOUNT_POINT).encode();
        assert_eq!(encoded.len(), REPARSE_GUID_DATA_BUFFER_HEADER_SIZE);
        // Zero payload length, null guid
        assert_eq!(&encoded[4..6], &[0x00, 0x00]);
        assert!(encoded[8..24].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_round_trip() {
        let buffer =
            ReparseGuidDataBuffer::new(0x00000101, sample_guid(), vec![0xDE, 0xAD, 0xBE, 0xEF])
                .expect("within limits");
        let decoded = ReparseGuidDataBuffer::decode(&buffer.encode()).expect("decodes");
        assert_eq!(decoded, buffer);
    }

    #[test]
    fn test_payload_size_limit() {
        let max = ReparseGuidDataBuffer::new(
            0x101,
            ReparseGuid::NULL,
            vec![0u8; MAXIMUM_REPARSE_PAYLOAD_SIZE],
        );
        assert!(max.is_ok());
        assert_eq!(
            max.unwrap().encoded_len(),
            MAXIMUM_REPARSE_DATA_BUFFER_SIZE
        );

        let over = ReparseGuidDataBuffer::new(
            0x101,
            ReparseGuid::NULL,
            vec![0u8; MAXIMUM_REPARSE_PAYLOAD_SIZE + 1],
        );
        assert!(matches!(over, Err(ReparseError::InvalidArgument(_))));
    }

    #[test]
    fn test_decode_rejects_truncated_header() {
        let result = ReparseGuidDataBuffer::decode(&[0u8; REPARSE_DATA_BUFFER_HEADER_SIZE - 1]);
        assert!(matches!(result, Err(ReparseError::InvalidArgument(_))));
    }

    #[test]
    fn test_decode_short_microsoft_header() {
        // Microsoft tags come back with the 8-byte REPARSE_DATA_BUFFER
        // header; a zero-payload AF_UNIX socket is exactly 8 bytes.
        let mut data = [0u8; REPARSE_DATA_BUFFER_HEADER_SIZE];
        data[0..4].copy_from_slice(&0x80000023u32.to_le_bytes());

        let decoded = ReparseGuidDataBuffer::decode(&data).expect("decodes");
        assert_eq!(decoded.tag, 0x80000023);
        assert!(decoded.guid.is_null());
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_decode_between_short_and_full_header() {
        // Short-header response with trailing payload bytes but no guid
        // field: tag still decodes, guid is zero-filled.
        let mut data = vec![0u8; 16];
        data[0..4].copy_from_slice(&IO_REPARSE_TAG_SYMLINK.to_le_bytes());
        data[4..6].copy_from_slice(&8u16.to_le_bytes());

        let decoded = ReparseGuidDataBuffer::decode(&data).expect("decodes");
        assert_eq!(decoded.tag, IO_REPARSE_TAG_SYMLINK);
        assert!(decoded.guid.is_null());
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_decode_clamps_overlong_declared_length() {
        // Declared payload length larger than what the driver returned
        let mut data = vec![0u8; REPARSE_GUID_DATA_BUFFER_HEADER_SIZE + 2];
        data[0..4].copy_from_slice(&0xA000000Cu32.to_le_bytes());
        data[4..6].copy_from_slice(&100u16.to_le_bytes());
        data[24] = 0xAB;
        data[25] = 0xCD;

        let decoded = ReparseGuidDataBuffer::decode(&data).expect("decodes");
        assert_eq!(decoded.tag, IO_REPARSE_TAG_SYMLINK);
        assert_eq!(decoded.payload, vec![0xAB, 0xCD]);
    }

    #[test]
    fn test_microsoft_tag_detection() {
        assert!(is_microsoft_tag(IO_REPARSE_TAG_MOUNT_POINT));
        assert!(is_microsoft_tag(IO_REPARSE_TAG_SYMLINK));
        assert!(is_microsoft_tag(IO_REPARSE_TAG_APPEXECLINK));
        assert!(!is_microsoft_tag(0x00000101));
    }
}
