// NTFS Reparse Point Support
// Query, create, and delete reparse point metadata through the
// filesystem's device-control interface. The reparse buffer is treated
// as an opaque tagged byte blob; tag-specific payload interpretation is
// left to callers.

pub mod buffer;
pub mod error;
pub mod ops;

pub use buffer::{
    ReparseGuid, ReparseGuidDataBuffer, MAXIMUM_REPARSE_DATA_BUFFER_SIZE,
    MAXIMUM_REPARSE_PAYLOAD_SIZE, REPARSE_DATA_BUFFER_HEADER_SIZE,
    REPARSE_GUID_DATA_BUFFER_HEADER_SIZE,
};
pub use error::{ReparseError, ReparseResult};
pub use ops::{
    create_reparse_point, delete_reparse_point, get_reparse_guid, get_reparse_tag,
    query_reparse_point, reparse_point_exists,
};
