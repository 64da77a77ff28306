//! FastDFS wire format.
//!
//! Every packet starts with a 10 byte header: body length (big-endian i64),
//! command byte, status byte. Replies use command 100 and carry an errno in
//! the status byte. Strings in fixed-width fields are NUL padded.

use bytes::{Buf, BufMut, BytesMut};
use chrono::DateTime;

use fdfs_common::object::{Attribute, AttributeSet, ObjectId, ObjectInfo};
use fdfs_common::BackendError;

pub const HEADER_LEN: usize = 10;
pub const GROUP_NAME_MAX_LEN: usize = 16;
pub const FILE_EXT_NAME_MAX_LEN: usize = 6;
pub const IP_ADDRESS_SIZE: usize = 16;

/// group + ip (without trailing NUL) + port + store path index
pub const QUERY_STORE_BODY_LEN: usize = GROUP_NAME_MAX_LEN + IP_ADDRESS_SIZE - 1 + 8 + 1;
/// size + create timestamp + crc32 + source ip
pub const FILE_INFO_BODY_LEN: usize = 3 * 8 + IP_ADDRESS_SIZE;

pub const RECORD_SEPARATOR: u8 = 0x01;
pub const FIELD_SEPARATOR: u8 = 0x02;
pub const METADATA_OVERWRITE: u8 = b'O';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    UploadFile = 11,
    DeleteFile = 12,
    SetMetadata = 13,
    DownloadFile = 14,
    GetMetadata = 15,
    QueryFileInfo = 22,
    Quit = 82,
    Response = 100,
    QueryStoreWithoutGroup = 101,
    QueryStoreWithGroup = 104,
}

impl Command {
    pub fn from_code(code: u8) -> Option<Self> {
        let cmd = match code {
            11 => Command::UploadFile,
            12 => Command::DeleteFile,
            13 => Command::SetMetadata,
            14 => Command::DownloadFile,
            15 => Command::GetMetadata,
            22 => Command::QueryFileInfo,
            82 => Command::Quit,
            100 => Command::Response,
            101 => Command::QueryStoreWithoutGroup,
            104 => Command::QueryStoreWithGroup,
            _ => return None,
        };
        Some(cmd)
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub body_len: u64,
    pub cmd: u8,
    pub status: u8,
}

impl Header {
    pub fn request(cmd: Command, body_len: usize) -> Self {
        Self {
            body_len: body_len as u64,
            cmd: cmd.code(),
            status: 0,
        }
    }

    pub fn response(status: u8, body_len: usize) -> Self {
        Self {
            body_len: body_len as u64,
            cmd: Command::Response.code(),
            status,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..8].copy_from_slice(&(self.body_len as i64).to_be_bytes());
        out[8] = self.cmd;
        out[9] = self.status;
        out
    }

    pub fn decode(raw: &[u8; HEADER_LEN]) -> Result<Self, BackendError> {
        let mut buf = &raw[..];
        let len = buf.get_i64();
        let body_len = u64::try_from(len)
            .map_err(|_| BackendError::Protocol(format!("negative body length {}", len)))?;
        Ok(Self {
            body_len,
            cmd: buf.get_u8(),
            status: buf.get_u8(),
        })
    }
}

/// Storage node handed out by a tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageNode {
    pub group: String,
    pub ip: String,
    pub port: u16,
    pub store_path_index: u8,
}

impl StorageNode {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

// ── Field helpers ──

/// Write `value` into a fixed-width NUL padded field, truncating on overflow.
pub fn put_fixed(buf: &mut BytesMut, value: &str, width: usize) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(width);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, width - n);
}

pub fn get_fixed(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).trim().to_string()
}

fn check_group(group: &str) -> Result<(), BackendError> {
    if group.is_empty() || group.len() > GROUP_NAME_MAX_LEN {
        return Err(BackendError::InvalidArgument(format!(
            "group name must be 1 to {} bytes: {:?}",
            GROUP_NAME_MAX_LEN, group
        )));
    }
    Ok(())
}

fn expect_len(body: &[u8], expected: usize, what: &str) -> Result<(), BackendError> {
    if body.len() != expected {
        return Err(BackendError::Protocol(format!(
            "{} reply is {} bytes, expected {}",
            what,
            body.len(),
            expected
        )));
    }
    Ok(())
}

// ── Metadata ──

pub fn encode_metadata(attributes: &[Attribute]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, attr) in attributes.iter().enumerate() {
        if i > 0 {
            out.push(RECORD_SEPARATOR);
        }
        out.extend_from_slice(attr.name.as_bytes());
        out.push(FIELD_SEPARATOR);
        out.extend_from_slice(attr.value.as_bytes());
    }
    out
}

pub fn decode_metadata(buf: &[u8]) -> AttributeSet {
    buf.split(|&b| b == RECORD_SEPARATOR)
        .filter(|record| !record.is_empty())
        .map(|record| {
            let mut fields = record.splitn(2, |&b| b == FIELD_SEPARATOR);
            let name = fields.next().unwrap_or_default();
            let value = fields.next().unwrap_or_default();
            Attribute::new(
                String::from_utf8_lossy(name),
                String::from_utf8_lossy(value),
            )
        })
        .collect()
}

// ── Request bodies ──

pub fn query_store_request(group: Option<&str>) -> Result<(Command, BytesMut), BackendError> {
    match group {
        Some(group) => {
            check_group(group)?;
            let mut body = BytesMut::with_capacity(GROUP_NAME_MAX_LEN);
            put_fixed(&mut body, group, GROUP_NAME_MAX_LEN);
            Ok((Command::QueryStoreWithGroup, body))
        }
        None => Ok((Command::QueryStoreWithoutGroup, BytesMut::new())),
    }
}

/// Everything in an upload body that precedes the file content.
pub fn upload_prefix(store_path_index: u8, ext: &str, content_len: usize) -> BytesMut {
    let mut body = BytesMut::with_capacity(1 + 8 + FILE_EXT_NAME_MAX_LEN);
    body.put_u8(store_path_index);
    body.put_i64(content_len as i64);
    put_fixed(&mut body, ext, FILE_EXT_NAME_MAX_LEN);
    body
}

/// `group(16) path`, the body of delete, get-metadata and query-file-info.
pub fn object_body(id: &ObjectId) -> Result<BytesMut, BackendError> {
    check_group(&id.group)?;
    let mut body = BytesMut::with_capacity(GROUP_NAME_MAX_LEN + id.path.len());
    put_fixed(&mut body, &id.group, GROUP_NAME_MAX_LEN);
    body.put_slice(id.path.as_bytes());
    Ok(body)
}

/// Whole-file download: offset 0, length 0.
pub fn download_body(id: &ObjectId) -> Result<BytesMut, BackendError> {
    let object = object_body(id)?;
    let mut body = BytesMut::with_capacity(16 + object.len());
    body.put_i64(0);
    body.put_i64(0);
    body.put_slice(&object);
    Ok(body)
}

pub fn set_metadata_body(id: &ObjectId, metadata: &[u8]) -> Result<BytesMut, BackendError> {
    check_group(&id.group)?;
    let mut body =
        BytesMut::with_capacity(8 + 8 + 1 + GROUP_NAME_MAX_LEN + id.path.len() + metadata.len());
    body.put_i64(id.path.len() as i64);
    body.put_i64(metadata.len() as i64);
    body.put_u8(METADATA_OVERWRITE);
    put_fixed(&mut body, &id.group, GROUP_NAME_MAX_LEN);
    body.put_slice(id.path.as_bytes());
    body.put_slice(metadata);
    Ok(body)
}

// ── Reply bodies ──

pub fn parse_store_reply(body: &[u8]) -> Result<StorageNode, BackendError> {
    expect_len(body, QUERY_STORE_BODY_LEN, "query store")?;
    let group = get_fixed(&body[..GROUP_NAME_MAX_LEN]);
    let ip_end = GROUP_NAME_MAX_LEN + IP_ADDRESS_SIZE - 1;
    let ip = get_fixed(&body[GROUP_NAME_MAX_LEN..ip_end]);
    let mut rest = &body[ip_end..];
    let port = rest.get_i64();
    let store_path_index = rest.get_u8();
    let port = u16::try_from(port)
        .map_err(|_| BackendError::Protocol(format!("invalid storage port {}", port)))?;
    if ip.is_empty() {
        return Err(BackendError::Protocol("tracker returned an empty storage ip".to_string()));
    }
    Ok(StorageNode {
        group,
        ip,
        port,
        store_path_index,
    })
}

pub fn parse_upload_reply(body: &[u8]) -> Result<ObjectId, BackendError> {
    if body.len() <= GROUP_NAME_MAX_LEN {
        return Err(BackendError::Protocol(format!(
            "upload reply is {} bytes, expected more than {}",
            body.len(),
            GROUP_NAME_MAX_LEN
        )));
    }
    Ok(ObjectId {
        group: get_fixed(&body[..GROUP_NAME_MAX_LEN]),
        path: String::from_utf8_lossy(&body[GROUP_NAME_MAX_LEN..]).into_owned(),
    })
}

pub fn parse_file_info(body: &[u8]) -> Result<ObjectInfo, BackendError> {
    expect_len(body, FILE_INFO_BODY_LEN, "query file info")?;
    let mut buf = body;
    let size = buf.get_i64();
    let created = buf.get_i64();
    let crc32 = buf.get_i64();
    let file_size = u64::try_from(size)
        .map_err(|_| BackendError::Protocol(format!("negative file size {}", size)))?;
    let create_time = DateTime::from_timestamp(created, 0)
        .ok_or_else(|| BackendError::Protocol(format!("invalid create timestamp {}", created)))?;
    Ok(ObjectInfo {
        file_size,
        create_time,
        crc32: crc32 as u32,
        source_ip: get_fixed(buf),
    })
}
