use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Group used when the caller does not name one.
pub const DEFAULT_GROUP: &str = "group1";

pub const FILE_NAME_ATTR: &str = "file_name";
pub const FILE_LENGTH_ATTR: &str = "file_length";

/// Resolve the group a request is addressed to. A missing or empty group
/// falls back to [`DEFAULT_GROUP`].
pub fn normalize_group(group: Option<&str>) -> &str {
    match group {
        Some(g) if !g.is_empty() => g,
        _ => DEFAULT_GROUP,
    }
}

// ── Object Identifier ──

/// Address of a stored object: the group it lives in plus the opaque path the
/// storage node assigned at upload time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub group: String,
    pub path: String,
}

impl ObjectId {
    pub fn new(group: Option<&str>, path: impl Into<String>) -> Self {
        Self {
            group: normalize_group(group).to_string(),
            path: path.into(),
        }
    }

    /// The same object with an empty group resolved to [`DEFAULT_GROUP`].
    pub fn normalized(&self) -> Self {
        Self::new(Some(&self.group), self.path.clone())
    }

    /// Split a `group/path` file id, e.g. `group1/M00/00/00/abc.jpg`.
    pub fn parse_file_id(file_id: &str) -> Option<Self> {
        let (group, path) = file_id.split_once('/')?;
        if group.is_empty() || path.is_empty() {
            return None;
        }
        Some(Self {
            group: group.to_string(),
            path: path.to_string(),
        })
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.path)
    }
}

// ── Attribute Set ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

pub type AttributeSet = Vec<Attribute>;

/// Attributes attached to every upload that carries content: the original
/// file name, then the byte length as a decimal string.
pub fn upload_attributes(file_name: &str, len: usize) -> AttributeSet {
    vec![
        Attribute::new(FILE_NAME_ATTR, file_name),
        Attribute::new(FILE_LENGTH_ATTR, len.to_string()),
    ]
}

/// Extension hint for a file name, without the dot. Blank names and names
/// without a `.` give `""`.
pub fn file_ext(file_name: &str) -> &str {
    if file_name.trim().is_empty() {
        return "";
    }
    match file_name.rfind('.') {
        Some(idx) => &file_name[idx + 1..],
        None => "",
    }
}

// ── Object Info ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub file_size: u64,
    pub create_time: DateTime<Utc>,
    pub crc32: u32,
    /// Storage node the object was first written to.
    pub source_ip: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_fills_empty_group() {
        let raw = ObjectId {
            group: String::new(),
            path: "M00/00/00/a.jpg".to_string(),
        };
        assert_eq!(raw.normalized(), ObjectId::new(None, "M00/00/00/a.jpg"));
        let named = ObjectId::new(Some("group2"), "M00/00/00/a.jpg");
        assert_eq!(named.normalized(), named);
    }

    #[test]
    fn test_file_ext() {
        assert_eq!(file_ext("a.b.jpg"), "jpg");
        assert_eq!(file_ext("report.PDF"), "PDF");
        assert_eq!(file_ext("README"), "");
        assert_eq!(file_ext(""), "");
        assert_eq!(file_ext("   "), "");
        assert_eq!(file_ext("trailing."), "");
        assert_eq!(file_ext(".bashrc"), "bashrc");
    }

    #[test]
    fn test_normalize_group() {
        assert_eq!(normalize_group(None), "group1");
        assert_eq!(normalize_group(Some("")), "group1");
        assert_eq!(normalize_group(Some("group2")), "group2");
    }

    #[test]
    fn test_object_id() {
        let id = ObjectId::new(None, "M00/00/00/wKgKZl9tkTCAJAanAADhaCZ_RF0495.jpg");
        assert_eq!(id.group, "group1");
        assert_eq!(id.to_string(), "group1/M00/00/00/wKgKZl9tkTCAJAanAADhaCZ_RF0495.jpg");
        assert_eq!(ObjectId::parse_file_id(&id.to_string()), Some(id));

        assert_eq!(ObjectId::parse_file_id("group1"), None);
        assert_eq!(ObjectId::parse_file_id("/M00/x.jpg"), None);
        assert_eq!(ObjectId::parse_file_id("group1/"), None);
    }

    #[test]
    fn test_upload_attributes_order() {
        let attrs = upload_attributes("china.jpg", 57704);
        assert_eq!(
            attrs,
            vec![
                Attribute::new("file_name", "china.jpg"),
                Attribute::new("file_length", "57704"),
            ]
        );
    }
}
