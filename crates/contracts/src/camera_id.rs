//! CameraId - cheap-to-clone camera identifier
//!
//! Backed by `Arc<str>`, so clones only bump a reference count.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Identifier of one camera session.
///
/// Created once from configuration and cloned into every thread, log span
/// and metric label that refers to the session.
///
/// # Examples
/// ```
/// use contracts::CameraId;
///
/// let id: CameraId = "zed_front".into();
/// let id2 = id.clone();
/// assert_eq!(id, id2);
/// assert_eq!(id.as_str(), "zed_front");
/// ```
#[derive(Clone, Default)]
pub struct CameraId(Arc<str>);

impl CameraId {
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for CameraId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for CameraId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CameraId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CameraId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for CameraId {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CameraId({:?})", self.0)
    }
}

impl PartialEq for CameraId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for CameraId {}

impl PartialEq<str> for CameraId {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for CameraId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

// Must hash exactly like `str` so `HashMap<CameraId, _>` can be queried with `&str`.
impl Hash for CameraId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for CameraId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CameraId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn clone_shares_storage() {
        let a: CameraId = "zed_front".into();
        let b = a.clone();
        assert_eq!(a.as_str().as_ptr(), b.as_str().as_ptr());
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map: HashMap<CameraId, u32> = HashMap::new();
        map.insert("left_rig".into(), 1);
        map.insert("right_rig".into(), 2);

        assert_eq!(map.get("left_rig"), Some(&1));
        assert_eq!(map.get("missing"), None);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id: CameraId = "cam0".into();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"cam0\"");

        let parsed: CameraId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, "cam0");
    }
}
