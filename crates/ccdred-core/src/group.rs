use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{CcdError, Result};
use crate::frame::Frame;
use crate::header::{Header, HeaderValue};

/// Ordered tuple of header values, one per grouping keyword.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(pub Vec<HeaderValue>);

impl GroupKey {
    pub fn values(&self) -> &[HeaderValue] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

/// Extract the values of `keys` from `header`, in request order.
pub fn extract_key(header: &Header, keys: &[String], path: &Path) -> Result<GroupKey> {
    keys.iter()
        .map(|k| header.require(k, path).cloned())
        .collect::<Result<Vec<_>>>()
        .map(GroupKey)
}

/// Frames partitioned by their [`GroupKey`].
///
/// Keys are kept in first-seen order and members in input order, so the
/// enumeration is stable for a stable input ordering. Frames whose header
/// lacks a grouping keyword are kept aside in `unassigned`.
#[derive(Debug, Default)]
pub struct FrameGroups {
    keywords: Vec<String>,
    order: Vec<GroupKey>,
    members: HashMap<GroupKey, Vec<Frame>>,
    unassigned: Vec<(PathBuf, CcdError)>,
}

impl FrameGroups {
    /// Grouping keywords, upper-cased.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Distinct keys in first-seen order.
    pub fn unique_values(&self) -> &[GroupKey] {
        &self.order
    }

    /// Members of `key` in input order; empty if the key was never seen.
    pub fn frames_for(&self, key: &GroupKey) -> &[Frame] {
        self.members.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &[Frame])> {
        self.order.iter().map(|k| (k, self.frames_for(k)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Frames that could not be grouped and the reason.
    pub fn unassigned(&self) -> &[(PathBuf, CcdError)] {
        &self.unassigned
    }

    /// `keyword=value` pairs for `key`, used in names and logs.
    pub fn describe(&self, key: &GroupKey) -> String {
        if key.is_empty() {
            return "all".to_string();
        }
        self.keywords
            .iter()
            .zip(key.values())
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Partition `frames` by the values of `keys`.
///
/// With no keys every frame lands in one group under the empty key.
pub fn group_frames(frames: Vec<Frame>, keys: &[String]) -> FrameGroups {
    let mut groups = FrameGroups {
        keywords: keys.iter().map(|k| k.trim().to_uppercase()).collect(),
        ..Default::default()
    };

    for frame in frames {
        match extract_key(&frame.header, keys, &frame.path) {
            Ok(key) => {
                let entry = groups.members.entry(key.clone()).or_insert_with(|| {
                    groups.order.push(key.clone());
                    Vec::new()
                });
                entry.push(frame);
            }
            Err(e) => {
                warn!(path = %frame.path.display(), error = %e, "Frame left out of grouping");
                groups.unassigned.push((frame.path, e));
            }
        }
    }

    for (key, members) in groups.iter() {
        debug!(key = %key, frames = members.len(), "Group");
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: &str, filter: &str) -> Frame {
        let mut h = Header::new();
        h.insert("FILTER", filter);
        Frame::new(name, h)
    }

    #[test]
    fn test_first_seen_order() {
        let frames = vec![frame("a", "V"), frame("b", "B"), frame("c", "V")];
        let groups = group_frames(frames, &["filter".to_string()]);
        let keys: Vec<String> = groups.unique_values().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["(V)", "(B)"]);
    }
}
