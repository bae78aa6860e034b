//! State revisions derived from attachment file names.
//!
//! A revision is an attachment named
//! `terraform-state-YYYY-MM-DDThh-mm-ss.ffffff.json` (UTC).  Everything
//! else on the item (the lock record, unrelated files) is ignored.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::BwStateError;
use crate::vault::{AttachmentReference, Item};

/// Prefix of every state revision file name.
pub const STATE_FILE_PREFIX: &str = "terraform-state-";

/// Suffix of every state revision file name.
pub const STATE_FILE_SUFFIX: &str = ".json";

/// Reserved file name of the lock record.
pub const LOCK_FILE_NAME: &str = "terraform.lock.json";

/// chrono format of the timestamp embedded in a revision file name.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.6f";

fn state_file_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^terraform-state-(\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2}\.\d{6})\.json$")
            .unwrap_or_else(|e| unreachable!("state file pattern is valid: {e}"))
    })
}

/// File name for a revision written at `at`.
pub fn state_file_name(at: DateTime<Utc>) -> String {
    format!(
        "{STATE_FILE_PREFIX}{}{STATE_FILE_SUFFIX}",
        at.format(TIMESTAMP_FORMAT)
    )
}

/// Parse the timestamp out of a revision file name.
///
/// Returns `None` for names outside the grammar and for timestamps that
/// match the pattern but are not real instants (e.g. month 13).
pub fn parse_state_file_name(file_name: &str) -> Option<DateTime<Utc>> {
    let captures = state_file_regex().captures(file_name)?;
    NaiveDateTime::parse_from_str(&captures[1], TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// An attachment that is a state revision, with its parsed time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedAttachment {
    pub time: DateTime<Utc>,
    pub attachment: AttachmentReference,
}

/// How many old revisions a write evicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Evict `max_revisions - 1` of the oldest revisions once there are
    /// more than that many.  Can leave more than `max_revisions` in place.
    #[default]
    Literal,
    /// Evict just enough of the oldest revisions that exactly
    /// `max_revisions` remain after the write.
    Strict,
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal => f.write_str("literal"),
            Self::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for RetentionPolicy {
    type Err = BwStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "literal" => Ok(Self::Literal),
            "strict" => Ok(Self::Strict),
            other => Err(BwStateError::ValidationError(format!(
                "unknown retention policy '{other}' (expected literal or strict)"
            ))),
        }
    }
}

/// Time-ordered state revisions of one item, oldest first.
///
/// Equal timestamps are ordered by attachment id.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    members: Vec<TimedAttachment>,
}

impl Timeline {
    pub fn from_attachments(attachments: &[AttachmentReference]) -> Self {
        let mut members: Vec<TimedAttachment> = attachments
            .iter()
            .filter_map(|a| {
                parse_state_file_name(&a.file_name).map(|time| TimedAttachment {
                    time,
                    attachment: a.clone(),
                })
            })
            .collect();
        members.sort_by(|a, b| {
            a.time
                .cmp(&b.time)
                .then_with(|| a.attachment.id.cmp(&b.attachment.id))
        });
        Self { members }
    }

    pub fn from_item(item: &Item) -> Self {
        Self::from_attachments(&item.attachments)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The most recent revision.
    pub fn latest(&self) -> Option<&TimedAttachment> {
        self.members.last()
    }

    pub fn sorted_ascending(&self) -> &[TimedAttachment] {
        &self.members
    }

    pub fn sorted_descending(&self) -> Vec<&TimedAttachment> {
        self.members.iter().rev().collect()
    }

    /// Revisions to delete after a new one was written on top of this
    /// timeline (which must be the list read *before* the write).
    ///
    /// `keep = max_revisions - 1` since the new revision takes one slot.
    /// Nothing is evicted while `len <= keep`.  Beyond that, `Literal`
    /// evicts the `keep` oldest and `Strict` evicts the `len - keep`
    /// oldest.
    pub fn evictions(&self, max_revisions: u16, policy: RetentionPolicy) -> &[TimedAttachment] {
        let keep = usize::from(max_revisions.saturating_sub(1));
        if self.members.len() <= keep {
            return &[];
        }
        let count = match policy {
            RetentionPolicy::Literal => keep,
            RetentionPolicy::Strict => self.members.len() - keep,
        };
        &self.members[..count]
    }
}
