use chrono::{DateTime, Utc};
use std::fmt;

// =============================================================================
// Audio resources
// =============================================================================

/// Source kind of a playable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioType {
    /// Plain URL to a media file or stream.
    MediaLink,
    Youtube,
    Soundcloud,
    Twitch,
}

impl AudioType {
    pub const ALL: [AudioType; 4] = [
        AudioType::MediaLink,
        AudioType::Youtube,
        AudioType::Soundcloud,
        AudioType::Twitch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioType::MediaLink => "MediaLink",
            AudioType::Youtube => "Youtube",
            AudioType::Soundcloud => "Soundcloud",
            AudioType::Twitch => "Twitch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MediaLink" => Some(AudioType::MediaLink),
            "Youtube" => Some(AudioType::Youtube),
            "Soundcloud" => Some(AudioType::Soundcloud),
            "Twitch" => Some(AudioType::Twitch),
            _ => None,
        }
    }
}

impl fmt::Display for AudioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A playable resource as the bot knows it.
///
/// Identity is `(resource_type, resource_id)`; `title` is display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioResource {
    pub resource_type: AudioType,
    /// Identifier needed to recreate the resource, unique among resources
    /// of the same type.
    pub resource_id: String,
    pub title: String,
}

impl AudioResource {
    pub fn new(
        resource_type: AudioType,
        resource_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            resource_type,
            resource_id: resource_id.into(),
            title: title.into(),
        }
    }

    pub fn same_identity(&self, other: &AudioResource) -> bool {
        self.resource_type == other.resource_type && self.resource_id == other.resource_id
    }
}

impl fmt::Display for AudioResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.resource_type, self.resource_id)
    }
}

// =============================================================================
// Play history
// =============================================================================

/// One row of the play history, one per resource identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayHistoryEntry {
    /// Assigned by the store, never reused.
    pub id: i64,
    /// Database id of the user who played this resource first.
    pub invoker_id: u64,
    pub play_count: u32,
    /// Last time this resource was played.
    pub timestamp: DateTime<Utc>,
    pub resource: AudioResource,
}

impl fmt::Display for PlayHistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] @ {} by {}: {}, ({}) x{}",
            self.id,
            self.timestamp.to_rfc3339(),
            self.invoker_id,
            self.resource.title,
            self.resource,
            self.play_count
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryStats {
    /// Number of distinct resources in the history.
    pub entries: u64,
    /// Sum of all play counts.
    pub total_plays: u64,
}
