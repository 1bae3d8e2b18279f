/// Shared data types exchanged with the chat server
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric user identifier. `0` (or anything non-positive) means "no session".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Only positive ids may own a connection
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }

    /// `Some(id)` for a valid id, `None` otherwise
    pub fn valid(self) -> Option<Self> {
        self.is_valid().then_some(self)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(UserId)
    }
}

/// Delivery state of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

/// Directory entry / peer metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub contact_no: String,
    /// Presence string as reported by the server (ONLINE, OFFLINE, ACTIVE, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Country code and contact number, e.g. `+94 771234567`
    pub fn phone(&self) -> String {
        format!("{} {}", self.country_code, self.contact_no)
            .trim()
            .to_string()
    }
}

/// One message of a one-to-one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub id: i64,
    pub message: String,
    pub from: User,
    pub to: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub status: DeliveryStatus,
}

impl ChatMessage {
    /// True if `peer` is the sender or the recipient
    pub fn involves(&self, peer: UserId) -> bool {
        self.from.id == peer || self.to.id == peer
    }
}

/// Summary of one conversation thread (list view)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub friend_id: UserId,
    #[serde(default)]
    pub friend_name: String,
    #[serde(default)]
    pub last_message: String,
    /// Timestamp of the last message as sent by the server
    #[serde(default)]
    pub last_time_stamp: String,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    /// Delivery state of the last message, when the server reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,
}

/// New contact as submitted by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactDraft {
    pub first_name: String,
    pub last_name: String,
    pub country_code: String,
    pub contact_no: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Server verdict on a contact submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResult {
    #[serde(default)]
    pub message: String,
    pub response_status: bool,
}
