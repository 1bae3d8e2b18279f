/// Wire protocol: outbound requests and inbound envelopes
///
/// Every frame is one JSON object. Outbound frames carry a `type` tag, the
/// request fields and the sender's `userId`; inbound frames carry a `type`
/// tag and a type-specific `payload`.
use crate::error::{ChatError, Result};
use crate::models::{ChatMessage, ContactDraft, ContactResult, Conversation, User, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Requests the client sends
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Request {
    /// Ask for the conversation list
    #[serde(rename = "get_chat_list")]
    GetChatList,

    /// Ask for the full history with one peer
    #[serde(rename = "get_single_chat", rename_all = "camelCase")]
    GetSingleChat { friend_id: UserId },

    /// Ask for one peer's profile
    #[serde(rename = "friend_data", rename_all = "camelCase")]
    FriendData { friend_id: UserId },

    /// Ask for the whole user directory
    #[serde(rename = "get_all_users")]
    GetAllUsers,

    /// Add a contact by phone number
    #[serde(rename = "save_new_contact")]
    SaveNewContact { user: ContactDraft },

    /// Send a text message to a peer
    #[serde(rename = "send_message", rename_all = "camelCase")]
    SendMessage { to_user_id: UserId, message: String },

    /// Keepalive
    #[serde(rename = "ping")]
    Ping,
}

impl Request {
    pub fn message_type(&self) -> &'static str {
        match self {
            Request::GetChatList => "get_chat_list",
            Request::GetSingleChat { .. } => "get_single_chat",
            Request::FriendData { .. } => "friend_data",
            Request::GetAllUsers => "get_all_users",
            Request::SaveNewContact { .. } => "save_new_contact",
            Request::SendMessage { .. } => "send_message",
            Request::Ping => "ping",
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request({})", self.message_type())
    }
}

/// Outbound frame: the request plus the sender id
#[derive(Serialize)]
struct Outbound<'a> {
    #[serde(flatten)]
    request: &'a Request,
    #[serde(rename = "userId")]
    user_id: UserId,
}

/// Discriminant of an inbound envelope, used as the event bus key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    ChatList,
    SingleChat,
    NewMessage,
    FriendData,
    AllUsers,
    NewContactResult,
    Pong,
}

impl InboundKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            InboundKind::ChatList => "friend_list",
            InboundKind::SingleChat => "single_chat",
            InboundKind::NewMessage => "new_message",
            InboundKind::FriendData => "friend_data",
            InboundKind::AllUsers => "get_all_users",
            InboundKind::NewContactResult => "new_contact_response_text",
            InboundKind::Pong => "PONG",
        }
    }

    fn from_wire(name: &str) -> Option<Self> {
        Some(match name {
            "friend_list" => InboundKind::ChatList,
            "single_chat" => InboundKind::SingleChat,
            "new_message" => InboundKind::NewMessage,
            "friend_data" => InboundKind::FriendData,
            "get_all_users" => InboundKind::AllUsers,
            "new_contact_response_text" => InboundKind::NewContactResult,
            "PONG" => InboundKind::Pong,
            _ => return None,
        })
    }
}

/// Envelopes the server pushes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Full conversation list snapshot
    ChatList(Vec<Conversation>),
    /// Full history with one peer, oldest first
    SingleChat(Vec<ChatMessage>),
    /// One message sent or received
    NewMessage(ChatMessage),
    /// Peer profile; `None` when the server could not find the user
    FriendData {
        peer: Option<User>,
        error: Option<String>,
    },
    /// Full user directory snapshot
    AllUsers(Vec<User>),
    /// Outcome of a contact submission
    NewContactResult(ContactResult),
    /// Keepalive acknowledgement
    Pong,
    /// A well-formed envelope of a type this client does not handle
    Unrecognized(String),
}

impl Inbound {
    /// Bus key, `None` for unrecognized envelopes
    pub fn kind(&self) -> Option<InboundKind> {
        match self {
            Inbound::ChatList(_) => Some(InboundKind::ChatList),
            Inbound::SingleChat(_) => Some(InboundKind::SingleChat),
            Inbound::NewMessage(_) => Some(InboundKind::NewMessage),
            Inbound::FriendData { .. } => Some(InboundKind::FriendData),
            Inbound::AllUsers(_) => Some(InboundKind::AllUsers),
            Inbound::NewContactResult(_) => Some(InboundKind::NewContactResult),
            Inbound::Pong => Some(InboundKind::Pong),
            Inbound::Unrecognized(_) => None,
        }
    }
}

impl fmt::Display for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "Inbound({})", kind.wire_name()),
            None => write!(f, "Inbound(unrecognized)"),
        }
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

/// Serialize a request for the wire, attaching the sender id
pub fn encode(request: &Request, user_id: UserId) -> Result<String> {
    serde_json::to_string(&Outbound { request, user_id }).map_err(ChatError::Serialization)
}

/// Parse one inbound frame. Errors mean the frame must be dropped.
pub fn decode(text: &str) -> Result<Inbound> {
    let raw: RawEnvelope = serde_json::from_str(text)?;

    let Some(kind) = InboundKind::from_wire(&raw.kind) else {
        return Ok(Inbound::Unrecognized(raw.kind));
    };

    let payload = raw.payload;
    let inbound = match kind {
        InboundKind::ChatList => Inbound::ChatList(serde_json::from_value(payload)?),
        InboundKind::SingleChat => Inbound::SingleChat(serde_json::from_value(payload)?),
        InboundKind::NewMessage => Inbound::NewMessage(serde_json::from_value(payload)?),
        InboundKind::FriendData => Inbound::FriendData {
            peer: serde_json::from_value(payload)?,
            error: raw.error,
        },
        InboundKind::AllUsers => Inbound::AllUsers(serde_json::from_value(payload)?),
        InboundKind::NewContactResult => {
            Inbound::NewContactResult(serde_json::from_value(payload)?)
        }
        // Any payload acknowledges
        InboundKind::Pong => Inbound::Pong,
    };

    Ok(inbound)
}
