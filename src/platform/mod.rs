pub mod telegram;

use crate::gateway::MessageRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Channel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: u64,
    pub name: String,
    pub username: Option<String>,
}

/// The message an admin replied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyContext {
    pub message_id: i32,
    /// Text or caption.
    pub text: Option<String>,
    /// Original author, when the replied-to message is a forward from a user
    /// who does not hide their profile.
    pub forward_origin: Option<u64>,
}

/// Platform-neutral view of an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_id: i32,
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub sender: Option<Sender>,
    /// Text or caption.
    pub text: Option<String>,
    pub reply_to: Option<ReplyContext>,
}

impl InboundMessage {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef::new(self.chat_id, self.message_id)
    }
}
