//! Routing cards: the text sent to each admin right after a forwarded user
//! message. The card carries the sender id so a reply to it can be routed
//! back even when the in-process route cache no longer knows the message.

use std::sync::LazyLock;

use regex::Regex;

/// Start of the card line that carries the sender id.
pub const MARKER: &str = "🆔 ID:";

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^🆔 ID:\s*`?(\d+)`?").expect("id pattern is valid"));

pub fn render(sender_id: u64, name: &str, username: Option<&str>) -> String {
    let who = match username {
        Some(username) => format!("{} (@{})", name, username),
        None => name.to_string(),
    };
    format!(
        "📩 Сообщение от {}\n🆔 ID: {}\n↩️ Ответьте на это сообщение, чтобы написать пользователю.",
        who, sender_id
    )
}

/// Extract the sender id from card text. Only a line starting with the marker
/// counts, so a display name on the first line cannot spoof it. The first such
/// line decides; missing digits, or a value that is not a positive user chat
/// id, give no match.
pub fn parse_sender_id(text: &str) -> Option<u64> {
    let line = text.lines().find(|line| line.starts_with(MARKER))?;
    let caps = ID_PATTERN.captures(line)?;
    let id = caps.get(1)?.as_str().parse::<i64>().ok()?;
    u64::try_from(id).ok().filter(|id| *id > 0)
}
