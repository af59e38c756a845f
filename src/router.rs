use std::sync::Arc;

use futures::future::join_all;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use crate::admins::{AdminRegistry, AdminSnapshot, Freshness};
use crate::card;
use crate::commands::{self, Command, Parsed};
use crate::error::RelayError;
use crate::gateway::{GatewayError, MessageGateway, MessageRef};
use crate::platform::{ChatKind, InboundMessage, ReplyContext, Sender};
use crate::routes::RouteCache;

const ACK_REACTION: &str = "👍";

const ADMIN_GREETING: &str =
    "Привет, Админ! Просто отвечай (Reply) на пересланные сообщения, чтобы писать пользователям.";
const USER_GREETING: &str =
    "Приветствую! Напиши сообщение в чат, чтобы передать его администратору.";
const UNRESOLVED_HINT: &str = "⚠️ Не могу определить, кому отправить ответ. \
     Ответьте (Reply) на пересланное сообщение или на карточку с 🆔 ID, которая приходит следом за ним. \
     Если у пользователя скрыт профиль, ответ возможен только через карточку.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Blocked,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub outcomes: Vec<(u64, DeliveryStatus)>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> usize {
        self.count(|s| matches!(s, DeliveryStatus::Delivered))
    }

    pub fn blocked(&self) -> usize {
        self.count(|s| matches!(s, DeliveryStatus::Blocked))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, DeliveryStatus::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&DeliveryStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, s)| pred(s)).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    RouteCache,
    Card,
    ForwardOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub user_id: u64,
    pub source: TargetSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Ignored,
    Command,
    FannedOut(DeliveryReport),
    /// Admin wrote something that is not a reply.
    AdminIdle,
    Replied { user_id: u64 },
    Unresolved,
    ReplyFailed { user_id: u64, reason: String },
}

/// Private chat of a user. Telegram gives groups and channels negative ids, so
/// anything that does not fit a positive `i64` is not a user.
fn chat_of(user_id: u64) -> Option<i64> {
    i64::try_from(user_id).ok().filter(|chat| *chat > 0)
}

/// Decides, per message, whether to fan out to admins or route an admin's
/// reply back to a user.
pub struct Router {
    admins: AdminRegistry,
    gateway: Arc<dyn MessageGateway>,
    routes: Arc<RouteCache>,
    bot_name: String,
}

impl Router {
    pub fn new(
        admins: AdminRegistry,
        gateway: Arc<dyn MessageGateway>,
        routes: Arc<RouteCache>,
        bot_name: impl Into<String>,
    ) -> Self {
        Self {
            admins,
            gateway,
            routes,
            bot_name: bot_name.into(),
        }
    }

    pub async fn handle(&self, msg: &InboundMessage) -> RouteOutcome {
        if msg.chat_kind != ChatKind::Private {
            debug!("Ignoring message from non-private chat {}", msg.chat_id);
            return RouteOutcome::Ignored;
        }
        let Some(sender) = &msg.sender else {
            return RouteOutcome::Ignored;
        };

        let snapshot = self.admins.get_admins().await;
        let is_admin = snapshot.contains(sender.id);

        if let Some(text) = &msg.text {
            match commands::parse(text, &self.bot_name) {
                Parsed::Command(command) if is_admin || !command.is_management() => {
                    self.handle_command(msg, sender, is_admin, command).await;
                    return RouteOutcome::Command;
                }
                Parsed::Malformed if is_admin => {
                    self.notify(msg.chat_id, commands::USAGE).await;
                    return RouteOutcome::Command;
                }
                _ => {}
            }
        }

        match (is_admin, &msg.reply_to) {
            (false, _) => {
                RouteOutcome::FannedOut(self.fan_out(msg, sender, &snapshot).await)
            }
            (true, None) => {
                debug!("Admin {} sent a non-reply message; nothing to route", sender.id);
                RouteOutcome::AdminIdle
            }
            (true, Some(reply)) => self.reply_to_user(msg, sender, reply).await,
        }
    }

    /// Forward the message to every admin, each followed by a routing card.
    pub async fn fan_out(
        &self,
        msg: &InboundMessage,
        sender: &Sender,
        snapshot: &AdminSnapshot,
    ) -> DeliveryReport {
        if let Freshness::Unavailable(reason) = &snapshot.freshness {
            warn!(
                "Admin store unavailable ({}); message from {} goes to the owner only",
                reason, sender.id
            );
        }

        let source = msg.message_ref();
        let card = card::render(sender.id, &sender.name, sender.username.as_deref());
        let deliveries = snapshot
            .ids
            .iter()
            .map(|&admin| self.deliver_to_admin(admin, source, sender.id, &card));

        let report = DeliveryReport {
            outcomes: join_all(deliveries).await,
        };

        info!(
            "Message from {} fanned out: {} delivered, {} blocked, {} failed",
            sender.id,
            report.delivered(),
            report.blocked(),
            report.failed()
        );
        if report.delivered() == 0 {
            error!("Message from {} reached no admin", sender.id);
        }
        report
    }

    async fn deliver_to_admin(
        &self,
        admin: u64,
        source: MessageRef,
        sender_id: u64,
        card: &str,
    ) -> (u64, DeliveryStatus) {
        let Some(chat) = chat_of(admin) else {
            error!("Admin id {} is not a valid user chat", admin);
            return (admin, DeliveryStatus::Failed("invalid user id".to_string()));
        };
        let forwarded = match self.gateway.forward(chat, source).await {
            Ok(forwarded) => forwarded,
            Err(GatewayError::Blocked) => {
                warn!("Admin {} has blocked the bot", admin);
                return (admin, DeliveryStatus::Blocked);
            }
            Err(e) => {
                error!("Failed to forward to admin {}: {}", admin, e);
                return (admin, DeliveryStatus::Failed(e.to_string()));
            }
        };
        self.routes.insert(forwarded, sender_id).await;

        match self
            .gateway
            .send_text(chat, card, Some(forwarded.message_id))
            .await
        {
            Ok(card_ref) => self.routes.insert(card_ref, sender_id).await,
            Err(e) => warn!("Forwarded to admin {} but the routing card failed: {}", admin, e),
        }

        (admin, DeliveryStatus::Delivered)
    }

    /// Work out which user an admin's reply is meant for.
    pub async fn resolve_target(
        &self,
        replied: MessageRef,
        reply: &ReplyContext,
    ) -> Result<Target, RelayError> {
        let usable = |id: &u64| chat_of(*id).is_some();

        if let Some(user_id) = self.routes.lookup(replied).await.filter(usable) {
            return Ok(Target {
                user_id,
                source: TargetSource::RouteCache,
            });
        }

        if let Some(user_id) = reply
            .text
            .as_deref()
            .and_then(card::parse_sender_id)
            .filter(usable)
        {
            return Ok(Target {
                user_id,
                source: TargetSource::Card,
            });
        }

        if let Some(user_id) = reply.forward_origin.filter(usable) {
            return Ok(Target {
                user_id,
                source: TargetSource::ForwardOrigin,
            });
        }

        Err(RelayError::UnresolvedTarget)
    }

    async fn reply_to_user(
        &self,
        msg: &InboundMessage,
        admin: &Sender,
        reply: &ReplyContext,
    ) -> RouteOutcome {
        let replied = MessageRef::new(msg.chat_id, reply.message_id);
        let resolved = self
            .resolve_target(replied, reply)
            .await
            .and_then(|target| {
                chat_of(target.user_id)
                    .map(|chat| (target, chat))
                    .ok_or(RelayError::UnresolvedTarget)
            });
        let (target, chat) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Admin {} replied to message {}: {}", admin.id, reply.message_id, e);
                self.notify(msg.chat_id, UNRESOLVED_HINT).await;
                return RouteOutcome::Unresolved;
            }
        };

        debug!(
            "Routing reply from admin {} to user {} (via {:?})",
            admin.id, target.user_id, target.source
        );

        if let Err(e) = self.gateway.copy(chat, msg.message_ref()).await {
            let failure = RelayError::DeliveryFailed {
                recipient: target.user_id,
                reason: e.to_string(),
            };
            warn!("{}", failure);
            self.notify(
                msg.chat_id,
                &format!(
                    "Не удалось отправить (возможно, пользователь заблокировал бота): {}",
                    e
                ),
            )
            .await;
            return RouteOutcome::ReplyFailed {
                user_id: target.user_id,
                reason: e.to_string(),
            };
        }

        info!("Reply from admin {} delivered to user {}", admin.id, target.user_id);
        if let Err(e) = self.gateway.react(msg.message_ref(), ACK_REACTION).await {
            warn!("Delivered, but could not react to the admin's message: {}", e);
        }

        RouteOutcome::Replied {
            user_id: target.user_id,
        }
    }

    async fn handle_command(
        &self,
        msg: &InboundMessage,
        sender: &Sender,
        is_admin: bool,
        command: Command,
    ) {
        let text = match command {
            Command::Start => greeting(is_admin).to_string(),
            Command::Help if is_admin => Command::descriptions().to_string(),
            Command::Help => greeting(false).to_string(),
            Command::Add(id) => match self.admins.add_admin(sender.id, id).await {
                Ok(set) => format!("✅ {} добавлен в админы. Всего админов: {}", id, set.len()),
                Err(e) => failure_text(&e),
            },
            Command::Remove(id) => match self.admins.remove_admin(sender.id, id).await {
                Ok(set) => format!("✅ {} удалён из админов. Всего админов: {}", id, set.len()),
                Err(e) => failure_text(&e),
            },
            Command::Admins => match self.admins.list_admins(sender.id).await {
                Ok(snapshot) => self.render_admin_list(&snapshot),
                Err(e) => failure_text(&e),
            },
        };
        self.notify(msg.chat_id, &text).await;
    }

    fn render_admin_list(&self, snapshot: &AdminSnapshot) -> String {
        let mut text = String::from("👥 Админы:\n");
        for id in &snapshot.ids {
            if self.admins.is_owner(*id) {
                text.push_str(&format!("• {} (владелец)\n", id));
            } else {
                text.push_str(&format!("• {}\n", id));
            }
        }
        match &snapshot.freshness {
            Freshness::Fresh => {}
            Freshness::Disabled => {
                text.push_str("\nℹ️ Хранилище не настроено: сообщения получает только владелец.")
            }
            Freshness::Unavailable(reason) => {
                text.push_str(&format!("\n⚠️ Хранилище недоступно: {}", reason))
            }
        }
        text
    }

    async fn notify(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.gateway.send_text(chat_id, text, None).await {
            error!("Failed to send message to chat {}: {}", chat_id, e);
        }
    }
}

fn greeting(is_admin: bool) -> &'static str {
    if is_admin {
        ADMIN_GREETING
    } else {
        USER_GREETING
    }
}

fn failure_text(error: &RelayError) -> String {
    match error {
        RelayError::NotOwner => "⛔ Управлять админами может только владелец.".to_string(),
        RelayError::OwnerImmutable => "⛔ Владельца нельзя удалить.".to_string(),
        other => format!("❌ Не удалось выполнить команду: {}", other),
    }
}
