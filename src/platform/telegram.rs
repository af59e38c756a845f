use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{MessageId, MessageOrigin, ReactionType, ReplyParameters};
use teloxide::{ApiError, RequestError};
use tracing::{debug, info, warn};

use crate::app::AppContext;
use crate::gateway::{GatewayError, MessageGateway, MessageRef};
use crate::platform::{ChatKind, InboundMessage, ReplyContext, Sender};

/// [`MessageGateway`] over the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn map_error(error: RequestError) -> GatewayError {
    match error {
        RequestError::Api(ApiError::BotBlocked | ApiError::UserDeactivated) => GatewayError::Blocked,
        other => GatewayError::Api(other.to_string()),
    }
}

fn to_ref(msg: &Message) -> MessageRef {
    MessageRef::new(msg.chat.id.0, msg.id.0)
}

#[async_trait]
impl MessageGateway for TelegramGateway {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<MessageRef, GatewayError> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(reply_to)));
        }
        let sent = request.await.map_err(map_error)?;
        Ok(to_ref(&sent))
    }

    async fn forward(&self, to_chat: i64, source: MessageRef) -> Result<MessageRef, GatewayError> {
        let forwarded = self
            .bot
            .forward_message(
                ChatId(to_chat),
                ChatId(source.chat_id),
                MessageId(source.message_id),
            )
            .await
            .map_err(map_error)?;
        Ok(to_ref(&forwarded))
    }

    async fn copy(&self, to_chat: i64, source: MessageRef) -> Result<MessageRef, GatewayError> {
        let copied = self
            .bot
            .copy_message(
                ChatId(to_chat),
                ChatId(source.chat_id),
                MessageId(source.message_id),
            )
            .await
            .map_err(map_error)?;
        Ok(MessageRef::new(to_chat, copied.0))
    }

    async fn react(&self, target: MessageRef, emoji: &str) -> Result<(), GatewayError> {
        self.bot
            .set_message_reaction(ChatId(target.chat_id), MessageId(target.message_id))
            .reaction(vec![ReactionType::Emoji {
                emoji: emoji.to_string(),
            }])
            .await
            .map_err(map_error)?;
        Ok(())
    }
}

fn text_or_caption(msg: &Message) -> Option<String> {
    msg.text().or_else(|| msg.caption()).map(str::to_string)
}

/// The disclosed author of a forwarded message. Users who hide their profile
/// show up as `HiddenUser` and yield nothing.
fn forward_origin_user(msg: &Message) -> Option<u64> {
    match msg.forward_origin()? {
        MessageOrigin::User { sender_user, .. } => Some(sender_user.id.0),
        _ => None,
    }
}

/// Convert a teloxide message into the platform-neutral form the router uses.
pub fn to_inbound(msg: &Message) -> InboundMessage {
    let chat_kind = if msg.chat.is_private() {
        ChatKind::Private
    } else if msg.chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Group
    };

    let sender = msg.from.as_ref().map(|user| Sender {
        id: user.id.0,
        name: user.full_name(),
        username: user.username.clone(),
    });

    let reply_to = msg.reply_to_message().map(|replied| ReplyContext {
        message_id: replied.id.0,
        text: text_or_caption(replied),
        forward_origin: forward_origin_user(replied),
    });

    InboundMessage {
        message_id: msg.id.0,
        chat_id: msg.chat.id.0,
        chat_kind,
        sender,
        text: text_or_caption(msg),
        reply_to,
    }
}

/// Run the Telegram long-polling dispatcher until shutdown.
pub async fn run(ctx: Arc<AppContext>, bot: Bot) -> Result<()> {
    info!("Starting Telegram platform...");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(msg: Message, ctx: Arc<AppContext>) -> ResponseResult<()> {
    let inbound = to_inbound(&msg);
    if let Some(sender) = &inbound.sender {
        debug!(
            "Telegram message {} from {} in chat {}",
            inbound.message_id, sender.id, inbound.chat_id
        );
    } else {
        warn!("Telegram message {} without a sender", inbound.message_id);
    }

    let outcome = ctx.router.handle(&inbound).await;
    debug!("Message {} handled: {:?}", inbound.message_id, outcome);

    Ok(())
}
