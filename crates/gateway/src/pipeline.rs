//! The inbound-message dispatch pipeline.
//!
//! resolve/create conversation → persist inbound → notify → generate AI
//! reply → send through the adapter → persist outbound → notify. Every step
//! can fail; the caller logs and drops that message (at-most-once,
//! best-effort) without touching the polling loop.

use {anyhow::Context as _, tracing::debug, tracing::warn};

use botline_common::types::{Direction, PlatformMessage, PlatformType};

use crate::{
    manager::{ConnectionContext, ManagerInner},
    services::NewMessage,
};

pub(crate) async fn handle_inbound(
    inner: &ManagerInner,
    ctx: &ConnectionContext,
    connection_id: &str,
    platform: PlatformType,
    message: PlatformMessage,
) -> anyhow::Result<()> {
    debug!(
        connection_id,
        chat_id = message.chat_id,
        message_id = message.id,
        "dispatching inbound message"
    );

    let conversation = inner
        .conversations
        .find_or_create_conversation(platform, &message.chat_id, &ctx.chatbot_id, &ctx.tenant_id)
        .await
        .context("resolve conversation")?;

    let inbound = inner
        .conversations
        .save_message(
            &conversation.id,
            NewMessage {
                direction: Direction::Incoming,
                content: message.content.clone(),
                content_type: message.content_type,
                metadata: message.metadata.clone(),
            },
        )
        .await
        .context("persist inbound message")?;
    inner
        .notifier
        .notify_message(&ctx.tenant_id, &conversation.id, &inbound)
        .await;

    // Inbound traffic is proof of a live session.
    if let Err(err) = inner.connections.touch_sync(connection_id).await {
        warn!(connection_id, error = %err, "failed to update last sync");
    }

    let reply = inner
        .responder
        .generate(&conversation.id, &message.content, &ctx.chatbot_id)
        .await
        .context("generate response")?;

    let adapter = inner
        .registry
        .get(connection_id)
        .await
        .with_context(|| format!("adapter not found: {connection_id}"))?;
    let sent = adapter
        .send_message(&message.chat_id, &reply, None)
        .await
        .context("send reply")?;

    let outbound = inner
        .conversations
        .save_message(
            &conversation.id,
            NewMessage {
                direction: Direction::Outgoing,
                content: sent.content.clone(),
                content_type: sent.content_type,
                metadata: sent.metadata.clone(),
            },
        )
        .await
        .context("persist outbound message")?;
    inner
        .notifier
        .notify_message(&ctx.tenant_id, &conversation.id, &outbound)
        .await;

    Ok(())
}
