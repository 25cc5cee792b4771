use std::sync::Arc;

use onebridge::prelude::*;

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Replies to `echo <text>` with `<text>`, quoting the request.
struct Echo;

/// The text to echo back, if `content` is an echo command.
fn echo_text(content: &str) -> Option<&str> {
    let text = content.strip_prefix("echo")?;
    let text = text.strip_prefix(' ')?.trim();
    (!text.is_empty()).then_some(text)
}

impl EventHandler for Echo {
    async fn on_session(&self, bot: &Bot, session: Session) {
        match session.kind {
            EventKind::Message => {}
            EventKind::FriendRequest => {
                if let Some(flag) = session.message_id.as_deref() {
                    if let Err(e) = bot.handle_friend_request(flag, true, None).await {
                        tracing::warn!(error = %e, "failed to accept friend request");
                    }
                }
                return;
            }
            _ => return,
        }

        let (Some(channel_id), Some(message)) = (session.channel_id.as_deref(), &session.message)
        else {
            return;
        };
        let Some(text) = echo_text(&message.content) else {
            return;
        };

        let reply = [
            Element::new("quote").attr("id", message.id.clone()),
            Element::text(text),
        ];
        match bot.send_message(channel_id, &reply).await {
            Ok(sent) => tracing::info!(channel_id, count = sent.len(), "echoed"),
            Err(e) => tracing::warn!(channel_id, error = %e, "echo failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    onebridge::logging::init();

    let self_id = std::env::var("ONEBRIDGE_SELF_ID").unwrap_or_else(|_| "10000".into());
    let mut builder = Bot::builder()
        .self_id(self_id)
        .protocol(Protocol::WsReverse {
            path: onebridge::DEFAULT_PATH.into(),
        });
    if let Ok(token) = std::env::var("ONEBRIDGE_TOKEN") {
        builder = builder.token(token);
    }
    let bot = builder.build()?;

    let listener = bot.bind_reverse("0.0.0.0:8080").await?;
    tracing::info!("echo bot waiting for OneBot on ws://0.0.0.0:8080/onebot");
    bot.serve(listener, Arc::new(Echo)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_text_strips_command() {
        assert_eq!(echo_text("echo hello"), Some("hello"));
        assert_eq!(echo_text("echo   spaced  "), Some("spaced"));
    }

    #[test]
    fn test_echo_text_ignores_other_messages() {
        assert_eq!(echo_text("hello"), None);
        assert_eq!(echo_text("echo"), None);
        assert_eq!(echo_text("echoes"), None);
        assert_eq!(echo_text("echo "), None);
    }
}
