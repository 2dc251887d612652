//! Selectors and page scripts for driving the WhatsApp Web client.
//!
//! Everything here is DOM-shaped: the web client exposes no API, so chats
//! and messages are read out of list rows and message bubbles, and sends go
//! through the composer like a human would.

use {chromiumoxide::Page, serde::Deserialize};

/// The chat list pane; present only after a successful login.
pub const CHAT_LIST_SELECTOR: &str = "#pane-side";

/// The message composer of the open chat.
pub const COMPOSER_SELECTOR: &str = "footer div[contenteditable=\"true\"]";

/// A chat-list row with its title and unread badge state.
#[derive(Debug, Clone, Deserialize)]
pub struct DomChat {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub unread: u32,
}

/// A rendered message bubble of the open chat.
#[derive(Debug, Clone, Deserialize)]
pub struct DomMessage {
    /// The `data-id` attribute, e.g. `false_5511...@c.us_3EB0...`.
    #[serde(default)]
    pub id: String,
    pub incoming: bool,
    #[serde(default)]
    pub text: String,
    /// The `data-pre-plain-text` header: `[12:34, 1/2/2026] Sender: `.
    #[serde(default)]
    pub meta: String,
}

/// Login-surface probe result.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginProbe {
    pub state: String,
    #[serde(default)]
    pub data: Option<String>,
}

/// Probe whether the client shows the chat list, a QR code, or is loading.
pub const LOGIN_PROBE_SCRIPT: &str = r#"
(() => {
    if (document.querySelector('#pane-side')) return { state: 'ready' };
    const qr = document.querySelector('div[data-ref]');
    if (qr) return { state: 'qr', data: qr.getAttribute('data-ref') };
    return { state: 'loading' };
})()
"#;

/// Chat-list rows carrying an unread badge.
pub const UNREAD_CHATS_SCRIPT: &str = r#"
(() => {
    const rows = document.querySelectorAll('#pane-side div[role="listitem"]');
    const chats = [];
    for (const row of rows) {
        const badge = row.querySelector('span[aria-label*="unread"], span[aria-label*="não lida"], span[aria-label*="no leída"]');
        if (!badge) continue;
        const title = row.querySelector('span[title]');
        if (!title) continue;
        const name = title.getAttribute('title');
        chats.push({ id: name, name, unread: parseInt(badge.textContent, 10) || 1 });
    }
    return chats;
})()
"#;

/// All visible chat-list rows.
pub const LIST_CHATS_SCRIPT: &str = r#"
(() => {
    const rows = document.querySelectorAll('#pane-side div[role="listitem"]');
    const chats = [];
    for (const row of rows) {
        const title = row.querySelector('span[title]');
        if (!title) continue;
        const name = title.getAttribute('title');
        chats.push({ id: name, name, unread: 0 });
    }
    return chats;
})()
"#;

/// Script that clicks the chat-list row with the given title. Evaluates to
/// `true` when the row was found.
pub fn open_chat_script(chat_id: &str) -> String {
    let title = js_string(chat_id);
    format!(
        r#"
(() => {{
    const rows = document.querySelectorAll('#pane-side div[role="listitem"]');
    for (const row of rows) {{
        const title = row.querySelector('span[title]');
        if (title && title.getAttribute('title') === {title}) {{
            const target = row.querySelector('div[role="button"]') || row;
            target.click();
            return true;
        }}
    }}
    return false;
}})()
"#
    )
}

/// Script reading the last `limit` message bubbles of the open chat.
pub fn read_messages_script(limit: usize) -> String {
    format!(
        r#"
(() => {{
    const rows = document.querySelectorAll('div.message-in, div.message-out');
    const messages = [];
    for (const row of rows) {{
        const bubble = row.querySelector('div.copyable-text');
        const textEl = row.querySelector('span.selectable-text');
        const holder = row.closest('[data-id]');
        messages.push({{
            id: holder ? holder.getAttribute('data-id') : '',
            incoming: row.classList.contains('message-in'),
            text: textEl ? textEl.textContent : '',
            meta: bubble ? (bubble.getAttribute('data-pre-plain-text') || '') : '',
        }});
    }}
    return messages.slice(-{limit});
}})()
"#
    )
}

/// Extract the sender name out of a `data-pre-plain-text` header.
pub fn parse_sender(meta: &str) -> Option<String> {
    let after_bracket = meta.split(']').nth(1)?;
    let name = after_bracket.trim().trim_end_matches(':').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Evaluate a script and deserialize its JSON result.
pub async fn eval_json<T: serde::de::DeserializeOwned>(
    page: &Page,
    script: &str,
) -> anyhow::Result<T> {
    let result = page.evaluate(script).await?;
    Ok(result.into_value()?)
}

/// Embed a Rust string as a JS string literal.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_is_parsed_from_the_meta_header() {
        assert_eq!(
            parse_sender("[12:34, 1/2/2026] Maria Souza: ").as_deref(),
            Some("Maria Souza")
        );
        assert_eq!(parse_sender(""), None);
        assert_eq!(parse_sender("[12:34, 1/2/2026] "), None);
    }

    #[test]
    fn open_chat_script_escapes_the_title() {
        let script = open_chat_script(r#"Loja "Acme" \ Outlet"#);
        assert!(script.contains(r#""Loja \"Acme\" \\ Outlet""#));
    }

    #[test]
    fn read_messages_script_embeds_the_limit() {
        let script = read_messages_script(25);
        assert!(script.contains("slice(-25)"));
    }
}
