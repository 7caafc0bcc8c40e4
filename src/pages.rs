//! Server-rendered HTML pages.
//!
//! The chat page is a thin shell: the initial message list is rendered on the
//! server and `static/app.js` keeps it in sync with the SSE events of each
//! turn.

use std::fmt::Write as _;

use crate::session::{Message, Sender, SessionView};

/// Text shown in the blocking alert when the API credential is missing.
pub const MISSING_CREDENTIAL_ALERT: &str =
    "API key is not configured. Set GEMINI_API_KEY and restart the server.";

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn sender_class(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "user",
        Sender::Model => "model",
    }
}

/// Render one message bubble.
pub fn message_html(message: &Message) -> String {
    format!(
        r#"<div class="message message-{class}" id="{id}"><div class="bubble">{text}</div></div>"#,
        class = sender_class(message.sender),
        id = escape_html(message.id.as_str()),
        text = escape_html(&message.text),
    )
}

/// Render the chat page for `view`.
pub fn chat_page(view: &SessionView, credential_missing: bool) -> String {
    let mut messages = String::new();
    for message in &view.messages {
        // Writing into a String cannot fail.
        let _ = writeln!(messages, "{}", message_html(message));
    }

    let banner = view
        .error
        .as_deref()
        .map(|e| format!("Error: {}", escape_html(e)))
        .unwrap_or_default();
    let banner_hidden = if view.error.is_some() { "" } else { " hidden" };
    let loading_hidden = if view.is_loading { "" } else { " hidden" };
    let disabled = if view.is_loading { " disabled" } else { "" };

    let body = format!(
        r#"<div id="app-shell" data-session-id="{session_id}" data-credential-missing="{credential_missing}" data-missing-credential-alert="{alert}">
  <header class="app-header">
    <h1>CortexLuma</h1>
    <p class="tagline">Illuminate your ideas</p>
  </header>
  <main id="messages" class="messages">
{messages}    <div id="loading" class="loading"{loading_hidden}><span class="spinner"></span></div>
    <div id="error-banner" class="error-banner"{banner_hidden}>{banner}</div>
    <div id="chat-end"></div>
  </main>
  <form id="chat-form" class="chat-input" autocomplete="off">
    <input id="chat-text" name="message" type="text" placeholder="Ask CortexLuma anything..."{disabled}>
    <button id="chat-send" type="submit"{disabled}>Send</button>
  </form>
</div>"#,
        session_id = escape_html(&view.id),
        alert = escape_html(MISSING_CREDENTIAL_ALERT),
    );

    html_shell("CortexLuma", &body)
}

/// Wrap `body` in the document skeleton with the app assets.
pub fn html_shell(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title}</title>
  <link rel="stylesheet" href="/static/app.css">
  <script defer src="/static/app.js"></script>
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape_html(title),
    )
}
