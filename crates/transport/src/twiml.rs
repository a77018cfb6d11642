//! TwiML response rendering
//!
//! The voice webhook answers with a document instructing the telephony
//! provider to open a bidirectional media stream, or to apologize and
//! hang up when the gateway cannot take the call.

/// Instruct the provider to open a media stream to `ws_url`.
pub fn connect_stream(ws_url: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<Response><Connect><Stream url=\"{}\"/></Connect></Response>"
        ),
        escape_xml(ws_url)
    )
}

/// Speak an apology and hang up.
pub fn say_and_hangup(message: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<Response><Say>{}</Say><Hangup/></Response>"
        ),
        escape_xml(message)
    )
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
