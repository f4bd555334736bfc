// HTML pages served by the authorization endpoint. Deliberately bare.

/// Escapes text for use inside HTML element content and attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn ready_page() -> String {
    "<h1>Telegram bot is running and connected to Google Drive!</h1>\
     <p>You can close this tab.</p>"
        .to_string()
}

pub fn authorize_page(authorization_url: &str) -> String {
    format!(
        "<h1>Google authorization required</h1>\
         <p>Click the link below to grant the bot access to Google Drive:</p>\
         <p><a href=\"{}\">Grant Google Drive access</a></p>",
        escape_html(authorization_url)
    )
}

pub fn credential_page(token_json: &str) -> String {
    format!(
        "<h1>Authorization complete!</h1>\
         <p>The bot is using this credential now. To keep it across restarts, \
         save the text below as a new environment variable:</p>\
         <hr>\
         <p><b>KEY:</b> <code>GOOGLE_TOKEN_JSON</code></p>\
         <p><b>VALUE:</b></p>\
         <textarea rows=\"10\" cols=\"80\" readonly>{}</textarea>\
         <hr>\
         <p>After saving it, restart the service.</p>",
        escape_html(token_json)
    )
}

pub fn error_page(title: &str, detail: &str) -> String {
    format!(
        "<h1>{}</h1><p>{}</p>",
        escape_html(title),
        escape_html(detail)
    )
}
