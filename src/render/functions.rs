//! Helper functions available inside every template.

use minijinja::value::Value;
use minijinja::{Error, ErrorKind};
use md5::{Digest, Md5};

/// `{{ host(request) }}`: host the request was addressed to.
pub fn host(request: Value) -> String {
    request
        .get_attr("host")
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// `{{ marshal(user) }}`: JSON for embedding in an inline script.
///
/// `<`, `>` and `&` are escaped as unicode sequences so the output cannot
/// close a `<script>` element.
pub fn marshal(value: Value) -> Result<Value, Error> {
    let json = serde_json::to_string(&value).map_err(|e| {
        Error::new(ErrorKind::InvalidOperation, "value cannot be marshalled to JSON").with_source(e)
    })?;
    let escaped = json
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026");
    Ok(Value::from_safe_string(escaped))
}

/// `{{ title("hello world") }}` gives `Hello World`.
pub fn title(word: String) -> String {
    let mut out = String::with_capacity(word.len());
    let mut at_start = true;
    for c in word.chars() {
        if at_start && c.is_alphanumeric() {
            out.extend(c.to_uppercase());
            at_start = false;
        } else {
            out.push(c);
            if c.is_whitespace() || c == '-' || c == '_' {
                at_start = true;
            } else if c.is_alphanumeric() {
                at_start = false;
            }
        }
    }
    out
}

/// `{{ gravatar(user.email, 80) }}`: avatar URL for an e-mail address.
pub fn gravatar(email: String, size: Option<i64>) -> String {
    let normalized = email.trim().to_lowercase();
    let digest = Md5::digest(normalized.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "https://www.gravatar.com/avatar/{hex}?s={}",
        size.unwrap_or(80)
    )
}
