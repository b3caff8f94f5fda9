//! Response rendering.
//!
//! A response is produced by filling a template with three placeholders:
//!
//! - `%STATUS%`: the status line tail, e.g. `200 OK`
//! - `%LENGTH%`: the body length in bytes (optional)
//! - `%CONTENT%`: the body
//!
//! Substitution is a single left-to-right pass over the template, so a body
//! that itself contains a placeholder is emitted verbatim.

pub const STATUS: &str = "%STATUS%";
pub const LENGTH: &str = "%LENGTH%";
pub const CONTENT: &str = "%CONTENT%";

/// Plain-text HTTP/1.0 response framed by `Content-Length`.
pub const DEFAULT_TEMPLATE: &str = "HTTP/1.0 %STATUS%\r\nContent-Type: text/plain; charset=iso-8859-1\r\nContent-Length: %LENGTH%\r\n\r\n%CONTENT%";

/// Plain-text HTTP/1.0 response framed by closing the connection.
pub const CLOSE_TEMPLATE: &str =
    "HTTP/1.0 %STATUS%\r\nContent-Type: text/plain; charset=iso-8859-1\r\n\r\n%CONTENT%";

/// Renders `template` with every placeholder replaced.
///
/// # Example
///
/// ```
/// # use tickhttp::http::template::render;
/// let out = render("HTTP/1.0 %STATUS%\r\nContent-Length: %LENGTH%\r\n\r\n%CONTENT%", "200 OK", "hi");
/// assert_eq!(out, "HTTP/1.0 200 OK\r\nContent-Length: 2\r\n\r\nhi");
/// ```
pub fn render(template: &str, status: &str, content: &str) -> String {
    let mut out = String::with_capacity(template.len() + status.len() + content.len());
    let mut rest = template;

    while let Some(i) = rest.find('%') {
        out.push_str(&rest[..i]);
        let tail = &rest[i..];

        rest = if let Some(after) = tail.strip_prefix(STATUS) {
            out.push_str(status);
            after
        } else if let Some(after) = tail.strip_prefix(LENGTH) {
            out.push_str(&content.len().to_string());
            after
        } else if let Some(after) = tail.strip_prefix(CONTENT) {
            out.push_str(content);
            after
        } else {
            out.push('%');
            &tail[1..]
        };
    }

    out.push_str(rest);
    out
}
