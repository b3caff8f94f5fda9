use crate::http::parser::ParseError;

/// HTTP request methods.
///
/// Only GET is ever served or sent. The other methods are recognised so the
/// server can tell "unsupported method" apart from "not a method at all".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    OPTIONS,
    PATCH,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// Matching is case-sensitive, so `"get"` is not `GET`.
    ///
    /// # Example
    ///
    /// ```
    /// # use tickhttp::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }
}

/// The first line of a request: `METHOD SP PATH SP HTTP-VERSION`.
///
/// The method is kept as the raw token. Any run of ASCII letters is a
/// well-formed method; whether it is one we serve is decided later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub path: String,
    pub version: String,
}

impl RequestLine {
    /// Parses a request line without its trailing CRLF.
    ///
    /// Fields are separated by one or more spaces. The version must look
    /// like `HTTP/<digits>.<digits>` and nothing may follow it.
    pub fn parse(line: &[u8]) -> Result<Self, ParseError> {
        let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidRequest)?;

        let mut parts = line.split(' ').filter(|p| !p.is_empty());
        let method = parts.next().ok_or(ParseError::InvalidRequest)?;
        let path = parts.next().ok_or(ParseError::InvalidRequest)?;
        let version = parts.next().ok_or(ParseError::InvalidRequest)?;

        if parts.next().is_some() || line.starts_with(' ') || line.ends_with(' ') {
            return Err(ParseError::InvalidRequest);
        }

        if !method.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(ParseError::InvalidMethod);
        }

        if path.chars().any(char::is_whitespace) || !is_http_version(version) {
            return Err(ParseError::InvalidRequest);
        }

        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            version: version.to_string(),
        })
    }

    /// The method, if it is one we know. Case-sensitive.
    pub fn method(&self) -> Option<Method> {
        Method::from_str(&self.method)
    }
}

/// `HTTP/<digits>.<digits>`
pub(crate) fn is_http_version(s: &str) -> bool {
    let Some(num) = s.strip_prefix("HTTP/") else {
        return false;
    };
    let Some((major, minor)) = num.split_once('.') else {
        return false;
    };

    let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    digits(major) && digits(minor)
}
