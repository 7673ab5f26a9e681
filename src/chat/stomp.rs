//! STOMP 1.2 text frame codec used for the chat broker connection.
//!
//! A frame is `COMMAND\n(header:value\n)*\nbody\0`. Header names and values
//! escape `\`, LF, CR and `:` (`\\`, `\n`, `\r`, `\c`). A frame made of only
//! line endings is a heart-beat and decodes to `None`.

/// Error returned by [`decode_frame`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum StompError {
    #[error("frame is missing a command line")]
    MissingCommand,
    #[error("unknown STOMP command: {0}")]
    UnknownCommand(String),
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header: \\{0}")]
    InvalidEscape(char),
    #[error("frame is missing the blank line before the body")]
    MissingBody,
}

/// STOMP commands this client sends or understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
        }
    }

    fn parse(raw: &str) -> Result<Self, StompError> {
        Ok(match raw {
            "CONNECT" | "STOMP" => Self::Connect,
            "CONNECTED" => Self::Connected,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "SEND" => Self::Send,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            "DISCONNECT" => Self::Disconnect,
            other => return Err(StompError::UnknownCommand(other.to_owned())),
        })
    }
}

/// A decoded or to-be-encoded STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: Command,
    /// Headers in wire order. Repeated names keep the first occurrence on lookup.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn connect(host: &str, bearer: Option<&str>) -> Self {
        let mut frame = Self::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0");
        if let Some(token) = bearer {
            frame = frame.header("Authorization", format!("Bearer {token}"));
        }
        frame
    }

    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    #[must_use]
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).header("id", id)
    }

    #[must_use]
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        Self::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .with_body(body)
    }
}

/// Encode a frame to its wire text, including the trailing NUL.
///
/// CONNECT frames are written without header escaping, as STOMP 1.2 requires.
#[must_use]
pub fn encode_frame(frame: &StompFrame) -> String {
    let escape = frame.command != Command::Connect;
    let mut out = String::with_capacity(64 + frame.body.len());
    out.push_str(frame.command.as_str());
    out.push('\n');
    for (name, value) in &frame.headers {
        if escape {
            push_escaped(&mut out, name);
            out.push(':');
            push_escaped(&mut out, value);
        } else {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
        }
        out.push('\n');
    }
    if !frame.body.is_empty() && frame.command == Command::Send {
        out.push_str("content-length:");
        out.push_str(&frame.body.len().to_string());
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&frame.body);
    out.push('\0');
    out
}

/// Decode one frame of wire text. Returns `Ok(None)` for heart-beats.
///
/// # Errors
///
/// Returns a [`StompError`] when the command is unknown, a header line has no
/// colon, an escape sequence is invalid, or the header block is unterminated.
pub fn decode_frame(raw: &str) -> Result<Option<StompFrame>, StompError> {
    let raw = raw.strip_suffix('\0').unwrap_or(raw);
    let raw = raw.trim_start_matches(['\r', '\n']);
    if raw.is_empty() {
        return Ok(None);
    }

    let (head, body) = split_head_body(raw).ok_or(StompError::MissingBody)?;
    let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
    let command_line = lines.next().ok_or(StompError::MissingCommand)?;
    if command_line.is_empty() {
        return Err(StompError::MissingCommand);
    }
    let command = Command::parse(command_line)?;
    let unescape_headers = !matches!(command, Command::Connect | Command::Connected);

    let mut headers = Vec::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            return Err(StompError::MalformedHeader(line.to_owned()));
        };
        if unescape_headers {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_owned(), value.to_owned()));
        }
    }

    Ok(Some(StompFrame { command, headers, body: body.to_owned() }))
}

fn split_head_body(raw: &str) -> Option<(&str, &str)> {
    // The first empty line, with or without a trailing CR, ends the headers.
    let mut start = 0;
    while let Some(offset) = raw[start..].find('\n') {
        let end = start + offset;
        if matches!(&raw[start..end], "" | "\r") {
            let head = &raw[..start];
            let head = head.strip_suffix('\n').unwrap_or(head);
            return Some((head, &raw[end + 1..]));
        }
        start = end + 1;
    }
    // Header-only frame with no body separator but a trailing newline.
    raw.strip_suffix('\n').map(|head| (head, ""))
}

fn push_escaped(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => return Err(StompError::InvalidEscape(other)),
            None => return Err(StompError::InvalidEscape(' ')),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "stomp_test.rs"]
mod tests;
