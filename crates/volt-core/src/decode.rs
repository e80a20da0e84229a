use serde_json::Value;

/// Text that is neither a JSON document nor newline-delimited JSON.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

/// Result of the two-stage decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The whole text was one JSON value.
    Document(Value),
    /// Newline-delimited JSON; only the lines that parsed.
    Lines(Vec<Value>),
}

pub fn decode(text: &str) -> Result<Decoded, ParseError> {
    let strict_err = match serde_json::from_str::<Value>(text) {
        Ok(value) => return Ok(Decoded::Document(value)),
        Err(e) => e,
    };

    let mut lines = Vec::new();
    let mut skipped = 0usize;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<Value>(line) {
            Ok(value) => lines.push(value),
            Err(_) => skipped += 1,
        }
    }

    if lines.is_empty() {
        return Err(ParseError {
            message: format!("input is not valid JSON ({strict_err}) and has no valid JSON lines"),
        });
    }
    if skipped > 0 {
        tracing::warn!(skipped, kept = lines.len(), "skipped invalid JSON lines");
    }
    Ok(Decoded::Lines(lines))
}
