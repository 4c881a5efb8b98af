//! Prompt list file format: one base64-encoded ASCII prompt per line.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("prompt {line} contains non-ASCII characters and cannot be exported")]
    NonAscii { line: usize },
    #[error("line {line} is not valid base64: {source}")]
    InvalidBase64 {
        line: usize,
        #[source]
        source: base64::DecodeError,
    },
    #[error("line {line} does not decode to ASCII text")]
    NotAscii { line: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Encode a prompt list. Fails without producing output if any prompt is not ASCII.
pub fn encode_list<S: AsRef<str>>(prompts: &[S]) -> Result<String, CodecError> {
    let mut out = String::new();
    for (i, prompt) in prompts.iter().enumerate() {
        let prompt = prompt.as_ref();
        if !prompt.is_ascii() {
            return Err(CodecError::NonAscii { line: i + 1 });
        }
        out.push_str(&BASE64.encode(prompt.as_bytes()));
        out.push('\n');
    }
    Ok(out)
}

/// Decode a prompt list. Every line is validated before anything is returned,
/// so callers can replace their list atomically.
pub fn decode_list(data: &[u8]) -> Result<Vec<String>, CodecError> {
    let mut lines: Vec<&[u8]> = data.split(|b| *b == b'\n').collect();
    // A trailing newline terminates the last line rather than starting a new one.
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            let line = i + 1;
            let bytes = BASE64
                .decode(raw.trim_ascii_end())
                .map_err(|source| CodecError::InvalidBase64 { line, source })?;
            if !bytes.is_ascii() {
                return Err(CodecError::NotAscii { line });
            }
            String::from_utf8(bytes).map_err(|_| CodecError::NotAscii { line })
        })
        .collect()
}
