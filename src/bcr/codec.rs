//! BCL text <-> BCR2000 SysEx.

use std::fmt;

use super::DeviceMsg;
use crate::{
    bcl::{self, Command},
    midi::{self, Msg},
};

/// Encoding result.
///
/// `messages`, `origins` & `texts` are aligned: message `i` carries BCL index
/// `i`, comes from source line `origins[i]` and holds `texts[i]`.
#[derive(Debug, Default)]
pub struct Encoded {
    pub messages: Vec<Msg>,
    pub origins: Vec<usize>,
    pub texts: Vec<String>,
    pub diagnostics: Vec<EncodeDiagnostic>,
}

impl Encoded {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Source line for the message at `index`.
    pub fn origin(&self, index: u16) -> Option<usize> {
        self.origins.get(index as usize).copied()
    }

    /// Text sent in the message at `index`.
    pub fn text(&self, index: u16) -> Option<&str> {
        self.texts.get(index as usize).map(String::as_str)
    }

    /// Concatenates all messages, as stored in a `.syx` file.
    pub fn to_syx(&self) -> Vec<u8> {
        self.messages
            .iter()
            .flat_map(|msg| msg.inner().iter().copied())
            .collect()
    }

    fn push(&mut self, device_id: u8, line: usize, text: String) {
        let index = self.messages.len();
        let msg = u16::try_from(index)
            .map_err(|_| midi::Error::InvalidU14(u16::MAX))
            .and_then(|index| super::bcl_msg(device_id, index, text.as_bytes()));

        match msg {
            Ok(msg) => {
                self.messages.push(msg);
                self.origins.push(line);
                self.texts.push(text);
            }
            Err(_) => self
                .diagnostics
                .push(EncodeKind::IndexOverflow(index).at(line)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeDiagnostic {
    /// 1-based line in the source document.
    pub line: usize,
    pub kind: EncodeKind,
}

impl fmt::Display for EncodeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EncodeKind {
    #[error("non-ASCII char {found:?} replaced with '?'")]
    NonAscii { found: char },

    #[error("message index {} exceeds {}", .0, midi::u14::MAX)]
    IndexOverflow(usize),
}

impl EncodeKind {
    pub fn at(self, line: usize) -> EncodeDiagnostic {
        EncodeDiagnostic { line, kind: self }
    }
}

/// Encodes each line of `source` in its own message, as is.
///
/// Line `k` is sent as message index `k - 1`, blank and invalid lines
/// included, so that the indexes in the device replies designate source lines.
pub fn encode_verbatim(source: &str, device_id: u8) -> Encoded {
    let mut encoded = Encoded::default();

    for (idx, line_text) in bcl::lines(source).enumerate() {
        let line = idx + 1;

        let mut found = None;
        let text: String = line_text
            .chars()
            .map(|c| {
                if c.is_ascii() {
                    c
                } else {
                    found.get_or_insert(c);
                    '?'
                }
            })
            .collect();

        if let Some(found) = found {
            encoded
                .diagnostics
                .push(EncodeKind::NonAscii { found }.at(line));
        }

        encoded.push(device_id, line, text);
    }

    log::debug!(
        "Encoded {} lines verbatim, {} diagnostics",
        encoded.len(),
        encoded.diagnostics.len(),
    );

    encoded
}

/// Encodes `commands` in canonical form, one message per command.
///
/// Source formatting, comments & invalid lines are lost. Use `origins`
/// to map a message back to its source line.
pub fn encode_commands(commands: &[Command], device_id: u8) -> Encoded {
    let mut encoded = Encoded::default();

    for command in commands {
        // Canonical forms only use ASCII chars, but names are user defined.
        let mut text = command.kind.to_string();
        if let Some(found) = text.chars().find(|c| !c.is_ascii()) {
            encoded
                .diagnostics
                .push(EncodeKind::NonAscii { found }.at(command.line));
            text = text
                .chars()
                .map(|c| if c.is_ascii() { c } else { '?' })
                .collect();
        }

        encoded.push(device_id, command.line, text);
    }

    encoded
}

/// Returns the index & text of a BCL message.
pub fn decode_message(msg: &Msg) -> Option<(u16, String)> {
    match DeviceMsg::classify(msg)? {
        DeviceMsg::Bcl { index, text, .. } => Some((index, text)),
        _ => None,
    }
}

/// Rebuilds the BCL text from the BCL messages of `msgs`, in order.
///
/// Other messages are skipped.
pub fn decode(msgs: &[Msg]) -> String {
    let mut lines = msgs.iter().filter_map(|msg| decode_message(msg).map(|(_, text)| text));

    let mut text = lines.next().unwrap_or_default();
    for line in lines {
        text.push('\n');
        text.push_str(&line);
    }

    text
}
