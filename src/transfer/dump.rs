use std::time::Duration;

use super::{Machine, Step};
use crate::{
    bcl::token::{self, Token},
    bcr::{self, DeviceMsg, Preset},
    midi::Msg,
    Error,
};

const END_MARKER: &str = "$end";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accepted {
    /// Not a BCL message from the expected device.
    No,
    Chunk,
    /// The end of dump marker.
    Last,
}

/// Collects the messages of one dump.
#[derive(Debug)]
pub struct DumpAccumulator {
    preset: Preset,
    device_id: u8,
    messages: Vec<Msg>,
}

impl DumpAccumulator {
    /// Accepts the messages from `device_id` or from any device
    /// if `device_id` is [`bcr::ANY_DEVICE`].
    pub fn new(preset: Preset, device_id: u8) -> Self {
        Self {
            preset,
            device_id,
            messages: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn accept(&mut self, msg: &Msg) -> Accepted {
        let (device_id, index, text) = match DeviceMsg::classify(msg) {
            Some(DeviceMsg::Bcl {
                device_id,
                index,
                text,
            }) => (device_id, index, text),
            _ => return Accepted::No,
        };

        if self.device_id != bcr::ANY_DEVICE && device_id != self.device_id {
            log::debug!("Ignoring BCL message from device {device_id:#02x}");
            return Accepted::No;
        }

        if index as usize != self.messages.len() {
            log::warn!(
                "Dump chunk index {index}, expected {}. Keeping arrival order",
                self.messages.len(),
            );
        }

        self.messages.push(msg.clone());

        if text.trim() == END_MARKER {
            Accepted::Last
        } else {
            Accepted::Chunk
        }
    }

    /// Hands over the collected messages, leaving the accumulator empty.
    pub fn take(&mut self) -> Dump {
        Dump {
            preset: self.preset,
            messages: std::mem::take(&mut self.messages),
        }
    }
}

impl Machine for DumpAccumulator {
    type Output = Dump;
    const NAME: &'static str = "dump";

    fn start(&mut self) -> Step<Dump> {
        log::debug!("Requesting {}", self.preset);
        Step::Progress(vec![self.preset.request_msg(self.device_id)])
    }

    fn on_msg(&mut self, msg: &Msg) -> Step<Dump> {
        match self.accept(msg) {
            Accepted::No => Step::Ignored,
            Accepted::Chunk => Step::progress(),
            Accepted::Last => {
                let dump = self.take();
                log::info!("Received {} with {} messages", dump.preset, dump.len());
                Step::Done(Ok(dump))
            }
        }
    }

    fn on_timeout(&mut self, after: Duration) -> Result<Dump, Error> {
        if !self.is_empty() {
            log::warn!(
                "Discarding partial dump of {} after {} messages",
                self.preset,
                self.len(),
            );
        }

        Err(Error::Timeout(after))
    }
}

/// A complete preset dump.
#[derive(Clone, Debug)]
pub struct Dump {
    preset: Preset,
    messages: Vec<Msg>,
}

impl Dump {
    pub fn preset(&self) -> Preset {
        self.preset
    }

    pub fn messages(&self) -> &[Msg] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn to_bcl(&self) -> String {
        bcr::decode(&self.messages)
    }

    pub fn to_syx(&self) -> Vec<u8> {
        self.messages
            .iter()
            .flat_map(|msg| msg.inner().iter().copied())
            .collect()
    }

    /// The first `.name` of the dump.
    pub fn preset_name(&self) -> Option<String> {
        self.messages
            .iter()
            .filter_map(bcr::codec::decode_message)
            .find_map(|(_, text)| match token::tokenize(&text).ok()?.as_slice() {
                [Token::Statement(kw), Token::Str(name)] if kw.eq_ignore_ascii_case("name") => {
                    Some(name.trim_end().to_string())
                }
                _ => None,
            })
    }
}
