use super::{sysex, Error};
use crate::bytes;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Msg(Box<[u8]>);

impl Msg {
    pub fn inner(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn display(&self) -> bytes::Displayable {
        bytes::Displayable::from(self.0.as_ref())
    }

    pub fn new_sysex(data: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(data.len() + 2);

        buf.push(sysex::TAG);
        buf.extend(data);
        buf.push(sysex::END_TAG);

        Self(buf.into())
    }

    pub fn is_sysex(&self) -> bool {
        self.try_get_sysex_data().is_ok()
    }

    /// Returns the bytes between the SysEx start and end tags.
    pub fn try_get_sysex_data(&self) -> Result<&[u8], Error> {
        match (self.0.first(), self.0.last()) {
            (Some(&sysex::TAG), Some(&sysex::END_TAG)) if self.0.len() >= 2 => {
                Ok(&self.0[1..self.0.len() - 1])
            }
            (Some(&sysex::TAG), _) => Err(Error::InvalidSysExFinalTag(self.display().to_owned())),
            _ => Err(Error::InvalidSysExInitTag(self.display().to_owned())),
        }
    }

    /// Splits a raw byte stream, e.g. a `.syx` file, into SysEx messages.
    ///
    /// Bytes found outside of a `F0 .. F7` frame are skipped. A frame
    /// interrupted by a new start tag or by the end of the stream is dropped.
    pub fn split_sysex_stream(stream: &[u8]) -> Vec<Msg> {
        let mut list = Vec::new();
        let mut start = None;
        let mut skipped = 0usize;

        for (idx, &byte) in stream.iter().enumerate() {
            match byte {
                sysex::TAG => {
                    if let Some(prev) = start.replace(idx) {
                        log::warn!("Dropping unterminated SysEx frame at offset {prev}");
                    }
                }
                sysex::END_TAG => match start.take() {
                    Some(begin) => list.push(Msg::from(&stream[begin..=idx])),
                    None => skipped += 1,
                },
                _ if start.is_none() => skipped += 1,
                _ => (),
            }
        }

        if let Some(begin) = start {
            log::warn!("Dropping unterminated SysEx frame at offset {begin}");
        }
        if skipped > 0 {
            log::debug!("Skipped {skipped} bytes outside of SysEx frames");
        }

        list
    }
}

impl<const S: usize> From<[u8; S]> for Msg {
    fn from(buf: [u8; S]) -> Self {
        Self(buf.into())
    }
}

impl From<&[u8]> for Msg {
    fn from(buf: &[u8]) -> Self {
        Self(buf.into())
    }
}

impl From<Vec<u8>> for Msg {
    fn from(buf: Vec<u8>) -> Self {
        Self(buf.into())
    }
}

impl std::ops::Deref for Msg {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}
