//! Behringer BCR2000 SysEx protocol.
//!
//! Every message exchanged with the device is framed as
//! `F0 00 20 32 <device id> <model> <command> ... F7`.

use std::{fmt, str::FromStr};

use crate::midi::{self, Msg, PortPair};

pub mod codec;
pub use codec::{decode, encode_commands, encode_verbatim, Encoded};

pub mod device;
pub use device::Bcr2000;

pub mod error_code;

pub mod identity;
pub use identity::Identity;

pub const BEHRINGER_ID: [u8; 3] = [0x00, 0x20, 0x32];

/// Device id which all devices answer to.
pub const ANY_DEVICE: u8 = 0x7f;

/// Device ids which can be set on a BCR2000.
pub const DEVICE_IDS: std::ops::RangeInclusive<u8> = 0x00..=0x0f;

/// Whether `device_id` designates one device or all of them.
pub fn is_valid_device_id(device_id: u8) -> bool {
    DEVICE_IDS.contains(&device_id) || device_id == ANY_DEVICE
}

pub mod model {
    pub const BCR2000: u8 = 0x15;
    pub const ANY: u8 = 0x7f;
}

pub mod command {
    pub const REQUEST_IDENTITY: u8 = 0x01;
    pub const SEND_IDENTITY: u8 = 0x02;
    pub const BCL_MESSAGE: u8 = 0x20;
    pub const BCL_REPLY: u8 = 0x21;
    pub const REQUEST_DATA: u8 = 0x40;
}

/// Manufacturer id, device id, model & command.
const HEADER_LEN: usize = 6;

fn header(device_id: u8, command: u8) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..3].copy_from_slice(&BEHRINGER_ID);
    header[3] = device_id;
    header[4] = model::BCR2000;
    header[5] = command;

    header
}

/// Builds a BCR2000 message for `command` with `payload`.
pub fn new_msg(device_id: u8, command: u8, payload: &[u8]) -> Msg {
    let mut data = Vec::with_capacity(HEADER_LEN + payload.len());
    data.extend(header(device_id, command));
    data.extend(payload);

    Msg::new_sysex(&data)
}

/// Builds a BCL message carrying `text` at `index`.
///
/// `text` must only contain 7 bits bytes.
pub fn bcl_msg(device_id: u8, index: u16, text: &[u8]) -> Result<Msg, midi::Error> {
    let mut payload = Vec::with_capacity(2 + text.len());
    payload.extend(midi::u14::to_msb_lsb(index)?);
    payload.extend(text);

    Ok(new_msg(device_id, command::BCL_MESSAGE, &payload))
}

/// Returns the data following the header if `msg` comes from a BCR2000.
fn bcr2000_data(msg: &Msg) -> Option<&[u8]> {
    let data = msg.try_get_sysex_data().ok()?;
    if data.len() < HEADER_LEN || data[..3] != BEHRINGER_ID {
        return None;
    }
    if data.iter().any(|&byte| byte > 0x7f) {
        log::debug!("Rejecting BCR2000 message with 8 bits data {}", msg.display());
        return None;
    }

    match data[4] {
        model::BCR2000 | model::ANY => Some(data),
        _ => None,
    }
}

/// Checks the framing, manufacturer & model of `msg`.
pub fn is_from_bcr2000(msg: &Msg) -> bool {
    bcr2000_data(msg).is_some()
}

/// A message sent by a BCR2000, decoded according to its command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceMsg {
    Identity {
        device_id: u8,
        model: u8,
        text: String,
    },
    Bcl {
        device_id: u8,
        index: u16,
        text: String,
    },
    BclReply {
        device_id: u8,
        index: u16,
        code: u8,
    },
    Other {
        device_id: u8,
        command: u8,
    },
}

impl DeviceMsg {
    /// Classifies `msg`.
    ///
    /// Returns `None` if `msg` doesn't come from a BCR2000 or if its
    /// payload doesn't match its command.
    pub fn classify(msg: &Msg) -> Option<Self> {
        let data = bcr2000_data(msg)?;
        let device_id = data[3];
        let payload = &data[HEADER_LEN..];

        let this = match data[5] {
            command::SEND_IDENTITY => DeviceMsg::Identity {
                device_id,
                model: data[4],
                text: ascii_text(payload),
            },
            command::BCL_MESSAGE => DeviceMsg::Bcl {
                device_id,
                index: index(msg, payload)?,
                text: ascii_text(&payload[2..]),
            },
            command::BCL_REPLY => {
                let code = match payload.get(2) {
                    Some(code) => *code,
                    None => {
                        log::debug!("Missing error code in BCL reply {}", msg.display());
                        return None;
                    }
                };
                DeviceMsg::BclReply {
                    device_id,
                    index: index(msg, payload)?,
                    code,
                }
            }
            command => DeviceMsg::Other { device_id, command },
        };

        Some(this)
    }
}

fn index(msg: &Msg, payload: &[u8]) -> Option<u16> {
    payload
        .get(..2)
        .and_then(|buf| midi::u14::from_msb_lsb(buf).ok())
        .or_else(|| {
            log::debug!("Invalid message index in {}", msg.display());
            None
        })
}

/// `buf` only holds 7 bits bytes, see [`bcr2000_data`].
fn ascii_text(buf: &[u8]) -> String {
    buf.iter().map(|&byte| byte as char).collect()
}

/// A port pair known to lead to a BCR2000.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceHandle {
    pub ports: PortPair,
    pub device_id: u8,
}

impl DeviceHandle {
    pub fn new(ports: PortPair, device_id: u8) -> Self {
        Self { ports, device_id }
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (device {})", self.ports, u16::from(self.device_id) + 1)
    }
}

/// A preset memory on the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preset {
    /// Preset number 1 to 32.
    Number(u8),
    /// The temporary preset currently being edited.
    EditBuffer,
}

impl Preset {
    pub const COUNT: u8 = 32;
    const EDIT_BUFFER: u8 = 0x7e;

    pub fn try_from_number(number: u8) -> Result<Self, crate::Error> {
        if (1..=Self::COUNT).contains(&number) {
            Ok(Preset::Number(number))
        } else {
            Err(crate::Error::InvalidPreset(number.to_string()))
        }
    }

    pub fn all() -> impl Iterator<Item = Preset> {
        (1..=Self::COUNT).map(Preset::Number)
    }

    /// Builds the message which makes the device dump this preset.
    pub fn request_msg(self, device_id: u8) -> Msg {
        let preset = match self {
            Preset::Number(number) => number - 1,
            Preset::EditBuffer => Self::EDIT_BUFFER,
        };

        new_msg(device_id, command::REQUEST_DATA, &[preset])
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preset::Number(number) => write!(f, "preset {number}"),
            Preset::EditBuffer => f.write_str("edit buffer"),
        }
    }
}

impl FromStr for Preset {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("edit") || s.eq_ignore_ascii_case("temp") {
            return Ok(Preset::EditBuffer);
        }

        let number = s
            .parse::<u8>()
            .map_err(|_| crate::Error::InvalidPreset(s.to_string()))?;

        Self::try_from_number(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let msg = Msg::from([
            0xf0, 0x00, 0x20, 0x32, 0x00, 0x15, 0x20, 0x00, 0x01, b'$', b'e', b'n', b'd', 0xf7,
        ]);
        assert!(is_from_bcr2000(&msg));
        assert_eq!(
            DeviceMsg::classify(&msg),
            Some(DeviceMsg::Bcl {
                device_id: 0,
                index: 1,
                text: "$end".into(),
            })
        );

        let reply = Msg::from([0xf0, 0x00, 0x20, 0x32, 0x01, 0x7f, 0x21, 0x00, 0x05, 0x0c, 0xf7]);
        assert_eq!(
            DeviceMsg::classify(&reply),
            Some(DeviceMsg::BclReply {
                device_id: 1,
                index: 5,
                code: 12,
            })
        );
    }

    #[test]
    fn foreign_messages() {
        // Mackie
        let msg = Msg::from([0xf0, 0x00, 0x00, 0x66, 0x14, 0x15, 0x20, 0x00, 0x00, 0xf7]);
        assert!(!is_from_bcr2000(&msg));
        // BCF2000
        let msg = Msg::from([0xf0, 0x00, 0x20, 0x32, 0x00, 0x14, 0x20, 0x00, 0x00, 0xf7]);
        assert!(!is_from_bcr2000(&msg));
        // Not terminated
        let msg = Msg::from([0xf0, 0x00, 0x20, 0x32, 0x00, 0x15, 0x20, 0x00, 0x00]);
        assert!(!is_from_bcr2000(&msg));
        // No command
        let msg = Msg::from([0xf0, 0x00, 0x20, 0x32, 0x00, 0x15, 0xf7]);
        assert!(!is_from_bcr2000(&msg));
        // Note on
        assert!(DeviceMsg::classify(&Msg::from([0x90, 0x40, 0x7f])).is_none());
    }

    #[test]
    fn eight_bits_data() {
        // device byte
        let msg = Msg::from([0xf0, 0x00, 0x20, 0x32, 0xff, 0x15, 0x02, b'B', 0xf7]);
        assert!(!is_from_bcr2000(&msg));
        assert_eq!(DeviceMsg::classify(&msg), None);

        // text
        let msg = Msg::from([0xf0, 0x00, 0x20, 0x32, 0x00, 0x15, 0x20, 0x00, 0x00, 0xe9, 0xf7]);
        assert_eq!(DeviceMsg::classify(&msg), None);
    }

    #[test]
    fn device_ids() {
        assert!(is_valid_device_id(0));
        assert!(is_valid_device_id(0x0f));
        assert!(is_valid_device_id(ANY_DEVICE));
        assert!(!is_valid_device_id(0x10));
        assert!(!is_valid_device_id(0xff));

        let handle = DeviceHandle::new(PortPair::new("BCR", "BCR"), 0xff);
        assert_eq!(handle.to_string(), "BCR (device 256)");
    }

    #[test]
    fn truncated_bcl_message() {
        let msg = Msg::from([0xf0, 0x00, 0x20, 0x32, 0x00, 0x15, 0x20, 0x00, 0xf7]);
        assert!(is_from_bcr2000(&msg));
        assert_eq!(DeviceMsg::classify(&msg), None);
    }

    #[test]
    fn build_messages() {
        let msg = bcl_msg(ANY_DEVICE, 130, b"$rev R1").unwrap();
        assert_eq!(
            msg.inner(),
            [
                0xf0, 0x00, 0x20, 0x32, 0x7f, 0x15, 0x20, 0x01, 0x02, b'$', b'r', b'e', b'v', b' ',
                b'R', b'1', 0xf7
            ]
        );

        assert_eq!(
            Preset::Number(1).request_msg(0).inner(),
            [0xf0, 0x00, 0x20, 0x32, 0x00, 0x15, 0x40, 0x00, 0xf7]
        );
        assert_eq!(
            Preset::EditBuffer.request_msg(0).inner(),
            [0xf0, 0x00, 0x20, 0x32, 0x00, 0x15, 0x40, 0x7e, 0xf7]
        );
    }

    #[test]
    fn parse_preset() {
        assert_eq!("12".parse::<Preset>().unwrap(), Preset::Number(12));
        assert_eq!("EDIT".parse::<Preset>().unwrap(), Preset::EditBuffer);
        assert!("0".parse::<Preset>().is_err());
        assert!("33".parse::<Preset>().is_err());
        assert!("first".parse::<Preset>().is_err());
    }
}
