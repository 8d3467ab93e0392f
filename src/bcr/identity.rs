use std::fmt;

use super::{command, DeviceMsg, ANY_DEVICE};
use crate::midi::Msg;

/// Answer to an identity request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub device_id: u8,
    pub model: u8,
    /// e.g. `BCR2000 1.10`.
    pub version: String,
}

impl Identity {
    /// Message asking any connected BCR2000 to identify itself.
    pub fn request_msg() -> Msg {
        super::new_msg(ANY_DEVICE, command::REQUEST_IDENTITY, &[])
    }

    pub fn from_msg(msg: &Msg) -> Option<Self> {
        match DeviceMsg::classify(msg)? {
            DeviceMsg::Identity {
                device_id,
                model,
                text,
            } => Some(Identity {
                device_id,
                model,
                version: text.trim_end_matches(&['\0', ' '][..]).to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (device {})", self.version, u16::from(self.device_id) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request() {
        assert_eq!(
            Identity::request_msg().inner(),
            [0xf0, 0x00, 0x20, 0x32, 0x7f, 0x15, 0x01, 0xf7]
        );
    }

    #[test]
    fn reply() {
        let mut buf = vec![0xf0, 0x00, 0x20, 0x32, 0x02, 0x15, 0x02];
        buf.extend(b"BCR2000 1.10\0");
        buf.push(0xf7);

        let identity = Identity::from_msg(&Msg::from(buf)).unwrap();
        assert_eq!(identity.device_id, 2);
        assert_eq!(identity.version, "BCR2000 1.10");
        assert_eq!(identity.to_string(), "BCR2000 1.10 (device 3)");
    }

    #[test]
    fn not_an_identity() {
        // the request itself, as echoed by a MIDI thru
        assert!(Identity::from_msg(&Identity::request_msg()).is_none());

        let other = Msg::from([0xf0, 0x7e, 0x7f, 0x06, 0x02, 0xf7]);
        assert!(Identity::from_msg(&other).is_none());

        let bad_id = Msg::from([0xf0, 0x00, 0x20, 0x32, 0xff, 0x15, 0x02, b'B', 0xf7]);
        assert!(Identity::from_msg(&bad_id).is_none());
    }

    #[test]
    fn display_out_of_range_id() {
        let identity = Identity {
            device_id: 0xff,
            model: crate::bcr::model::BCR2000,
            version: "BCR2000 1.10".into(),
        };
        assert_eq!(identity.to_string(), "BCR2000 1.10 (device 256)");
    }
}
