use crate::bytes;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Couldn't create the MIDI client")]
    Init(#[from] midir::InitError),

    #[error("Couldn't open MIDI port {}", .0)]
    Connection(Arc<str>),

    #[error("No MIDI output port open")]
    NotConnected,

    #[error("MIDI client unavailable for a new connection")]
    PortConnection,

    #[error("Couldn't read a MIDI port name")]
    PortInfoError(#[from] midir::PortInfoError),

    #[error("No MIDI port named {}", .0)]
    PortNotFound(Arc<str>),

    #[error("Invalid 14 bits value {}", .0)]
    InvalidTwoBytesValue(bytes::Displayable<'static>),

    #[error("{} doesn't fit in 14 bits", .0)]
    InvalidU14(u16),

    #[error("Not a SysEx message {}", .0)]
    InvalidSysExInitTag(bytes::Displayable<'static>),

    #[error("Unterminated SysEx message {}", .0)]
    InvalidSysExFinalTag(bytes::Displayable<'static>),

    #[error("Couldn't send MIDI message")]
    Send(#[from] midir::SendError),
}
