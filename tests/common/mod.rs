//! Simulated BCR2000 transports.
#![allow(dead_code)]

use crossbeam_channel as channel;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    thread,
};

use bcr_master::{
    bcr::{self, command},
    midi::{self, Msg, PortName},
    transport::{Handler, HandlerId, Handlers, Transport},
};

pub const VERSION: &str = "BCR2000 1.10";

/// How the simulated device reacts to what it receives.
#[derive(Clone, Default)]
pub struct Behaviour {
    pub device_id: u8,
    /// BCL lines for each preset byte of a data request.
    pub presets: HashMap<u8, Vec<String>>,
    /// Error codes for trimmed BCL texts.
    pub errors: HashMap<String, u8>,
    /// Interleave unrelated messages with the replies.
    pub noise: bool,
    /// Never answer.
    pub silent: bool,
}

impl Behaviour {
    pub fn new(device_id: u8) -> Self {
        Self {
            device_id,
            ..Default::default()
        }
    }

    /// `number` is 1 to 32, or `None` for the edit buffer.
    pub fn with_preset(mut self, number: Option<u8>, text: &str) -> Self {
        let key = number.map_or(0x7e, |number| number - 1);
        self.presets
            .insert(key, text.split('\n').map(str::to_string).collect());
        self
    }

    pub fn with_error(mut self, text: &str, code: u8) -> Self {
        self.errors.insert(text.trim().to_string(), code);
        self
    }

    pub fn with_noise(mut self) -> Self {
        self.noise = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    fn noise(&self) -> Vec<Msg> {
        if !self.noise {
            return Vec::new();
        }

        vec![
            // note on
            Msg::from([0x90, 0x40, 0x7f]),
            // Mackie device query
            Msg::from([0xf0, 0x00, 0x00, 0x66, 0x14, 0x00, 0xf7]),
            // BCF2000 BCL message
            Msg::from([0xf0, 0x00, 0x20, 0x32, 0x00, 0x14, 0x20, 0x00, 0x00, b'x', 0xf7]),
        ]
    }

    pub fn answer(&self, msg: &Msg) -> Vec<Msg> {
        if self.silent {
            return Vec::new();
        }

        let data = match msg.try_get_sysex_data() {
            Ok(data) if data.len() >= 6 && data[..3] == bcr::BEHRINGER_ID => data,
            _ => return Vec::new(),
        };
        if data[3] != self.device_id && data[3] != bcr::ANY_DEVICE {
            return Vec::new();
        }

        let mut replies = self.noise();
        match data[5] {
            command::REQUEST_IDENTITY => replies.push(bcr::new_msg(
                self.device_id,
                command::SEND_IDENTITY,
                VERSION.as_bytes(),
            )),
            command::BCL_MESSAGE if data.len() >= 8 => {
                let text = String::from_utf8_lossy(&data[8..]);
                let code = self.errors.get(text.trim()).copied().unwrap_or(0);
                replies.push(bcr::new_msg(
                    self.device_id,
                    command::BCL_REPLY,
                    &[data[6], data[7], code],
                ));
            }
            command::REQUEST_DATA => {
                let lines = data
                    .get(6)
                    .and_then(|preset| self.presets.get(preset))
                    .cloned()
                    .unwrap_or_default();
                for (index, line) in lines.iter().enumerate() {
                    replies.push(
                        bcr::bcl_msg(self.device_id, index as u16, line.as_bytes()).unwrap(),
                    );
                    replies.extend(self.noise());
                }
            }
            _ => (),
        }

        replies
    }
}

/// A BCR2000 answering from its own delivery thread.
pub struct FakeBcr {
    port: PortName,
    tx: channel::Sender<Msg>,
    handlers: Arc<Handlers>,
    sent: Mutex<Vec<Msg>>,
}

impl FakeBcr {
    pub fn spawn(port: &str, behaviour: Behaviour) -> Arc<Self> {
        let port: PortName = port.into();
        let handlers = Arc::new(Handlers::default());
        let (tx, rx) = channel::unbounded::<Msg>();

        thread::spawn({
            let port = port.clone();
            let handlers = handlers.clone();
            move || {
                for msg in rx {
                    for reply in behaviour.answer(&msg) {
                        handlers.dispatch(&port, &reply);
                    }
                }
            }
        });

        Arc::new(Self {
            port,
            tx,
            handlers,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<Msg> {
        self.sent.lock().unwrap().clone()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Transport for FakeBcr {
    fn send(&self, msg: &Msg) -> Result<(), midi::Error> {
        self.sent.lock().unwrap().push(msg.clone());
        self.tx.send(msg.clone()).map_err(|_| midi::Error::NotConnected)
    }

    fn register_handler(&self, id: HandlerId, handler: Handler) {
        self.handlers.register(id, handler);
    }

    fn remove_handler(&self, id: HandlerId) {
        self.handlers.remove(id);
    }
}

/// A transport on which the test delivers each inbound message itself.
#[derive(Default)]
pub struct ManualTransport {
    handlers: Handlers,
    sent: Mutex<Vec<Msg>>,
}

impl ManualTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deliver(&self, msg: &Msg) {
        let port: PortName = "manual".into();
        self.handlers.dispatch(&port, msg);
    }

    pub fn sent(&self) -> Vec<Msg> {
        self.sent.lock().unwrap().clone()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Transport for ManualTransport {
    fn send(&self, msg: &Msg) -> Result<(), midi::Error> {
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }

    fn register_handler(&self, id: HandlerId, handler: Handler) {
        self.handlers.register(id, handler);
    }

    fn remove_handler(&self, id: HandlerId) {
        self.handlers.remove(id);
    }
}

/// Device side BCL message.
pub fn bcl(index: u16, text: &str) -> Msg {
    bcr::bcl_msg(0, index, text.as_bytes()).unwrap()
}

pub fn handle(port: &str, device_id: u8) -> bcr::DeviceHandle {
    bcr::DeviceHandle::new(midi::PortPair::new(port, port), device_id)
}
