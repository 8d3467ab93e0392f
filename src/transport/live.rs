use std::sync::{Arc, Mutex};

use super::{Handler, HandlerId, Handlers, Transport};
use crate::midi::{self, PortName, PortPair};

/// A [`Transport`] on a midir input / output port pair.
///
/// Inbound messages are dispatched on the midir callback thread.
pub struct MidiTransport {
    ins: Mutex<midi::PortsIn<Arc<Handlers>>>,
    outs: Mutex<midi::PortsOut>,
    handlers: Arc<Handlers>,
}

impl MidiTransport {
    pub fn try_new(client_name: &str) -> Result<Self, midi::Error> {
        let client_name: Arc<str> = client_name.into();
        let handlers = Arc::new(Handlers::default());

        let mut ins = midi::PortsIn::try_new(client_name.clone(), handlers.clone())?;
        let mut outs = midi::PortsOut::try_new(client_name)?;
        ins.refresh()?;
        outs.refresh()?;

        Ok(Self {
            ins: Mutex::new(ins),
            outs: Mutex::new(outs),
            handlers,
        })
    }

    pub fn ins(&self) -> Vec<PortName> {
        self.ins.lock().unwrap().list().cloned().collect()
    }

    pub fn outs(&self) -> Vec<PortName> {
        self.outs.lock().unwrap().list().cloned().collect()
    }

    /// Lists the port pairs which could lead to a device.
    pub fn candidates(&self) -> Vec<PortPair> {
        PortPair::candidates(&self.ins(), &self.outs())
    }

    /// Checks that both ports of `ports` are still available.
    pub fn is_available(&self, ports: &PortPair) -> bool {
        self.ins.lock().unwrap().contains(&ports.input)
            && self.outs.lock().unwrap().contains(&ports.output)
    }

    pub fn connect(&self, ports: &PortPair) -> Result<(), midi::Error> {
        let port_name = ports.input.clone();
        self.ins.lock().unwrap().connect(
            ports.input.clone(),
            move |_ts, buf, handlers: &mut Arc<Handlers>| {
                handlers.dispatch(&port_name, &midi::Msg::from(buf));
            },
        )?;

        if let Err(err) = self.outs.lock().unwrap().connect(ports.output.clone()) {
            self.ins.lock().unwrap().disconnect();
            return Err(err);
        }

        Ok(())
    }

    pub fn disconnect(&self) {
        self.ins.lock().unwrap().disconnect();
        self.outs.lock().unwrap().disconnect();
    }
}

impl Transport for MidiTransport {
    fn send(&self, msg: &midi::Msg) -> Result<(), midi::Error> {
        log::trace!("Sending {}", msg.display());
        self.outs.lock().unwrap().send(msg)
    }

    fn register_handler(&self, id: HandlerId, handler: Handler) {
        self.handlers.register(id, handler);
    }

    fn remove_handler(&self, id: HandlerId) {
        self.handlers.remove(id);
    }
}

impl Drop for MidiTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
