use std::{collections::BTreeMap, fmt, sync::Arc};

use midir::MidiIO;

use super::{
    io::{Close, InputLink, Link, OutputLink},
    Error, Msg,
};

pub type PortName = Arc<str>;

pub type PortsIn<D> = Ports<midir::MidiInputConnection<D>>;
pub type PortsOut = Ports<midir::MidiOutputConnection>;

/// An input and an output port which are expected to reach the same device.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortPair {
    pub input: PortName,
    pub output: PortName,
}

impl PortPair {
    pub fn new(input: impl Into<PortName>, output: impl Into<PortName>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    /// Pairs the input & output ports sharing the same name.
    pub fn candidates<'a>(
        ins: impl IntoIterator<Item = &'a PortName>,
        outs: impl IntoIterator<Item = &'a PortName>,
    ) -> Vec<PortPair> {
        let outs: Vec<&PortName> = outs.into_iter().collect();

        ins.into_iter()
            .filter(|input| outs.iter().any(|output| output == input))
            .map(|name| PortPair::new(name.clone(), name.clone()))
            .collect()
    }
}

impl fmt::Display for PortPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.input == self.output {
            f.write_str(&self.input)
        } else {
            write!(f, "{} / {}", self.input, self.output)
        }
    }
}

/// The ports available in one direction & the one we are connected to.
pub struct Ports<C: Close> {
    map: BTreeMap<PortName, <C::Io as MidiIO>::Port>,
    cur: Option<PortName>,
    link: Link<C>,
    client_name: Arc<str>,
}

impl<C: Close> Ports<C> {
    pub fn list(&self) -> impl Iterator<Item = &PortName> + '_ {
        self.map.keys()
    }

    pub fn contains(&self, port_name: &str) -> bool {
        self.map.contains_key(port_name)
    }

    fn port(&self, port_name: &PortName) -> Result<<C::Io as MidiIO>::Port, Error> {
        self.map
            .get(port_name)
            .cloned()
            .ok_or_else(|| Error::PortNotFound(port_name.clone()))
    }

    fn refresh_from(&mut self, client: C::Io) -> Result<(), Error> {
        self.map.clear();

        for port in client.ports().iter() {
            let name = client.port_name(port)?;
            // skip our own ports
            if !name.starts_with(self.client_name.as_ref()) {
                self.map.insert(name.into(), port.clone());
            }
        }

        if let Some(cur) = &self.cur {
            if !self.map.contains_key(cur) {
                log::warn!("Port {cur} disappeared");
            }
        }

        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.link.close();

        if let Some(cur) = self.cur.take() {
            log::debug!("Disconnected from {cur}");
        }
    }
}

impl<D: Send + Clone + 'static> PortsIn<D> {
    pub fn try_new(client_name: Arc<str>, data: D) -> Result<Self, Error> {
        Ok(Self {
            map: BTreeMap::new(),
            cur: None,
            link: InputLink::try_new(&client_name, data)?,
            client_name,
        })
    }

    pub fn refresh(&mut self) -> Result<(), Error> {
        let client = midir::MidiInput::new(&format!("{} input scan", self.client_name))?;
        self.refresh_from(client)
    }

    pub fn connect<F>(&mut self, port_name: PortName, callback: F) -> Result<(), Error>
    where
        F: FnMut(u64, &[u8], &mut D) + Send + 'static,
    {
        let port = self.port(&port_name)?;
        self.cur = None;
        self.link
            .open(&port_name, &port, &self.client_name, callback)?;

        log::info!("Listening to {port_name}");
        self.cur = Some(port_name);

        Ok(())
    }
}

impl PortsOut {
    pub fn try_new(client_name: Arc<str>) -> Result<Self, Error> {
        Ok(Self {
            map: BTreeMap::new(),
            cur: None,
            link: OutputLink::try_new(&client_name)?,
            client_name,
        })
    }

    pub fn refresh(&mut self) -> Result<(), Error> {
        let client = midir::MidiOutput::new(&format!("{} output scan", self.client_name))?;
        self.refresh_from(client)
    }

    pub fn connect(&mut self, port_name: PortName) -> Result<(), Error> {
        let port = self.port(&port_name)?;
        self.cur = None;
        self.link.open(&port_name, &port, &self.client_name)?;

        log::info!("Sending to {port_name}");
        self.cur = Some(port_name);

        Ok(())
    }

    pub fn send(&mut self, msg: &Msg) -> Result<(), Error> {
        self.link.send(msg)
    }
}
