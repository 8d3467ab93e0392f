use std::mem;

use super::{Error, PortName};

/// A midir connection which gives its client back when closed.
pub trait Close {
    type Io: midir::MidiIO;
    type Data;

    fn close(self) -> (Self::Io, Self::Data);
}

impl<D: 'static> Close for midir::MidiInputConnection<D> {
    type Io = midir::MidiInput;
    type Data = D;

    fn close(self) -> (midir::MidiInput, D) {
        midir::MidiInputConnection::close(self)
    }
}

impl Close for midir::MidiOutputConnection {
    type Io = midir::MidiOutput;
    type Data = ();

    fn close(self) -> (midir::MidiOutput, ()) {
        (midir::MidiOutputConnection::close(self), ())
    }
}

enum State<C: Close> {
    Idle(C::Io, C::Data),
    Open(C),
    /// Only seen while switching states, or if midir lost the client.
    Lost,
}

/// One direction of a midir client, either idle or connected to a port.
pub struct Link<C: Close> {
    state: State<C>,
}

impl<C: Close> Link<C> {
    fn idle(io: C::Io, data: C::Data) -> Self {
        Self {
            state: State::Idle(io, data),
        }
    }

    pub fn close(&mut self) {
        self.state = match mem::replace(&mut self.state, State::Lost) {
            State::Open(conn) => {
                let (io, data) = conn.close();
                State::Idle(io, data)
            }
            other => other,
        };
    }

    /// Closes the link if needed & hands over the idle client.
    fn take_idle(&mut self) -> Result<(C::Io, C::Data), Error> {
        self.close();
        match mem::replace(&mut self.state, State::Lost) {
            State::Idle(io, data) => Ok((io, data)),
            _ => Err(Error::PortConnection),
        }
    }
}

pub type InputLink<D> = Link<midir::MidiInputConnection<D>>;

impl<D: Send + Clone + 'static> InputLink<D> {
    pub fn try_new(client_name: &str, data: D) -> Result<Self, Error> {
        let mut input = midir::MidiInput::new(client_name)?;
        // Dumps & device replies are SysEx.
        input.ignore(midir::Ignore::TimeAndActiveSense);

        Ok(Self::idle(input, data))
    }

    pub fn open<F>(
        &mut self,
        port_name: &PortName,
        port: &midir::MidiInputPort,
        client_port_name: &str,
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnMut(u64, &[u8], &mut D) + Send + 'static,
    {
        let (input, data) = self.take_idle()?;

        // midir doesn't give `data` back on failure.
        match input.connect(port, client_port_name, callback, data.clone()) {
            Ok(conn) => {
                self.state = State::Open(conn);
                Ok(())
            }
            Err(err) => {
                self.state = State::Idle(err.into_inner(), data);
                log::error!("Couldn't open input {port_name}");
                Err(Error::Connection(port_name.clone()))
            }
        }
    }
}

pub type OutputLink = Link<midir::MidiOutputConnection>;

impl OutputLink {
    pub fn try_new(client_name: &str) -> Result<Self, Error> {
        Ok(Self::idle(midir::MidiOutput::new(client_name)?, ()))
    }

    pub fn open(
        &mut self,
        port_name: &PortName,
        port: &midir::MidiOutputPort,
        client_port_name: &str,
    ) -> Result<(), Error> {
        let (output, ()) = self.take_idle()?;

        match output.connect(port, client_port_name) {
            Ok(conn) => {
                self.state = State::Open(conn);
                Ok(())
            }
            Err(err) => {
                self.state = State::Idle(err.into_inner(), ());
                log::error!("Couldn't open output {port_name}");
                Err(Error::Connection(port_name.clone()))
            }
        }
    }

    pub fn send(&mut self, msg: &[u8]) -> Result<(), Error> {
        let State::Open(conn) = &mut self.state else {
            log::warn!("Output closed, can't send {}", crate::bytes::Displayable::from(msg));
            return Err(Error::NotConnected);
        };

        conn.send(msg).map_err(|err| {
            log::error!("Failed to send {}: {err}", crate::bytes::Displayable::from(msg));
            Error::from(err)
        })
    }
}
