use std::time::Duration;

use super::{Machine, Step};
use crate::{bcr::Identity, midi::Msg, Error};

/// Challenges a port pair with an identity request.
#[derive(Debug, Default)]
pub struct IdentityProbe;

impl Machine for IdentityProbe {
    type Output = Identity;
    const NAME: &'static str = "identity probe";

    fn start(&mut self) -> Step<Identity> {
        Step::Progress(vec![Identity::request_msg()])
    }

    fn on_msg(&mut self, msg: &Msg) -> Step<Identity> {
        match Identity::from_msg(msg) {
            Some(identity) => {
                log::debug!("Identity reply: {identity}");
                Step::Done(Ok(identity))
            }
            None => Step::Ignored,
        }
    }

    fn on_timeout(&mut self, after: Duration) -> Result<Identity, Error> {
        Err(Error::Timeout(after))
    }
}
