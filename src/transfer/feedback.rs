use std::{fmt, time::Duration};

use super::{Machine, Step};
use crate::{
    bcr::{error_code, DeviceMsg, Encoded},
    midi::Msg,
    Error,
};

/// An error reported by the device for one source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BcrError {
    /// 1-based line in the source document.
    pub line_number: usize,
    pub error_code: u8,
    pub error_text: String,
    pub line_text: String,
}

impl fmt::Display for BcrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: {} ({}) in `{}`",
            self.line_number, self.error_text, self.error_code, self.line_text
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The device answered every message.
    Validated,
    /// The device stopped answering.
    TimedOut,
}

/// The errors reported by the device for one send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorBatch {
    pub errors: Vec<BcrError>,
    pub completion: Completion,
    /// Messages sent to the device.
    pub sent: usize,
    /// Messages the device replied to.
    pub answered: usize,
}

impl ErrorBatch {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// 0-based source line for the error at `row`.
    ///
    /// Returns `None` if `row` is out of range.
    pub fn row_to_line(&self, row: usize) -> Option<usize> {
        self.errors
            .get(row)
            .map(|error| error.line_number.saturating_sub(1))
    }
}

/// Sends encoded messages & collects the device replies.
///
/// At most `max_in_flight` messages wait for a reply at once.
pub struct ErrorCollector {
    encoded: Encoded,
    max_in_flight: usize,
    /// Next message to send.
    next: usize,
    answered: Vec<bool>,
    answered_count: usize,
    errors: Vec<BcrError>,
}

impl ErrorCollector {
    pub fn new(encoded: Encoded, max_in_flight: usize) -> Self {
        let len = encoded.len();
        Self {
            encoded,
            max_in_flight: max_in_flight.max(1),
            next: 0,
            answered: vec![false; len],
            answered_count: 0,
            errors: Vec::new(),
        }
    }

    pub fn sent(&self) -> usize {
        self.next
    }

    pub fn answered(&self) -> usize {
        self.answered_count
    }

    pub fn is_validated(&self) -> bool {
        self.answered_count == self.encoded.len()
    }

    /// Messages which can be sent without exceeding the in-flight limit.
    pub fn release(&mut self) -> Vec<Msg> {
        let in_flight = self.next - self.answered_count;
        let count = self
            .max_in_flight
            .saturating_sub(in_flight)
            .min(self.encoded.len() - self.next);

        let msgs = self.encoded.messages[self.next..self.next + count].to_vec();
        self.next += count;

        msgs
    }

    /// Handles a possible BCL reply.
    ///
    /// Returns `false` if `msg` is not a reply to a message in flight.
    pub fn handle_reply(&mut self, msg: &Msg) -> bool {
        let (index, code) = match DeviceMsg::classify(msg) {
            Some(DeviceMsg::BclReply { index, code, .. }) => (index, code),
            _ => return false,
        };

        let idx = index as usize;
        if idx >= self.next {
            log::debug!("Ignoring reply for unsent message {index}");
            return false;
        }
        if self.answered[idx] {
            log::debug!("Ignoring duplicate reply for message {index}");
            return false;
        }

        self.answered[idx] = true;
        self.answered_count += 1;

        if code != error_code::NO_ERROR {
            let error = BcrError {
                line_number: self.encoded.origin(index).unwrap_or(idx + 1),
                error_code: code,
                error_text: error_code::text(code).to_string(),
                line_text: self.encoded.text(index).unwrap_or_default().to_string(),
            };
            log::debug!("{error}");
            self.errors.push(error);
        }

        true
    }

    pub fn finish(&mut self, completion: Completion) -> ErrorBatch {
        ErrorBatch {
            errors: std::mem::take(&mut self.errors),
            completion,
            sent: self.next,
            answered: self.answered_count,
        }
    }
}

impl Machine for ErrorCollector {
    type Output = ErrorBatch;
    const NAME: &'static str = "send";

    fn start(&mut self) -> Step<ErrorBatch> {
        if self.encoded.is_empty() {
            return Step::Done(Ok(self.finish(Completion::Validated)));
        }

        Step::Progress(self.release())
    }

    fn on_msg(&mut self, msg: &Msg) -> Step<ErrorBatch> {
        if !self.handle_reply(msg) {
            return Step::Ignored;
        }

        if self.is_validated() {
            let batch = self.finish(Completion::Validated);
            log::info!(
                "Device validated {} messages: {} errors",
                batch.answered,
                batch.errors.len(),
            );
            return Step::Done(Ok(batch));
        }

        Step::Progress(self.release())
    }

    fn on_timeout(&mut self, after: Duration) -> Result<ErrorBatch, Error> {
        log::warn!(
            "No reply from device for {after:?}, {} of {} messages answered",
            self.answered_count,
            self.encoded.len(),
        );

        Ok(self.finish(Completion::TimedOut))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bcr::{self, encode_verbatim};

    fn reply(index: u16, code: u8) -> Msg {
        let [msb, lsb] = crate::midi::u14::to_msb_lsb(index).unwrap();
        bcr::new_msg(0, bcr::command::BCL_REPLY, &[msb, lsb, code])
    }

    #[test]
    fn paced_replies() {
        let encoded = encode_verbatim("$rev R1\nfoo bar\n$end", 0);
        let mut collector = ErrorCollector::new(encoded, 1);

        let Step::Progress(first) = collector.start() else {
            panic!("expected progress");
        };
        assert_eq!(first.len(), 1);
        assert_eq!(collector.sent(), 1);

        // nothing released until the reply
        assert!(collector.release().is_empty());

        let Step::Progress(second) = collector.on_msg(&reply(0, 0)) else {
            panic!("expected progress");
        };
        assert_eq!(second.len(), 1);

        // not for us
        assert!(matches!(collector.on_msg(&reply(2, 0)), Step::Ignored));
        assert!(matches!(collector.on_msg(&reply(0, 0)), Step::Ignored));

        collector.on_msg(&reply(1, 1));
        let Step::Done(Ok(batch)) = collector.on_msg(&reply(2, 0)) else {
            panic!("expected completion");
        };

        assert_eq!(batch.completion, Completion::Validated);
        assert_eq!(batch.sent, 3);
        assert_eq!(batch.answered, 3);
        assert_eq!(
            batch.errors,
            vec![BcrError {
                line_number: 2,
                error_code: 1,
                error_text: "unknown token".into(),
                line_text: "foo bar".into(),
            }]
        );
        assert_eq!(batch.row_to_line(0), Some(1));
        assert_eq!(batch.row_to_line(1), None);
    }

    #[test]
    fn wider_window() {
        let encoded = encode_verbatim("a\nb\nc\nd\ne", 0);
        let mut collector = ErrorCollector::new(encoded, 3);

        assert_eq!(collector.release().len(), 3);
        assert!(collector.handle_reply(&reply(1, 0)));
        assert_eq!(collector.release().len(), 1);
        assert!(collector.handle_reply(&reply(0, 0)));
        assert!(collector.handle_reply(&reply(2, 0)));
        // only one message left
        assert_eq!(collector.release().len(), 1);
        assert!(collector.release().is_empty());
    }

    #[test]
    fn timeout_delivers_partial_batch() {
        let encoded = encode_verbatim("foo\nbar", 0);
        let mut collector = ErrorCollector::new(encoded, 1);
        collector.start();
        collector.on_msg(&reply(0, 12));

        let batch = collector.on_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(batch.completion, Completion::TimedOut);
        assert_eq!(batch.sent, 2);
        assert_eq!(batch.answered, 1);
        assert_eq!(batch.errors[0].error_text, "invalid argument");
    }

    #[test]
    fn nothing_to_send() {
        let mut collector = ErrorCollector::new(Encoded::default(), 1);
        let Step::Done(Ok(batch)) = collector.start() else {
            panic!("expected completion");
        };
        assert!(batch.is_empty());
        assert_eq!(batch.completion, Completion::Validated);
    }

    #[test]
    fn reverse_index() {
        let batch = ErrorBatch {
            errors: vec![BcrError {
                line_number: 2,
                error_code: 7,
                error_text: "unknown parameter".into(),
                line_text: "foo bar".into(),
            }],
            completion: Completion::Validated,
            sent: 2,
            answered: 2,
        };

        assert_eq!(batch.row_to_line(0), Some(1));
        assert_eq!(batch.row_to_line(3), None);
    }
}
