use std::collections::VecDeque;

use thiserror::Error;

use crate::protocol::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The line was not accepted; offer it again once capacity returns.
    #[error("transport is applying backpressure")]
    Backpressure,
    #[error("transport is closed")]
    Closed,
}

/// Transport side of the command queue.
pub trait LineSink {
    fn offer(&mut self, line: &str) -> Result<(), SinkError>;
}

/// FIFO of outbound protocol lines gated by a single flow-control credit.
///
/// A line leaves the queue only once the sink has accepted it, so a refused
/// handoff keeps its place at the head and nothing is lost or reordered.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<String>,
    writable: bool,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command. It is handed over by the next [`flush`](Self::flush)
    /// or [`drain`](Self::drain).
    pub fn enqueue(&mut self, command: &Command) {
        self.pending.push_back(format!("{command}\n"));
    }

    /// Hands queued lines to `sink` while credit is held.
    pub fn flush(&mut self, sink: &mut impl LineSink) -> Result<(), SinkError> {
        while self.writable {
            let Some(line) = self.pending.front() else {
                break;
            };

            match sink.offer(line) {
                Ok(()) => {
                    self.pending.pop_front();
                }
                Err(err) => {
                    self.writable = false;
                    return match err {
                        SinkError::Backpressure => Ok(()),
                        SinkError::Closed => Err(err),
                    };
                }
            }
        }
        Ok(())
    }

    /// The transport can take more data: restore credit and flush.
    pub fn drain(&mut self, sink: &mut impl LineSink) -> Result<(), SinkError> {
        self.writable = true;
        self.flush(sink)
    }

    pub fn revoke(&mut self) {
        self.writable = false;
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Commands are waiting for credit to return.
    pub fn is_stalled(&self) -> bool {
        !self.writable && !self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct FakeSink {
        written: Vec<String>,
        capacity: usize,
        closed: bool,
    }

    impl LineSink for FakeSink {
        fn offer(&mut self, line: &str) -> Result<(), SinkError> {
            if self.closed {
                return Err(SinkError::Closed);
            }
            if self.capacity == 0 {
                return Err(SinkError::Backpressure);
            }
            self.capacity -= 1;
            self.written.push(line.to_string());
            Ok(())
        }
    }

    fn switch(address: &str) -> Command {
        Command::switch(address, true)
    }

    fn line(address: &str) -> String {
        format!("{}\n", switch(address))
    }

    #[test]
    fn holds_commands_until_credit_arrives() {
        let mut queue = CommandQueue::new();
        let mut sink = FakeSink {
            capacity: 10,
            ..FakeSink::default()
        };

        queue.enqueue(&Command::Ping);
        queue.flush(&mut sink).unwrap();
        assert!(sink.written.is_empty());
        assert!(queue.is_stalled());

        queue.drain(&mut sink).unwrap();
        assert_eq!(sink.written, vec!["Lighting_controller::Ping()\n".to_string()]);
        assert!(queue.is_writable());
        assert!(queue.is_empty());
    }

    #[test]
    fn withheld_credit_preserves_order_without_loss_or_duplication() {
        let mut queue = CommandQueue::new();
        let mut sink = FakeSink {
            capacity: 2,
            ..FakeSink::default()
        };
        queue.drain(&mut sink).unwrap();

        for address in ["1", "2", "3", "4", "5", "6"] {
            queue.enqueue(&switch(address));
            queue.flush(&mut sink).unwrap();
        }
        assert_eq!(sink.written, vec![line("1"), line("2")]);
        assert!(queue.is_stalled());
        assert_eq!(queue.len(), 4);

        sink.capacity = 3;
        queue.drain(&mut sink).unwrap();
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_writable());

        sink.capacity = 5;
        queue.drain(&mut sink).unwrap();
        assert_eq!(
            sink.written,
            ["1", "2", "3", "4", "5", "6"].map(line).to_vec()
        );
        assert!(queue.is_writable());
    }

    #[test]
    fn closed_sink_keeps_head_for_the_next_connection() {
        let mut queue = CommandQueue::new();
        let mut dead = FakeSink {
            capacity: 10,
            closed: true,
            ..FakeSink::default()
        };
        queue.drain(&mut dead).unwrap();

        queue.enqueue(&switch("1"));
        assert_eq!(queue.flush(&mut dead), Err(SinkError::Closed));
        assert!(!queue.is_writable());

        queue.enqueue(&switch("2"));
        let mut fresh = FakeSink {
            capacity: 10,
            ..FakeSink::default()
        };
        queue.drain(&mut fresh).unwrap();
        assert_eq!(fresh.written, vec![line("1"), line("2")]);
    }

    #[test]
    fn revoke_stops_handoff() {
        let mut queue = CommandQueue::new();
        let mut sink = FakeSink {
            capacity: 10,
            ..FakeSink::default()
        };
        queue.drain(&mut sink).unwrap();
        queue.revoke();

        queue.enqueue(&Command::Pong);
        queue.flush(&mut sink).unwrap();

        assert!(sink.written.is_empty());
        assert_eq!(queue.len(), 1);
    }
}
