// ABOUTME: Scripted in-memory transport shared by the integration tests
// ABOUTME: Records every open, send and close, and lets tests fire transport events by hand

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use vigil::error::Error;
use vigil::{Channel, CloseInfo, Connection, EventSink, ReconnectConfig, Transport};

pub const ENDPOINT: &str = "ws://camera-backend.test:5000/ws";

/// One call to `Transport::open` that produced a handle
pub struct Attempt {
    pub sink: EventSink,
    pub sent: Vec<String>,
    pub closes: Vec<(u16, String)>,
}

#[derive(Default)]
struct Shared {
    attempts: Vec<Attempt>,
    open_calls: usize,
    fail_opens: usize,
    reject_sends: bool,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    shared: Arc<Mutex<Shared>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` opens fail synchronously
    pub fn fail_next_opens(&self, n: usize) {
        self.shared.lock().fail_opens = n;
    }

    /// Make every connection reject sends
    pub fn reject_sends(&self, reject: bool) {
        self.shared.lock().reject_sends = reject;
    }

    /// Calls to `open`, including failed ones
    pub fn open_calls(&self) -> usize {
        self.shared.lock().open_calls
    }

    /// Handles handed out
    pub fn attempts(&self) -> usize {
        self.shared.lock().attempts.len()
    }

    pub fn sink(&self, index: usize) -> EventSink {
        self.shared.lock().attempts[index].sink.clone()
    }

    pub fn last_sink(&self) -> EventSink {
        self.shared
            .lock()
            .attempts
            .last()
            .expect("no connection attempt recorded")
            .sink
            .clone()
    }

    pub fn sent(&self, index: usize) -> Vec<String> {
        self.shared.lock().attempts[index].sent.clone()
    }

    /// Every frame transmitted on any handle, in order
    pub fn all_sent(&self) -> Vec<String> {
        self.shared
            .lock()
            .attempts
            .iter()
            .flat_map(|a| a.sent.iter().cloned())
            .collect()
    }

    pub fn closes(&self, index: usize) -> Vec<(u16, String)> {
        self.shared.lock().attempts[index].closes.clone()
    }

    pub fn total_closes(&self) -> usize {
        self.shared
            .lock()
            .attempts
            .iter()
            .map(|a| a.closes.len())
            .sum()
    }

    /// Fire `opened` on the newest handle
    pub fn open_last(&self) {
        self.last_sink().opened();
    }

    /// Fire an abnormal `closed` on the newest handle
    pub fn drop_last(&self) {
        self.last_sink().closed(CloseInfo::abnormal("connection reset"));
    }

    /// Deliver a raw frame on the newest handle
    pub fn deliver(&self, raw: &str) {
        self.last_sink().message(raw);
    }
}

impl Transport for MockTransport {
    fn open(&self, _endpoint: &str, events: EventSink) -> Result<Box<dyn Connection>, Error> {
        let mut shared = self.shared.lock();
        shared.open_calls += 1;

        if shared.fail_opens > 0 {
            shared.fail_opens -= 1;
            return Err(Error::Connection("connection refused".to_string()));
        }

        let index = shared.attempts.len();
        shared.attempts.push(Attempt {
            sink: events,
            sent: Vec::new(),
            closes: Vec::new(),
        });

        Ok(Box::new(MockConnection {
            shared: Arc::clone(&self.shared),
            index,
        }))
    }
}

struct MockConnection {
    shared: Arc<Mutex<Shared>>,
    index: usize,
}

impl Connection for MockConnection {
    fn send(&mut self, frame: String) -> Result<(), Error> {
        let mut shared = self.shared.lock();
        if shared.reject_sends {
            return Err(Error::WebSocket("socket buffer full".to_string()));
        }
        shared.attempts[self.index].sent.push(frame);
        Ok(())
    }

    fn close(&mut self, code: u16, reason: &str) {
        self.shared.lock().attempts[self.index]
            .closes
            .push((code, reason.to_string()));
    }
}

/// Channel with the default policy (5 attempts, 3000ms)
pub fn channel(mock: &MockTransport) -> Channel {
    Channel::new(ENDPOINT, mock.clone()).unwrap()
}

pub fn channel_with(mock: &MockTransport, max_attempts: u32, delay_ms: u64) -> Channel {
    Channel::builder(ENDPOINT, mock.clone())
        .reconnect(ReconnectConfig {
            max_attempts,
            delay_ms,
        })
        .build()
        .unwrap()
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
