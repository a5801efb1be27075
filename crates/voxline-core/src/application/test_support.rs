//! In-memory [`PeerLink`] used by use-case tests.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::identity::{LinkId, PeerIdentity};

use super::ports::{LinkError, Outbound, PeerLink, SendStatus};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SendHook = Box<dyn Fn() + Send + Sync>;

pub struct RecordingLink {
    id: LinkId,
    open: AtomicBool,
    failing: AtomicBool,
    sent: Mutex<Vec<Outbound>>,
    on_send: Mutex<Option<SendHook>>,
}

impl fmt::Debug for RecordingLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingLink")
            .field("id", &self.id)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl RecordingLink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: LinkId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            open: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            on_send: Mutex::new(None),
        })
    }

    /// Run `hook` inside every `send`, before the message is recorded.
    pub fn on_send(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_send.lock().unwrap() = Some(Box::new(hook));
    }

    /// Open, but every send errors as if the transport had failed.
    pub fn failing() -> Arc<Self> {
        let link = Self::new();
        link.failing.store(true, Ordering::Relaxed);
        link
    }

    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap().clone()
    }

    pub fn audio(&self) -> Vec<Vec<u8>> {
        self.sent()
            .into_iter()
            .filter_map(|msg| match msg {
                Outbound::Audio(frame) => Some(frame.as_bytes().to_vec()),
                Outbound::Signal(_) => None,
            })
            .collect()
    }

    pub fn signals(&self) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter_map(|msg| match msg {
                Outbound::Signal(text) => Some(serde_json::from_str(&text).unwrap()),
                Outbound::Audio(_) => None,
            })
            .collect()
    }
}

impl PeerLink for RecordingLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    fn send(&self, msg: Outbound) -> Result<SendStatus, LinkError> {
        if !self.is_open() {
            return Err(LinkError::Closed);
        }
        if let Some(hook) = self.on_send.lock().unwrap().as_ref() {
            hook();
        }
        if self.failing.load(Ordering::Relaxed) {
            return Err(LinkError::QueueFull { capacity: 0 });
        }
        self.sent.lock().unwrap().push(msg);
        Ok(SendStatus::Queued)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
    }
}

pub fn id(name: &str) -> PeerIdentity {
    PeerIdentity::new(name).unwrap()
}
