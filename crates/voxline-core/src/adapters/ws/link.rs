//! WebSocket-backed [`PeerLink`]: a bounded outbound queue drained by the
//! connection's writer task.

use tokio_tungstenite::tungstenite::Message;

use crate::application::ports::{LinkError, Outbound, PeerLink, SendStatus};
use crate::application::queue::{OutboundQueue, OverflowPolicy};
use crate::domain::identity::{Channel, LinkId};

#[derive(Debug)]
pub struct WsLink {
    id: LinkId,
    queue: OutboundQueue<Outbound>,
}

impl WsLink {
    /// Audio links drop their oldest frame when full; signaling links refuse
    /// new messages instead.
    pub fn new(id: LinkId, channel: Channel, capacity: usize) -> Self {
        let policy = match channel {
            Channel::Audio => OverflowPolicy::DropOldest,
            Channel::Signal => OverflowPolicy::Reject,
        };
        Self {
            id,
            queue: OutboundQueue::new(capacity, policy),
        }
    }

    /// Next message for the socket; `None` once the link is closed.
    pub async fn next_message(&self) -> Option<Message> {
        self.queue.pop().await.map(into_message)
    }

    /// Resolves once the link has been closed, from either side.
    pub async fn closed(&self) {
        self.queue.closed().await;
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl PeerLink for WsLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn is_open(&self) -> bool {
        !self.queue.is_closed()
    }

    fn send(&self, msg: Outbound) -> Result<SendStatus, LinkError> {
        self.queue.push(msg)
    }

    fn close(&self) {
        self.queue.close();
    }
}

fn into_message(msg: Outbound) -> Message {
    match msg {
        Outbound::Audio(frame) => Message::Binary(frame.as_bytes().to_vec()),
        Outbound::Signal(text) => Message::Text(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame::AudioFrame;

    #[tokio::test]
    async fn audio_link_drops_oldest_frame() {
        let link = WsLink::new(LinkId(1), Channel::Audio, 2);
        for i in 0..3u8 {
            link.send(Outbound::Audio(AudioFrame::from(vec![i]))).unwrap();
        }
        assert_eq!(link.queued(), 2);
        assert_eq!(link.next_message().await, Some(Message::Binary(vec![1])));
        assert_eq!(link.next_message().await, Some(Message::Binary(vec![2])));
    }

    #[test]
    fn signal_link_refuses_when_full() {
        let link = WsLink::new(LinkId(2), Channel::Signal, 1);
        link.send(Outbound::Signal("{}".into())).unwrap();
        assert_eq!(
            link.send(Outbound::Signal("{}".into())),
            Err(LinkError::QueueFull { capacity: 1 })
        );
    }

    #[tokio::test]
    async fn closed_link_yields_nothing() {
        let link = WsLink::new(LinkId(3), Channel::Audio, 4);
        link.send(Outbound::Audio(AudioFrame::from(vec![1]))).unwrap();
        link.close();
        assert!(!link.is_open());
        assert_eq!(link.next_message().await, None);
        assert_eq!(
            link.send(Outbound::Audio(AudioFrame::from(vec![2]))),
            Err(LinkError::Closed)
        );
    }
}
