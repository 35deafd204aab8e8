//! In-memory transport for session tests.

use bytes::Bytes;
use roslink_protocol::{Channel, Parameter};
use roslink_transport::{ServiceCallRequest, TransportClient, TransportError, TransportEvent};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::event::BridgeEvent;
use crate::session::{Session, SessionConfig};

/// A command received by [`MockClient`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Advertise {
        channel_id: u32,
        topic: String,
        encoding: String,
        schema_name: String,
    },
    Unadvertise(u32),
    SendMessage { channel_id: u32, data: Bytes },
    Subscribe { subscription_id: u32, channel_id: u32 },
    Unsubscribe(u32),
    ServiceCall(ServiceCallRequest),
    GetParameters { names: Vec<String>, id: Option<String> },
    SetParameters { parameters: Vec<Parameter>, id: Option<String> },
    SubscribeConnectionGraph,
    UnsubscribeConnectionGraph,
    Close,
}

/// Records commands and hands out ids from one counter.
pub(crate) struct MockClient {
    commands: Mutex<Vec<Command>>,
    next_id: AtomicU32,
    open: AtomicBool,
}

impl MockClient {
    fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(100),
            open: AtomicBool::new(true),
        }
    }

    fn record(&self, command: Command) {
        self.commands.lock().unwrap().push(command);
    }

    pub(crate) fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn sent_messages(&self) -> Vec<(u32, Bytes)> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                Command::SendMessage { channel_id, data } => Some((channel_id, data)),
                _ => None,
            })
            .collect()
    }

    /// Latest client channel advertised for `topic`.
    pub(crate) fn advertised(&self, topic: &str) -> Option<u32> {
        self.commands().into_iter().rev().find_map(|c| match c {
            Command::Advertise {
                channel_id,
                topic: advertised,
                ..
            } if advertised == topic => Some(channel_id),
            _ => None,
        })
    }

    /// Latest subscription for a server channel.
    pub(crate) fn subscribed(&self, channel: u32) -> Option<u32> {
        self.commands().into_iter().rev().find_map(|c| match c {
            Command::Subscribe {
                subscription_id,
                channel_id,
            } if channel_id == channel => Some(subscription_id),
            _ => None,
        })
    }

    pub(crate) fn service_calls(&self) -> Vec<ServiceCallRequest> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                Command::ServiceCall(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Latest parameter request with its request id.
    pub(crate) fn parameter_request(&self) -> Option<(Vec<String>, String)> {
        self.commands().into_iter().rev().find_map(|c| match c {
            Command::GetParameters { names, id } => id.map(|id| (names, id)),
            _ => None,
        })
    }

    /// Latest parameter update with its request id.
    pub(crate) fn parameter_update(&self) -> Option<(Vec<Parameter>, String)> {
        self.commands().into_iter().rev().find_map(|c| match c {
            Command::SetParameters { parameters, id } => id.map(|id| (parameters, id)),
            _ => None,
        })
    }
}

impl TransportClient for MockClient {
    fn advertise(
        &self,
        topic: &str,
        encoding: &str,
        schema_name: &str,
    ) -> Result<u32, TransportError> {
        let channel_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.record(Command::Advertise {
            channel_id,
            topic: topic.to_string(),
            encoding: encoding.to_string(),
            schema_name: schema_name.to_string(),
        });
        Ok(channel_id)
    }

    fn unadvertise(&self, channel_id: u32) -> Result<(), TransportError> {
        self.record(Command::Unadvertise(channel_id));
        Ok(())
    }

    fn send_message(&self, channel_id: u32, data: Bytes) -> Result<(), TransportError> {
        self.record(Command::SendMessage { channel_id, data });
        Ok(())
    }

    fn subscribe(&self, channel_id: u32) -> Result<u32, TransportError> {
        let subscription_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.record(Command::Subscribe {
            subscription_id,
            channel_id,
        });
        Ok(subscription_id)
    }

    fn unsubscribe(&self, subscription_id: u32) -> Result<(), TransportError> {
        self.record(Command::Unsubscribe(subscription_id));
        Ok(())
    }

    fn send_service_call_request(&self, request: ServiceCallRequest) -> Result<(), TransportError> {
        self.record(Command::ServiceCall(request));
        Ok(())
    }

    fn get_parameters(&self, names: Vec<String>, id: Option<String>) -> Result<(), TransportError> {
        self.record(Command::GetParameters { names, id });
        Ok(())
    }

    fn set_parameters(
        &self,
        parameters: Vec<Parameter>,
        id: Option<String>,
    ) -> Result<(), TransportError> {
        self.record(Command::SetParameters { parameters, id });
        Ok(())
    }

    fn subscribe_connection_graph(&self) -> Result<(), TransportError> {
        self.record(Command::SubscribeConnectionGraph);
        Ok(())
    }

    fn unsubscribe_connection_graph(&self) -> Result<(), TransportError> {
        self.record(Command::UnsubscribeConnectionGraph);
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::SeqCst);
        self.record(Command::Close);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// A session wired to a [`MockClient`] and an event channel.
pub(crate) struct Harness {
    pub(crate) session: Session,
    pub(crate) client: Arc<MockClient>,
    pub(crate) output: mpsc::UnboundedReceiver<BridgeEvent>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Harness {
    pub(crate) fn new(config: SessionConfig) -> Self {
        let client = Arc::new(MockClient::new());
        let (events, stream) = mpsc::unbounded_channel();
        let (sink, output) = mpsc::unbounded_channel();
        let session = Session::new(client.clone(), stream, config, Arc::new(sink));
        Self {
            session,
            client,
            output,
            events,
        }
    }

    /// Deliver a transport event and let the session react.
    pub(crate) async fn push(&self, event: TransportEvent) {
        self.events.send(event).unwrap();
        settle().await;
    }

    pub(crate) async fn next_event(&mut self) -> BridgeEvent {
        tokio::time::timeout(Duration::from_secs(1), self.output.recv())
            .await
            .expect("timed out waiting for event")
            .expect("sink closed")
    }
}

/// Let spawned tasks run to their next suspension point.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub(crate) fn channel_with_schema(id: u32, topic: &str, schema_name: &str, schema: &str) -> Channel {
    Channel {
        id,
        topic: topic.to_string(),
        encoding: "cdr".to_string(),
        schema_name: schema_name.to_string(),
        schema: schema.to_string(),
        schema_encoding: Some("ros2msg".to_string()),
    }
}
