//! A session: one transport connection bound to one event sink.
//!
//! Verbs come in through [`Session::send`]; transport events are processed
//! in arrival order by a single dispatch task. Work that has to wait for the
//! server (a channel or service being advertised, a response arriving) runs
//! in tracked tasks that are aborted on unadvertise, unsubscribe and close.

use dashmap::DashMap;
use roslink_protocol::{Channel, StatusLevel};
use roslink_schema::SchemaError;
use roslink_transport::{
    Connector, EventStream, ServiceCallRequest, TransportClient, TransportError, TransportEvent,
    WebSocketConnector,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::codecs::{CodecCache, CodecError, Descriptor, Generation, Reader, Writer};
use crate::correlator::{CorrelationKey, Correlator, Response};
use crate::directory::{Directory, Lookup, Service};
use crate::event::{BridgeEvent, EventSink};
use crate::introspection::{self, Introspection};
use crate::verb::Verb;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A codec could not be compiled.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A value could not be encoded.
    #[error("Encoding failed: {0}")]
    Schema(#[from] SchemaError),

    /// The transport rejected a command.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A known verb with a malformed payload.
    #[error("Invalid verb: {0}")]
    InvalidVerb(#[from] serde_json::Error),

    /// The session is closed.
    #[error("Session closed")]
    Closed,
}

/// Session configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// ROS generation; inferred from the server's encodings when unset.
    pub generation: Option<Generation>,
    /// Fail calls and parameter requests that get no response in time.
    pub call_timeout: Option<Duration>,
}

enum PublisherState {
    /// Waiting for the channel and its writer; messages queue in order.
    Pending(VecDeque<Value>),
    Ready(Writer),
}

struct Publisher {
    channel_id: u32,
    state: PublisherState,
    resolver: Option<AbortHandle>,
}

enum SubscriptionState {
    Pending(Option<AbortHandle>),
    Active(u32),
}

struct SubscriptionEntry {
    registration: u64,
    state: SubscriptionState,
}

struct Route {
    topic: String,
    reader: Reader,
}

/// An in-flight service call.
struct PendingCall {
    key: CorrelationKey,
    rx: oneshot::Receiver<Response>,
    reader: Reader,
}

/// Why a correlated request produced no response.
pub(crate) enum Unanswered {
    TimedOut,
    Cancelled,
}

pub(crate) struct Inner {
    pub(crate) client: Arc<dyn TransportClient>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) directory: Directory,
    pub(crate) codecs: CodecCache,
    pub(crate) correlator: Correlator,
    config: SessionConfig,
    publishers: DashMap<String, Publisher>,
    subscriptions: DashMap<String, SubscriptionEntry>,
    routes: DashMap<u32, Route>,
    tasks: DashMap<u64, AbortHandle>,
    next_task: AtomicU64,
    next_registration: AtomicU64,
    next_call_id: AtomicU32,
    next_request: AtomicU64,
    closed: AtomicBool,
}

/// Removes a finished or aborted task from the session's task table.
struct TaskGuard {
    inner: Weak<Inner>,
    id: u64,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.tasks.remove(&self.id);
        }
    }
}

/// A bridge session with one server.
pub struct Session {
    inner: Arc<Inner>,
    dispatcher: JoinHandle<()>,
}

impl Session {
    /// Connect to a Foxglove WebSocket server.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(
        url: &str,
        config: SessionConfig,
        sink: impl EventSink,
    ) -> Result<Self, SessionError> {
        Self::connect_with(&WebSocketConnector::default(), url, config, Arc::new(sink)).await
    }

    /// Connect through a specific transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect_with(
        connector: &dyn Connector,
        url: &str,
        config: SessionConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, SessionError> {
        let (client, events) = connector.connect(url).await?;
        info!(transport = connector.name(), url = %url, "Session connected");
        Ok(Self::new(client, events, config, sink))
    }

    /// Bind an already connected transport. Must be called within a tokio
    /// runtime.
    #[must_use]
    pub fn new(
        client: Arc<dyn TransportClient>,
        events: EventStream,
        config: SessionConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let inner = Arc::new(Inner {
            client,
            sink,
            directory: Directory::new(),
            codecs: CodecCache::new(config.generation.unwrap_or(Generation::Ros2)),
            correlator: Correlator::new(),
            config,
            publishers: DashMap::new(),
            subscriptions: DashMap::new(),
            routes: DashMap::new(),
            tasks: DashMap::new(),
            next_task: AtomicU64::new(0),
            next_registration: AtomicU64::new(0),
            next_call_id: AtomicU32::new(1),
            next_request: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        });
        let dispatcher = tokio::spawn(dispatch(Arc::clone(&inner), events));

        Self { inner, dispatcher }
    }

    /// Execute a verb.
    ///
    /// # Errors
    ///
    /// Returns an error if a codec for an already advertised entity cannot
    /// be compiled, a value cannot be encoded, or the transport is gone.
    pub fn send(&self, verb: Verb) -> Result<(), SessionError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        trace!(op = verb.op(), "Verb");

        match verb {
            Verb::Advertise { topic, msg_type } => self.inner.advertise(topic, &msg_type),
            Verb::Unadvertise { topic } => self.inner.unadvertise(&topic),
            Verb::Publish { topic, msg } => self.inner.publish(&topic, msg),
            Verb::Subscribe { topic, .. } => self.inner.subscribe(topic),
            Verb::Unsubscribe { topic } => self.inner.unsubscribe(&topic),
            Verb::CallService {
                id,
                service,
                service_type,
                args,
            } => self.inner.call_service(id, service, &service_type, args),
        }
    }

    /// Execute a JSON verb. Unknown ops are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidVerb`] for a known op with a malformed
    /// payload, otherwise as [`Session::send`].
    pub fn send_json(&self, value: Value) -> Result<(), SessionError> {
        let op = value.get("op").and_then(Value::as_str).map(str::to_string);
        match Verb::from_json(value)? {
            Some(verb) => self.send(verb),
            None => {
                warn!(op = ?op, "Unrecognized verb dropped");
                Ok(())
            }
        }
    }

    /// Close the connection and tear down all local state.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to queue the close.
    pub fn close(&self) -> Result<(), SessionError> {
        self.inner.teardown();
        match self.inner.client.close() {
            Ok(()) | Err(TransportError::ConnectionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// The server's advertised channels and services.
    #[must_use]
    pub fn directory(&self) -> &Directory {
        &self.inner.directory
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Get session statistics.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let directory = self.inner.directory.stats();
        SessionStats {
            channel_count: directory.channel_count,
            service_count: directory.service_count,
            publisher_count: self.inner.publishers.len(),
            subscription_count: self.inner.subscriptions.len(),
            pending_requests: self.inner.correlator.len(),
            codec_count: self.inner.codecs.len(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispatcher.abort();
        self.inner.abort_tasks();
        let _ = self.inner.client.close();
    }
}

/// Session statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub channel_count: usize,
    pub service_count: usize,
    pub publisher_count: usize,
    pub subscription_count: usize,
    pub pending_requests: usize,
    pub codec_count: usize,
}

async fn dispatch(inner: Arc<Inner>, mut events: EventStream) {
    while let Some(event) = events.recv().await {
        let closing = matches!(event, TransportEvent::Close(_));
        inner.handle_event(event);
        if closing {
            break;
        }
    }
    debug!("Event dispatcher stopped");
}

impl Inner {
    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.sink.emit(BridgeEvent::Connection),
            TransportEvent::ServerInfo {
                name,
                supported_encodings,
                ..
            } => {
                info!(server = %name, encodings = ?supported_encodings, "Server info");
                if self.config.generation.is_none() {
                    if let Some(generation) = Generation::from_encodings(&supported_encodings) {
                        self.codecs.set_generation(generation);
                    }
                }
            }
            TransportEvent::Status { level, message } => match level {
                StatusLevel::Info => info!(status = %message, "Server status"),
                StatusLevel::Warning => warn!(status = %message, "Server status"),
                StatusLevel::Error => error!(status = %message, "Server status"),
            },
            TransportEvent::Advertise(channels) => {
                for channel in channels {
                    self.directory.record_channel(channel);
                }
            }
            TransportEvent::Unadvertise(ids) => {
                for id in ids {
                    self.directory.remove_channel(id);
                }
            }
            TransportEvent::AdvertiseServices(services) => {
                for service in services {
                    self.directory.record_service(Service::from(service));
                }
            }
            TransportEvent::UnadvertiseServices(ids) => {
                for id in ids {
                    self.directory.remove_service(id);
                }
            }
            TransportEvent::Message {
                subscription_id,
                data,
                ..
            } => self.route_message(subscription_id, &data),
            TransportEvent::ServiceCallResponse {
                service_id,
                call_id,
                encoding,
                data,
            } => {
                self.correlator.resolve(
                    &CorrelationKey::ServiceCall {
                        service_id,
                        call_id,
                    },
                    Response::ServiceCall { encoding, data },
                );
            }
            TransportEvent::ServiceCallFailure {
                service_id,
                call_id,
                message,
            } => {
                self.correlator.resolve(
                    &CorrelationKey::ServiceCall {
                        service_id,
                        call_id,
                    },
                    Response::ServiceCallFailure(message),
                );
            }
            TransportEvent::ParameterValues {
                id: Some(id),
                parameters,
            } => {
                self.correlator.resolve(
                    &CorrelationKey::Parameters(id),
                    Response::Parameters(parameters),
                );
            }
            TransportEvent::ParameterValues { id: None, .. } => {
                trace!("Parameter values without request id");
            }
            TransportEvent::ConnectionGraphUpdate(update) => {
                let matched = self.correlator.resolve(
                    &CorrelationKey::ConnectionGraph,
                    Response::ConnectionGraph(update),
                );
                if matched {
                    if let Err(e) = self.client.unsubscribe_connection_graph() {
                        warn!(error = %e, "Failed to unsubscribe from connection graph");
                    }
                }
            }
            TransportEvent::Close(info) => {
                info!(close = %info, "Transport closed");
                self.teardown();
                self.sink.emit(BridgeEvent::Close(info));
            }
            TransportEvent::Error(message) => {
                warn!(error = %message, "Transport error");
                self.sink.emit(BridgeEvent::Error(message));
            }
        }
    }

    fn route_message(&self, subscription_id: u32, data: &[u8]) {
        let Some(route) = self.routes.get(&subscription_id) else {
            trace!(subscription_id, "Message for unknown subscription");
            return;
        };
        match route.reader.read(data) {
            Ok(msg) => self.sink.emit(BridgeEvent::Message {
                topic: route.topic.clone(),
                msg,
            }),
            Err(e) => warn!(topic = %route.topic, error = %e, "Failed to decode message"),
        }
    }

    fn advertise(self: &Arc<Self>, topic: String, msg_type: &str) -> Result<(), SessionError> {
        if self.publishers.contains_key(&topic) {
            debug!(topic = %topic, "Replacing existing publisher");
            self.unadvertise(&topic)?;
        }

        let lookup = self.directory.lookup_channel(&topic);
        let writer = match lookup.ready() {
            Some(channel) => Some(self.codecs.writer(Descriptor::Channel(channel))?),
            None => None,
        };

        let encoding = self.codecs.generation().message_encoding();
        let channel_id = self.client.advertise(&topic, encoding, msg_type)?;
        debug!(topic = %topic, channel_id, ready = writer.is_some(), "Advertised publisher");

        let Some(writer) = writer else {
            self.publishers.insert(
                topic.clone(),
                Publisher {
                    channel_id,
                    state: PublisherState::Pending(VecDeque::new()),
                    resolver: None,
                },
            );
            let resolver =
                self.spawn_tracked(resolve_publisher(Arc::clone(self), topic.clone(), channel_id, lookup));
            if let Some(mut publisher) = self.publishers.get_mut(&topic) {
                if publisher.channel_id == channel_id {
                    publisher.resolver = Some(resolver);
                }
            }
            return Ok(());
        };

        self.publishers.insert(
            topic,
            Publisher {
                channel_id,
                state: PublisherState::Ready(writer),
                resolver: None,
            },
        );
        Ok(())
    }

    fn unadvertise(&self, topic: &str) -> Result<(), SessionError> {
        let Some((_, publisher)) = self.publishers.remove(topic) else {
            return Ok(());
        };
        if let Some(resolver) = publisher.resolver {
            resolver.abort();
        }
        if let PublisherState::Pending(queue) = &publisher.state {
            if !queue.is_empty() {
                debug!(topic = %topic, dropped = queue.len(), "Dropping queued messages");
            }
        }
        self.client.unadvertise(publisher.channel_id)?;
        debug!(topic = %topic, channel_id = publisher.channel_id, "Unadvertised publisher");
        Ok(())
    }

    fn publish(&self, topic: &str, msg: Value) -> Result<(), SessionError> {
        let Some(mut publisher) = self.publishers.get_mut(topic) else {
            trace!(topic = %topic, "No publisher, message dropped");
            return Ok(());
        };
        let channel_id = publisher.channel_id;
        match &mut publisher.state {
            PublisherState::Pending(queue) => {
                queue.push_back(msg);
                trace!(topic = %topic, queued = queue.len(), "Publisher pending, message queued");
            }
            PublisherState::Ready(writer) => {
                let data = writer.write(&msg)?;
                self.client.send_message(channel_id, data)?;
            }
        }
        Ok(())
    }

    fn subscribe(self: &Arc<Self>, topic: String) -> Result<(), SessionError> {
        if self.subscriptions.contains_key(&topic) {
            debug!(topic = %topic, "Replacing existing subscription");
            self.unsubscribe(&topic)?;
        }

        let registration = self.next_registration.fetch_add(1, Ordering::Relaxed);
        let lookup = self.directory.lookup_channel(&topic);
        if let Some(channel) = lookup.ready() {
            let reader = self.codecs.reader(Descriptor::Channel(channel))?;
            let subscription_id = self.client.subscribe(channel.id)?;
            self.activate(&topic, channel, subscription_id, reader);
            self.subscriptions.insert(
                topic,
                SubscriptionEntry {
                    registration,
                    state: SubscriptionState::Active(subscription_id),
                },
            );
            return Ok(());
        }

        self.subscriptions.insert(
            topic.clone(),
            SubscriptionEntry {
                registration,
                state: SubscriptionState::Pending(None),
            },
        );
        let task = self.spawn_tracked(resolve_subscription(
            Arc::clone(self),
            topic.clone(),
            registration,
            lookup,
        ));
        if let Some(mut entry) = self.subscriptions.get_mut(&topic) {
            if entry.registration == registration {
                if let SubscriptionState::Pending(slot) = &mut entry.state {
                    *slot = Some(task);
                }
            }
        }
        Ok(())
    }

    fn activate(&self, topic: &str, channel: &Channel, subscription_id: u32, reader: Reader) {
        debug!(topic = %topic, channel_id = channel.id, subscription_id, "Subscribed");
        self.routes.insert(
            subscription_id,
            Route {
                topic: topic.to_string(),
                reader,
            },
        );
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), SessionError> {
        let Some((_, entry)) = self.subscriptions.remove(topic) else {
            return Ok(());
        };
        match entry.state {
            SubscriptionState::Pending(task) => {
                if let Some(task) = task {
                    task.abort();
                }
                debug!(topic = %topic, "Cancelled pending subscription");
            }
            SubscriptionState::Active(subscription_id) => {
                self.routes.remove(&subscription_id);
                self.client.unsubscribe(subscription_id)?;
                debug!(topic = %topic, subscription_id, "Unsubscribed");
            }
        }
        Ok(())
    }

    fn call_service(
        self: &Arc<Self>,
        id: Option<String>,
        service: String,
        service_type: &str,
        args: Value,
    ) -> Result<(), SessionError> {
        match introspection::classify(service_type) {
            Some(Introspection::Builtin(builtin)) => {
                self.handle_builtin(builtin, id.clone(), &service, &args)?;
                if self.directory.service_by_name(&service).is_none() {
                    trace!(service = %service, "Builtin answered locally");
                    return Ok(());
                }
            }
            Some(Introspection::Unimplemented) => {
                warn!(service_type = %service_type, "Unimplemented introspection service");
            }
            None => {}
        }

        let lookup = self.directory.lookup_service(&service);
        if let Some(remote) = lookup.ready() {
            let call = self.start_call(remote, &args)?;
            self.spawn_tracked(finish_call(Arc::clone(self), call, id, service));
            return Ok(());
        }

        trace!(service = %service, "Waiting for service");
        let inner = Arc::clone(self);
        self.spawn_tracked(async move {
            let Some(remote) = lookup.wait().await else {
                return;
            };
            match inner.start_call(&remote, &args) {
                Ok(call) => finish_call(inner, call, id, service).await,
                Err(e) => error!(service = %service, error = %e, "Service call failed"),
            }
        });
        Ok(())
    }

    fn start_call(&self, service: &Service, args: &Value) -> Result<PendingCall, SessionError> {
        let writer = self.codecs.writer(Descriptor::Service(service))?;
        let reader = self.codecs.reader(Descriptor::Service(service))?;
        let data = writer.write(&introspection::call_args(writer.definition(), args))?;

        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let key = CorrelationKey::ServiceCall {
            service_id: service.id,
            call_id,
        };
        let (rx, _) = self.correlator.register(key.clone());

        let encoding = service
            .encoding
            .clone()
            .unwrap_or_else(|| self.codecs.generation().message_encoding().to_string());
        let request = ServiceCallRequest {
            service_id: service.id,
            call_id,
            encoding,
            data,
        };
        if let Err(e) = self.client.send_service_call_request(request) {
            drop(rx);
            self.correlator.prune(&key);
            return Err(e.into());
        }
        debug!(service = %service.name, service_id = service.id, call_id, "Service call sent");

        Ok(PendingCall { key, rx, reader })
    }

    /// Wait for a correlated response, honoring the call timeout.
    pub(crate) async fn await_response(
        &self,
        key: &CorrelationKey,
        rx: oneshot::Receiver<Response>,
    ) -> Result<Response, Unanswered> {
        let mut rx = rx;
        let received = match self.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                Ok(received) => received,
                Err(_) => {
                    drop(rx);
                    self.correlator.prune(key);
                    debug!(?key, "Request timed out");
                    return Err(Unanswered::TimedOut);
                }
            },
            None => rx.await,
        };
        received.map_err(|_| Unanswered::Cancelled)
    }

    /// Spawn a task that is aborted when the session is torn down.
    pub(crate) fn spawn_tracked<F>(self: &Arc<Self>, task: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_task.fetch_add(1, Ordering::Relaxed);
        let guard = TaskGuard {
            inner: Arc::downgrade(self),
            id,
        };
        let handle = tokio::spawn(async move {
            let _guard = guard;
            task.await;
        });
        let abort = handle.abort_handle();
        self.tasks.insert(id, abort.clone());
        if handle.is_finished() {
            self.tasks.remove(&id);
        }
        abort
    }

    /// Request id for parameter requests.
    pub(crate) fn request_id(&self, prefix: &str) -> String {
        let n = self.next_request.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}:{n}")
    }

    fn abort_tasks(&self) {
        let handles: Vec<AbortHandle> = self.tasks.iter().map(|t| t.value().clone()).collect();
        self.tasks.clear();
        for handle in handles {
            handle.abort();
        }
    }

    fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let cancelled = self.correlator.cancel_all();
        self.abort_tasks();
        self.publishers.clear();
        self.subscriptions.clear();
        self.routes.clear();
        debug!(cancelled, "Session torn down");
    }

    fn write_queued(&self, topic: &str, channel_id: u32, writer: &Writer, msg: &Value) {
        let sent = writer
            .write(msg)
            .map_err(SessionError::from)
            .and_then(|data| Ok(self.client.send_message(channel_id, data)?));
        if let Err(e) = sent {
            warn!(topic = %topic, error = %e, "Dropping queued message");
        }
    }
}

/// Resolve a publisher's writer, then flush its queue in order.
async fn resolve_publisher(inner: Arc<Inner>, topic: String, channel_id: u32, lookup: Lookup<Channel>) {
    let Some(channel) = lookup.wait().await else {
        return;
    };
    let writer = match inner.codecs.writer(Descriptor::Channel(&channel)) {
        Ok(writer) => writer,
        Err(e) => {
            error!(topic = %topic, error = %e, "Cannot resolve publisher");
            // Tear the publisher down so later publishes are dropped, not queued.
            let Some((_, publisher)) = inner
                .publishers
                .remove_if(&topic, |_, p| p.channel_id == channel_id)
            else {
                return;
            };
            if let PublisherState::Pending(queue) = &publisher.state {
                debug!(topic = %topic, dropped = queue.len(), "Dropping queued messages");
            }
            if let Err(e) = inner.client.unadvertise(channel_id) {
                warn!(topic = %topic, error = %e, "Unadvertise failed");
            }
            return;
        }
    };

    // Publishes block on the entry while the queue drains.
    let Some(mut publisher) = inner.publishers.get_mut(&topic) else {
        return;
    };
    if publisher.channel_id != channel_id {
        return;
    }
    let state = std::mem::replace(&mut publisher.state, PublisherState::Ready(writer.clone()));
    if let PublisherState::Pending(queue) = state {
        debug!(topic = %topic, queued = queue.len(), "Publisher ready");
        for msg in &queue {
            inner.write_queued(&topic, channel_id, &writer, msg);
        }
    }
    publisher.resolver = None;
}

/// Wait for a subscribed channel, then subscribe.
async fn resolve_subscription(
    inner: Arc<Inner>,
    topic: String,
    registration: u64,
    lookup: Lookup<Channel>,
) {
    let Some(channel) = lookup.wait().await else {
        return;
    };
    let reader = match inner.codecs.reader(Descriptor::Channel(&channel)) {
        Ok(reader) => reader,
        Err(e) => {
            error!(topic = %topic, error = %e, "Cannot resolve subscription");
            return;
        }
    };

    let Some(mut entry) = inner.subscriptions.get_mut(&topic) else {
        return;
    };
    if entry.registration != registration {
        return;
    }
    match inner.client.subscribe(channel.id) {
        Ok(subscription_id) => {
            inner.activate(&topic, &channel, subscription_id, reader);
            entry.state = SubscriptionState::Active(subscription_id);
        }
        Err(e) => warn!(topic = %topic, error = %e, "Subscribe failed"),
    }
}

/// Wait for a service call's response and emit the result.
async fn finish_call(inner: Arc<Inner>, call: PendingCall, id: Option<String>, service: String) {
    let event = match inner.await_response(&call.key, call.rx).await {
        Ok(Response::ServiceCall { data, .. }) => match call.reader.read(&data) {
            Ok(values) => BridgeEvent::success(id, &service, Some(values)),
            Err(e) => BridgeEvent::failure(id, &service, e.to_string()),
        },
        Ok(Response::ServiceCallFailure(message)) => BridgeEvent::failure(id, &service, message),
        Ok(other) => {
            warn!(service = %service, response = ?other, "Unexpected response to service call");
            return;
        }
        Err(Unanswered::TimedOut) => BridgeEvent::failure(id, &service, "timed out"),
        Err(Unanswered::Cancelled) => return,
    };
    inner.sink.emit(event);
}
