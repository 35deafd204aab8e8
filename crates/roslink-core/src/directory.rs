//! Live index of the channels and services advertised by the server.
//!
//! Both kinds are indexed by id and by name. Looking up a name that is not
//! advertised yet hands out a receiver that resolves the first time the name
//! appears; every waiter on that name is resolved by the same advertisement.

use dashmap::DashMap;
use roslink_protocol::{Channel, Service as ServiceAdvertisement};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Schema text and its encoding (`ros1msg`, `ros2msg`, `ros2idl`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaText {
    pub text: String,
    pub encoding: Option<String>,
}

/// A service advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: u32,
    pub name: String,
    pub service_type: String,
    pub request: Option<SchemaText>,
    pub response: Option<SchemaText>,
    /// Message encoding for call payloads, when the server declares one.
    pub encoding: Option<String>,
}

impl From<ServiceAdvertisement> for Service {
    fn from(service: ServiceAdvertisement) -> Self {
        // Newer servers describe each direction separately; older ones send
        // bare schema strings in the session's dialect.
        let encoding = service
            .request
            .as_ref()
            .map(|r| r.encoding.clone())
            .filter(|e| !e.is_empty());
        let request = match service.request {
            Some(schema) => Some(SchemaText {
                text: schema.schema,
                encoding: Some(schema.schema_encoding),
            }),
            None => service.request_schema.map(|text| SchemaText {
                text,
                encoding: None,
            }),
        };
        let response = match service.response {
            Some(schema) => Some(SchemaText {
                text: schema.schema,
                encoding: Some(schema.schema_encoding),
            }),
            None => service.response_schema.map(|text| SchemaText {
                text,
                encoding: None,
            }),
        };

        Self {
            id: service.id,
            name: service.name,
            service_type: service.service_type,
            request,
            response,
            encoding,
        }
    }
}

/// Something the directory can index.
pub trait Entry: Send + Sync + 'static {
    fn id(&self) -> u32;
    fn name(&self) -> &str;
}

impl Entry for Channel {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.topic
    }
}

impl Entry for Service {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Result of a name lookup.
#[derive(Debug)]
pub enum Lookup<T> {
    /// The name is advertised.
    Ready(Arc<T>),
    /// Resolves when the name is advertised.
    Pending(oneshot::Receiver<Arc<T>>),
}

impl<T> Lookup<T> {
    /// Wait for the entry.
    ///
    /// Returns `None` only if the directory was dropped first.
    pub async fn wait(self) -> Option<Arc<T>> {
        match self {
            Lookup::Ready(entry) => Some(entry),
            Lookup::Pending(rx) => rx.await.ok(),
        }
    }

    /// Get the entry if it was already advertised.
    #[must_use]
    pub fn ready(&self) -> Option<&Arc<T>> {
        match self {
            Lookup::Ready(entry) => Some(entry),
            Lookup::Pending(_) => None,
        }
    }
}

struct Slot<T> {
    seq: u64,
    entry: Arc<T>,
}

/// Id and name indices for one kind of entry.
struct Index<T: Entry> {
    by_id: DashMap<u32, Slot<T>>,
    by_name: DashMap<String, u32>,
    waiters: DashMap<String, Vec<oneshot::Sender<Arc<T>>>>,
    seq: AtomicU64,
}

impl<T: Entry> Index<T> {
    fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            by_name: DashMap::new(),
            waiters: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    fn record(&self, entry: T) -> Arc<T> {
        let entry = Arc::new(entry);
        let id = entry.id();
        let name = entry.name().to_string();

        // Replacement is remove-then-add, for both the id and the name.
        self.remove(id);
        if let Some((_, previous)) = self.by_name.remove(&name) {
            self.by_id.remove(&previous);
        }

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.by_id.insert(
            id,
            Slot {
                seq,
                entry: Arc::clone(&entry),
            },
        );
        self.by_name.insert(name.clone(), id);

        // The name is visible before waiters are drained, so a concurrent
        // lookup either sees it or gets drained here.
        if let Some((_, waiters)) = self.waiters.remove(&name) {
            trace!(name = %name, waiters = waiters.len(), "Resolving waiters");
            for tx in waiters {
                let _ = tx.send(Arc::clone(&entry));
            }
        }

        entry
    }

    fn remove(&self, id: u32) -> Option<Arc<T>> {
        let (_, slot) = self.by_id.remove(&id)?;
        self.by_name
            .remove_if(slot.entry.name(), |_, current| *current == id);
        Some(slot.entry)
    }

    fn get(&self, id: u32) -> Option<Arc<T>> {
        self.by_id.get(&id).map(|slot| Arc::clone(&slot.entry))
    }

    fn get_by_name(&self, name: &str) -> Option<Arc<T>> {
        let id = *self.by_name.get(name)?;
        self.get(id)
    }

    fn lookup(&self, name: &str) -> Lookup<T> {
        let mut waiters = self.waiters.entry(name.to_string()).or_default();
        if let Some(entry) = self.get_by_name(name) {
            drop(waiters);
            self.waiters.remove_if(name, |_, w| w.is_empty());
            return Lookup::Ready(entry);
        }

        let (tx, rx) = oneshot::channel();
        waiters.retain(|w| !w.is_closed());
        waiters.push(tx);
        Lookup::Pending(rx)
    }

    fn list(&self) -> Vec<Arc<T>> {
        let mut slots: Vec<(u64, Arc<T>)> = self
            .by_id
            .iter()
            .map(|slot| (slot.seq, Arc::clone(&slot.entry)))
            .collect();
        slots.sort_by_key(|(seq, _)| *seq);
        slots.into_iter().map(|(_, entry)| entry).collect()
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }
}

/// The server's currently advertised channels and services.
pub struct Directory {
    channels: Index<Channel>,
    services: Index<Service>,
}

impl Directory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Index::new(),
            services: Index::new(),
        }
    }

    /// Record an advertised channel, replacing any with the same id or topic.
    pub fn record_channel(&self, channel: Channel) -> Arc<Channel> {
        debug!(id = channel.id, topic = %channel.topic, schema = %channel.schema_name, "Channel advertised");
        self.channels.record(channel)
    }

    /// Remove a channel. Unknown ids are ignored.
    pub fn remove_channel(&self, id: u32) -> Option<Arc<Channel>> {
        let removed = self.channels.remove(id);
        if let Some(channel) = &removed {
            debug!(id, topic = %channel.topic, "Channel unadvertised");
        }
        removed
    }

    /// Record an advertised service, replacing any with the same id or name.
    pub fn record_service(&self, service: Service) -> Arc<Service> {
        debug!(id = service.id, name = %service.name, service_type = %service.service_type, "Service advertised");
        self.services.record(service)
    }

    /// Remove a service. Unknown ids are ignored.
    pub fn remove_service(&self, id: u32) -> Option<Arc<Service>> {
        let removed = self.services.remove(id);
        if let Some(service) = &removed {
            debug!(id, name = %service.name, "Service unadvertised");
        }
        removed
    }

    /// Look up a channel by topic, waiting for it if not advertised yet.
    pub fn lookup_channel(&self, topic: &str) -> Lookup<Channel> {
        self.channels.lookup(topic)
    }

    /// Look up a service by name, waiting for it if not advertised yet.
    pub fn lookup_service(&self, name: &str) -> Lookup<Service> {
        self.services.lookup(name)
    }

    #[must_use]
    pub fn channel(&self, id: u32) -> Option<Arc<Channel>> {
        self.channels.get(id)
    }

    #[must_use]
    pub fn channel_by_topic(&self, topic: &str) -> Option<Arc<Channel>> {
        self.channels.get_by_name(topic)
    }

    #[must_use]
    pub fn service(&self, id: u32) -> Option<Arc<Service>> {
        self.services.get(id)
    }

    #[must_use]
    pub fn service_by_name(&self, name: &str) -> Option<Arc<Service>> {
        self.services.get_by_name(name)
    }

    /// All channels, in advertisement order.
    #[must_use]
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.channels.list()
    }

    /// All services, in advertisement order.
    #[must_use]
    pub fn services(&self) -> Vec<Arc<Service>> {
        self.services.list()
    }

    /// Get directory statistics.
    #[must_use]
    pub fn stats(&self) -> DirectoryStats {
        DirectoryStats {
            channel_count: self.channels.len(),
            service_count: self.services.len(),
        }
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryStats {
    pub channel_count: usize,
    pub service_count: usize,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use roslink_protocol::ServiceSchema;

    pub(crate) fn channel(id: u32, topic: &str, schema_name: &str) -> Channel {
        Channel {
            id,
            topic: topic.to_string(),
            encoding: "cdr".to_string(),
            schema_name: schema_name.to_string(),
            schema: "int32 x".to_string(),
            schema_encoding: Some("ros2msg".to_string()),
        }
    }

    pub(crate) fn service(id: u32, name: &str, service_type: &str) -> Service {
        Service {
            id,
            name: name.to_string(),
            service_type: service_type.to_string(),
            request: Some(SchemaText {
                text: "int32 a".to_string(),
                encoding: Some("ros2msg".to_string()),
            }),
            response: Some(SchemaText {
                text: "int32 sum".to_string(),
                encoding: Some("ros2msg".to_string()),
            }),
            encoding: Some("cdr".to_string()),
        }
    }

    #[test]
    fn test_record_and_remove_channel() {
        let directory = Directory::new();
        directory.record_channel(channel(7, "/a", "pkg/A"));
        assert_eq!(directory.channel(7).unwrap().topic, "/a");
        assert_eq!(directory.channel_by_topic("/a").unwrap().id, 7);

        directory.remove_channel(7);
        assert!(directory.channel(7).is_none());
        assert!(directory.channel_by_topic("/a").is_none());
        assert_eq!(directory.stats().channel_count, 0);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let directory = Directory::new();
        directory.record_channel(channel(1, "/a", "pkg/A"));
        assert!(directory.remove_channel(99).is_none());
        assert!(directory.remove_service(99).is_none());
        assert_eq!(directory.stats().channel_count, 1);
    }

    #[test]
    fn test_replacement_by_name_and_id() {
        let directory = Directory::new();
        directory.record_channel(channel(1, "/a", "pkg/A"));
        directory.record_channel(channel(2, "/a", "pkg/A2"));
        assert!(directory.channel(1).is_none());
        assert_eq!(directory.channel_by_topic("/a").unwrap().id, 2);

        directory.record_channel(channel(2, "/b", "pkg/B"));
        assert!(directory.channel_by_topic("/a").is_none());
        assert_eq!(directory.channel_by_topic("/b").unwrap().id, 2);
        assert_eq!(directory.stats().channel_count, 1);
    }

    #[test]
    fn test_list_in_advertisement_order() {
        let directory = Directory::new();
        directory.record_channel(channel(9, "/z", "pkg/Z"));
        directory.record_channel(channel(3, "/a", "pkg/A"));
        directory.record_channel(channel(5, "/m", "pkg/M"));

        let topics: Vec<String> = directory.channels().iter().map(|c| c.topic.clone()).collect();
        assert_eq!(topics, ["/z", "/a", "/m"]);
    }

    #[tokio::test]
    async fn test_lookup_ready() {
        let directory = Directory::new();
        directory.record_service(service(4, "/add", "pkg/Add"));
        let lookup = directory.lookup_service("/add");
        assert_eq!(lookup.ready().unwrap().id, 4);
        assert_eq!(lookup.wait().await.unwrap().service_type, "pkg/Add");
    }

    #[tokio::test]
    async fn test_concurrent_waiters_resolve_once() {
        let directory = Directory::new();
        let first = directory.lookup_channel("/a");
        let second = directory.lookup_channel("/a");
        let mut third = match directory.lookup_channel("/a") {
            Lookup::Pending(rx) => rx,
            Lookup::Ready(_) => panic!("not advertised yet"),
        };
        assert!(third.try_recv().is_err());

        directory.record_channel(channel(7, "/a", "pkg/A"));

        assert_eq!(first.wait().await.unwrap().id, 7);
        assert_eq!(second.wait().await.unwrap().id, 7);
        assert_eq!(third.try_recv().unwrap().id, 7);

        // Later advertisements do not touch already resolved waiters.
        directory.record_channel(channel(8, "/a", "pkg/A"));
        assert!(directory.waiters_empty());
    }

    #[test]
    fn test_service_from_advertisement() {
        let advertised = ServiceAdvertisement {
            id: 3,
            name: "/add".to_string(),
            service_type: "pkg/srv/Add".to_string(),
            request: Some(ServiceSchema {
                encoding: "cdr".to_string(),
                schema_name: "pkg/srv/Add_Request".to_string(),
                schema_encoding: "ros2idl".to_string(),
                schema: "module pkg {};".to_string(),
            }),
            response: None,
            request_schema: None,
            response_schema: Some("int32 sum".to_string()),
        };

        let service = Service::from(advertised);
        assert_eq!(service.encoding.as_deref(), Some("cdr"));
        assert_eq!(
            service.request.unwrap().encoding.as_deref(),
            Some("ros2idl")
        );
        assert_eq!(service.response.unwrap().encoding, None);
    }

    impl Directory {
        fn waiters_empty(&self) -> bool {
            self.channels.waiters.is_empty() && self.services.waiters.is_empty()
        }
    }
}
