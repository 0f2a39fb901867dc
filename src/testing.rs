//! In-process doubles for the runtime, identifier and event collaborators.
//!
//! `MockRuntime` keeps just enough daemon state (networks, attachments,
//! containers) to answer the way Docker does, including the "not found" and
//! "not connected" conditions teardown has to tolerate.

use crate::event::{EventKind, EventPublisher};
use crate::id::IdGenerator;
use crate::orchestrator::Orchestrator;
use crate::provisioner::{
    DindConfig, DindProvisioner, InstanceProvisionerFactory, OverlaySessionProvisioner,
    WindowsPoolProvisioner,
};
use crate::runtime::{
    CreateContainerOpts, NetworkCreateOpts, Result, RuntimeConnection, RuntimeError,
    RuntimeFactory,
};
use crate::storage::{MemoryStorage, Storage};
use crate::types::{Playground, PoolSlot, Session};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    CreateNetwork(String, NetworkCreateOpts),
    ConnectNetwork {
        container: String,
        network: String,
        requested_ip: Option<String>,
    },
    DisconnectNetwork {
        container: String,
        network: String,
    },
    DeleteNetwork(String),
    CreateContainer(CreateContainerOpts),
    ContainerIps(String),
    DeleteContainer(String),
    Resize {
        name: String,
        rows: u16,
        cols: u16,
    },
}

#[derive(Debug, Default)]
struct DaemonState {
    calls: Vec<RuntimeCall>,
    networks: HashSet<String>,
    attached: HashSet<(String, String)>,
    containers: HashMap<String, (Vec<String>, String)>,
    next_ip: u8,
}

pub struct MockRuntime {
    daemon_host: String,
    router_ip: String,
    state: Mutex<DaemonState>,
}

impl MockRuntime {
    pub fn new(daemon_host: &str) -> Self {
        Self {
            daemon_host: daemon_host.to_string(),
            router_ip: "10.0.0.254".to_string(),
            state: Mutex::new(DaemonState::default()),
        }
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.state.lock().unwrap().networks.contains(name)
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.state.lock().unwrap().containers.contains_key(name)
    }

    pub fn add_network(&self, name: &str) {
        self.state.lock().unwrap().networks.insert(name.to_string());
    }

    fn record(&self, call: RuntimeCall) -> std::sync::MutexGuard<'_, DaemonState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl RuntimeConnection for MockRuntime {
    async fn create_network(&self, name: &str, opts: &NetworkCreateOpts) -> Result<()> {
        let mut state = self.record(RuntimeCall::CreateNetwork(name.to_string(), opts.clone()));
        if !state.networks.insert(name.to_string()) {
            return Err(RuntimeError::AlreadyExists(format!("network {}", name)));
        }
        Ok(())
    }

    async fn connect_network(
        &self,
        container: &str,
        network: &str,
        requested_ip: Option<&str>,
    ) -> Result<String> {
        let mut state = self.record(RuntimeCall::ConnectNetwork {
            container: container.to_string(),
            network: network.to_string(),
            requested_ip: requested_ip.map(str::to_string),
        });
        if !state.networks.contains(network) {
            return Err(RuntimeError::NotFound(format!("network {}", network)));
        }
        state
            .attached
            .insert((container.to_string(), network.to_string()));
        Ok(requested_ip
            .map(str::to_string)
            .unwrap_or_else(|| self.router_ip.clone()))
    }

    async fn disconnect_network(&self, container: &str, network: &str) -> Result<()> {
        let mut state = self.record(RuntimeCall::DisconnectNetwork {
            container: container.to_string(),
            network: network.to_string(),
        });
        if !state.networks.contains(network) {
            return Err(RuntimeError::NotFound(format!("network {}", network)));
        }
        if !state
            .attached
            .remove(&(container.to_string(), network.to_string()))
        {
            return Err(RuntimeError::NotConnected {
                container: container.to_string(),
                network: network.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_network(&self, name: &str) -> Result<()> {
        let mut state = self.record(RuntimeCall::DeleteNetwork(name.to_string()));
        if state.attached.iter().any(|(_, network)| network == name) {
            return Err(RuntimeError::Other(format!(
                "network {} has active endpoints",
                name
            )));
        }
        if !state.networks.remove(name) {
            return Err(RuntimeError::NotFound(format!("network {}", name)));
        }
        Ok(())
    }

    fn daemon_host(&self) -> String {
        self.daemon_host.clone()
    }

    async fn create_container(&self, opts: &CreateContainerOpts) -> Result<()> {
        let mut state = self.record(RuntimeCall::CreateContainer(opts.clone()));
        if state.containers.contains_key(&opts.container_name) {
            return Err(RuntimeError::AlreadyExists(format!(
                "container {}",
                opts.container_name
            )));
        }
        if let Some(missing) = opts.networks.iter().find(|n| !state.networks.contains(*n)) {
            return Err(RuntimeError::NotFound(format!("network {}", missing)));
        }
        state.next_ip += 1;
        let ip = format!("10.0.0.{}", state.next_ip);
        for network in &opts.networks {
            state
                .attached
                .insert((opts.container_name.clone(), network.clone()));
        }
        state
            .containers
            .insert(opts.container_name.clone(), (opts.networks.clone(), ip));
        Ok(())
    }

    async fn container_ips(&self, name: &str) -> Result<HashMap<String, String>> {
        let state = self.record(RuntimeCall::ContainerIps(name.to_string()));
        let (networks, ip) = state
            .containers
            .get(name)
            .ok_or_else(|| RuntimeError::NotFound(format!("container {}", name)))?;
        Ok(networks.iter().map(|n| (n.clone(), ip.clone())).collect())
    }

    async fn delete_container(&self, name: &str) -> Result<()> {
        let mut state = self.record(RuntimeCall::DeleteContainer(name.to_string()));
        if state.containers.remove(name).is_none() {
            return Err(RuntimeError::NotFound(format!("container {}", name)));
        }
        state.attached.retain(|(container, _)| container != name);
        Ok(())
    }

    async fn container_resize(&self, name: &str, rows: u16, cols: u16) -> Result<()> {
        self.record(RuntimeCall::Resize {
            name: name.to_string(),
            rows,
            cols,
        });
        Ok(())
    }
}

/// Factory returning one shared [`MockRuntime`], or failing when switched off.
pub struct MockFactory {
    runtime: Arc<MockRuntime>,
    available: AtomicBool,
    requests: AtomicUsize,
}

impl MockFactory {
    pub fn new(runtime: Arc<MockRuntime>) -> Self {
        Self {
            runtime,
            available: AtomicBool::new(true),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuntimeFactory for MockFactory {
    async fn get_for_session(&self, session: &Session) -> Result<Arc<dyn RuntimeConnection>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(RuntimeError::Unavailable(format!(
                "no daemon for session {}",
                session.id
            )));
        }
        Ok(Arc::clone(&self.runtime) as Arc<dyn RuntimeConnection>)
    }
}

/// Hands out queued ids, repeating the last one once the queue runs dry.
pub struct MockGenerator {
    ids: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl MockGenerator {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Mutex::new(ids.into_iter().map(Into::into).collect()),
            last: Mutex::new(String::new()),
        }
    }
}

impl IdGenerator for MockGenerator {
    fn new_id(&self) -> String {
        let mut last = self.last.lock().unwrap();
        if let Some(id) = self.ids.lock().unwrap().pop_front() {
            *last = id;
        }
        last.clone()
    }
}

pub type RecordedEvent = (EventKind, String, Vec<String>);

/// Publisher that keeps every emitted event.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEvents {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().into_iter().map(|(kind, _, _)| kind).collect()
    }
}

impl EventPublisher for RecordingEvents {
    fn emit(&self, kind: EventKind, session_id: &str, args: Vec<String>) {
        self.events
            .lock()
            .unwrap()
            .push((kind, session_id.to_string(), args));
    }
}

/// A fully wired orchestrator over in-memory collaborators.
///
/// The windows pool has a single slot, `win-a` at `10.1.0.10`.
pub struct TestStack {
    pub runtime: Arc<MockRuntime>,
    pub factory: Arc<MockFactory>,
    pub storage: Arc<MemoryStorage>,
    pub events: Arc<RecordingEvents>,
    pub orchestrator: Arc<Orchestrator>,
}

impl TestStack {
    /// Build a stack with `playground` stored and `ids` queued in the generator.
    pub async fn new(playground: Playground, ids: &[&str]) -> Self {
        let runtime = Arc::new(MockRuntime::new("localhost"));
        let factory = Arc::new(MockFactory::new(Arc::clone(&runtime)));
        let storage = Arc::new(MemoryStorage::new());
        let events = Arc::new(RecordingEvents::default());
        let generator: Arc<dyn IdGenerator> = Arc::new(MockGenerator::new(ids.iter().copied()));

        storage.playground_put(&playground).await.unwrap();

        let dind = DindProvisioner::new(
            Arc::clone(&generator),
            factory.clone(),
            storage.clone(),
            DindConfig::default(),
        );
        let windows = WindowsPoolProvisioner::new(
            vec![PoolSlot {
                id: "win-a".to_string(),
                address: "10.1.0.10".to_string(),
            }],
            storage.clone(),
        );
        let provisioners = InstanceProvisionerFactory::new(Arc::new(windows), Arc::new(dind));

        let orchestrator = Arc::new(Orchestrator::new(
            factory.clone(),
            events.clone(),
            storage.clone(),
            Arc::new(OverlaySessionProvisioner::new(factory.clone())),
            provisioners,
            generator,
        ));

        Self {
            runtime,
            factory,
            storage,
            events,
            orchestrator,
        }
    }
}
