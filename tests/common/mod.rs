#![allow(dead_code)]

use async_trait::async_trait;
use realtime_gateway::backend::{
    BackendError, DocAuthorizer, IdentityLookup, Session, TaskLogStore, UserInfo, GUEST,
};
use realtime_gateway::config::GatewayConfig;
use realtime_gateway::tenant::ConnectRequest;
use realtime_gateway::ws::{ConnectionId, OutgoingMessage, ServerEvent};
use realtime_gateway::{Collaborators, Gateway};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

pub const SITE: &str = "site1.local";

/// In-memory stand-in for the web backend.
#[derive(Default)]
pub struct FakeBackend {
    /// Users by session id
    pub users: Mutex<HashMap<String, String>>,
    pub allow_guest: AtomicBool,
    pub identity_down: AtomicBool,
    /// (doctype, docname) pairs anyone may follow
    pub allowed_docs: Mutex<HashSet<(String, String)>>,
    /// Authorization calls block here until notified
    pub auth_gate: Mutex<Option<Arc<Notify>>>,
    pub auth_calls: AtomicUsize,
    pub task_logs: Mutex<HashMap<String, Value>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, sid: &str, user: &str) {
        self.users
            .lock()
            .unwrap()
            .insert(sid.to_string(), user.to_string());
    }

    pub fn allow_doc(&self, doctype: &str, docname: &str) {
        self.allowed_docs
            .lock()
            .unwrap()
            .insert((doctype.to_string(), docname.to_string()));
    }

    pub fn gate_auth(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.auth_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl IdentityLookup for FakeBackend {
    async fn lookup(&self, session: &Session) -> Result<UserInfo, BackendError> {
        if self.identity_down.load(Ordering::SeqCst) {
            return Err(BackendError::Status(502));
        }
        let user = session
            .sid
            .as_ref()
            .and_then(|sid| self.users.lock().unwrap().get(sid).cloned());
        Ok(match user {
            Some(user) => UserInfo {
                user,
                sid: session.sid.clone(),
                allow_guest: false,
            },
            None => UserInfo {
                user: GUEST.to_string(),
                sid: None,
                allow_guest: self.allow_guest.load(Ordering::SeqCst),
            },
        })
    }
}

#[async_trait]
impl DocAuthorizer for FakeBackend {
    async fn can_subscribe(
        &self,
        _session: &Session,
        doctype: &str,
        docname: &str,
    ) -> Result<bool, BackendError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.auth_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if docname == "BROKEN" {
            return Err(BackendError::Status(500));
        }
        Ok(self
            .allowed_docs
            .lock()
            .unwrap()
            .contains(&(doctype.to_string(), docname.to_string())))
    }
}

#[async_trait]
impl TaskLogStore for FakeBackend {
    async fn task_lines(&self, _session: &Session, task_id: &str) -> Result<Value, BackendError> {
        self.task_logs
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .ok_or(BackendError::Status(404))
    }
}

pub fn collaborators(backend: &Arc<FakeBackend>) -> Collaborators {
    Collaborators {
        identity: backend.clone(),
        docs: backend.clone(),
        task_logs: backend.clone(),
    }
}

pub fn gateway_with(config: GatewayConfig, backend: &Arc<FakeBackend>) -> Arc<Gateway> {
    Arc::new(Gateway::new(config, collaborators(backend)))
}

pub fn gateway(backend: &Arc<FakeBackend>) -> Arc<Gateway> {
    gateway_with(GatewayConfig::default(), backend)
}

pub fn request(sid: Option<&str>) -> ConnectRequest {
    ConnectRequest {
        site_header: Some(SITE.to_string()),
        host: Some(SITE.to_string()),
        cookie: sid.map(|sid| format!("sid={}", sid)),
        ..Default::default()
    }
}

pub async fn connect(
    gateway: &Gateway,
    sid: Option<&str>,
) -> (ConnectionId, mpsc::Receiver<OutgoingMessage>) {
    let (tx, rx) = mpsc::channel(64);
    let id = gateway.connect(&request(sid), tx).await;
    (id, rx)
}

/// Everything queued for a connection so far.
pub fn drain(rx: &mut mpsc::Receiver<OutgoingMessage>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(OutgoingMessage::Event(event)) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn named<'a>(events: &'a [ServerEvent], name: &str) -> Vec<&'a ServerEvent> {
    events.iter().filter(|e| e.event == name).collect()
}
