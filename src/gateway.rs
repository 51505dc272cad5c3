//! The gateway: connection admission and client event dispatch over the
//! shared room registry.
//!
//! Registry mutations are synchronous and happen under a lock that is never
//! held across an `.await`. Handlers that wait on a collaborator re-check
//! that their connection is still registered before applying the result.

use crate::backend::{
    DocAuthorizer, HttpBackend, IdentityLookup, Session, TaskLogStore, UserInfo,
};
use crate::config::GatewayConfig;
use crate::tenant::{backend_base, resolve_site, ConnectRequest};
use crate::upload::SliceOutcome;
use crate::ws::connection::{Admission, Connection, ConnectionId, OutgoingMessage};
use crate::ws::protocol::{ClientEvent, DocRef, ServerEvent, UploadSlice};
use crate::ws::room::{
    doc_room, open_doc_room, site_room, task_room, user_room, RoomRegistry, RoomTransport,
};
use crate::{chat, presence};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// External services the gateway depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityLookup>,
    pub docs: Arc<dyn DocAuthorizer>,
    pub task_logs: Arc<dyn TaskLogStore>,
}

impl Collaborators {
    /// Use one HTTP backend for every collaborator.
    pub fn http(backend: Arc<HttpBackend>) -> Self {
        Self {
            identity: backend.clone(),
            docs: backend.clone(),
            task_logs: backend,
        }
    }
}

pub struct Gateway {
    config: GatewayConfig,
    collaborators: Collaborators,
    registry: Mutex<RoomRegistry>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            registry: Mutex::new(RoomRegistry::new()),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn registry(&self) -> MutexGuard<'_, RoomRegistry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run a read-only closure against the registry.
    pub fn inspect<R>(&self, f: impl FnOnce(&RoomRegistry) -> R) -> R {
        f(&self.registry())
    }

    // --- Admission ---

    /// Resolve tenant and identity for a new connection, register it and
    /// join its automatic rooms.
    ///
    /// Never rejects: an unreachable identity service admits the connection
    /// as a guest.
    pub async fn connect(
        &self,
        request: &ConnectRequest,
        sender: mpsc::Sender<OutgoingMessage>,
    ) -> ConnectionId {
        let site = resolve_site(request, self.config.default_site.as_deref())
            .or_else(|| self.config.default_site.clone())
            .unwrap_or_default();
        if site.is_empty() {
            tracing::warn!("Could not resolve a site for connection, using empty site");
        }

        let mut session = Session {
            site,
            base_url: backend_base(request),
            sid: request.sid(),
            authorization: request.authorization.clone(),
            token: request.auth_token(),
        };

        let info = self.resolve_identity(&session).await;
        if let Some(sid) = info.sid.clone() {
            session.sid = Some(sid);
        }

        let admission = if !info.is_guest() {
            Admission::Authenticated(info.user.clone())
        } else if info.allow_guest {
            Admission::GuestAllowed
        } else {
            Admission::GuestDenied
        };

        let conn = Connection::new(admission.clone(), session, sender);
        let site = conn.site().to_string();

        let mut registry = self.registry();
        let conn_id = registry.register(conn);

        match &admission {
            Admission::Authenticated(user) => {
                let user_room = user_room(&site, user);
                let site_room = site_room(&site);
                registry.join(&conn_id, &user_room);
                registry.join(&conn_id, &site_room);
                registry.send_to(
                    &conn_id,
                    ServerEvent::message(format!("Joining site room: {}", site_room)),
                );
                registry.send_to(
                    &conn_id,
                    ServerEvent::message(format!("Joining user room: {}", user)),
                );
                registry.broadcast_to_room(&user_room, &ServerEvent::socket_connection(user));
            }
            Admission::GuestAllowed => {
                registry.join(&conn_id, &user_room(&site, admission.user()));
                registry.send_to(&conn_id, ServerEvent::message("Joining guest room"));
            }
            Admission::GuestDenied => {}
        }

        tracing::info!(
            "Connection {} admitted as {:?} on site {}",
            conn_id,
            admission,
            site
        );
        conn_id
    }

    async fn resolve_identity(&self, session: &Session) -> UserInfo {
        match self.collaborators.identity.lookup(session).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(
                    "Identity lookup failed for site {}, admitting as guest: {}",
                    session.site,
                    e
                );
                UserInfo::guest()
            }
        }
    }

    /// Drop a connection: leave every room and discard in-flight uploads.
    ///
    /// Open documents are not re-broadcast to their remaining viewers.
    pub fn disconnect(&self, conn_id: &str) {
        let removed = self.registry().unregister(conn_id);
        if let Some(conn) = removed {
            tracing::info!(
                "Connection {} ({}) disconnected after {:?}",
                conn_id,
                conn.user(),
                conn.connected_at.elapsed()
            );
        }
    }

    pub fn is_connected(&self, conn_id: &str) -> bool {
        self.registry().is_connected(conn_id)
    }

    // --- Room primitives ---

    pub fn join(&self, conn_id: &str, room: &str) -> bool {
        self.registry().join(conn_id, room)
    }

    pub fn leave(&self, conn_id: &str, room: &str) -> bool {
        self.registry().leave(conn_id, room)
    }

    /// Deliver to one room, or to every connection when `room` is `None`.
    pub fn broadcast(&self, room: Option<&str>, event: &ServerEvent) -> usize {
        let registry = self.registry();
        match room {
            Some(room) => registry.broadcast_to_room(room, event),
            None => registry.broadcast_all(event),
        }
    }

    pub fn members(&self, room: &str) -> Vec<ConnectionId> {
        self.registry().members(room)
    }

    pub fn viewers(&self, site: &str, doctype: &str, docname: &str) -> Vec<String> {
        presence::viewers(&self.registry(), site, doctype, docname)
    }

    /// In-flight uploads held for a connection.
    pub fn upload_count(&self, conn_id: &str) -> usize {
        self.registry()
            .connection(conn_id)
            .map(|conn| conn.uploads.len())
            .unwrap_or(0)
    }

    fn session(&self, conn_id: &str) -> Option<Session> {
        self.registry()
            .connection(conn_id)
            .map(|conn| conn.session.clone())
    }

    // --- Event dispatch ---

    /// Handle one event from a client.
    pub async fn handle_event(&self, conn_id: &str, event: ClientEvent) {
        let Some(session) = self.session(conn_id) else {
            tracing::debug!("Dropping {} for unknown connection {}", event.name(), conn_id);
            return;
        };
        let site = session.site.as_str();
        tracing::debug!("Connection {} sent {}", conn_id, event.name());

        match event {
            ClientEvent::TaskSubscribe(task) => {
                self.join(conn_id, &task_room(site, &task.task_id));
            }
            ClientEvent::TaskUnsubscribe(task) => {
                self.leave(conn_id, &task_room(site, &task.task_id));
            }
            ClientEvent::ProgressSubscribe(task) => {
                self.progress_subscribe(conn_id, &session, &task.task_id).await;
            }
            ClientEvent::DocSubscribe(doc) => {
                if self.authorize_doc(conn_id, &session, &doc).await {
                    self.join(conn_id, &doc_room(site, &doc.doctype, &doc.docname));
                }
            }
            ClientEvent::DocUnsubscribe(doc) => {
                self.leave(conn_id, &doc_room(site, &doc.doctype, &doc.docname));
            }
            ClientEvent::DocOpen(doc) => {
                if self.authorize_doc(conn_id, &session, &doc).await {
                    let mut registry = self.registry();
                    registry.join(conn_id, &open_doc_room(site, &doc.doctype, &doc.docname));
                    presence::broadcast_viewers(&registry, site, &doc.doctype, &doc.docname);
                }
            }
            ClientEvent::DocClose(doc) => {
                let mut registry = self.registry();
                registry.leave(conn_id, &open_doc_room(site, &doc.doctype, &doc.docname));
                presence::broadcast_viewers(&registry, site, &doc.doctype, &doc.docname);
            }
            ClientEvent::UploadAcceptSlice(slice) => {
                self.accept_slice(conn_id, &slice).await;
            }
            ClientEvent::ChatSubscribe(rooms) => {
                chat::subscribe(&mut self.registry(), conn_id, site, rooms.rooms.into_vec());
            }
            ClientEvent::ChatTyping(typing) => {
                chat::typing(&self.registry(), site, &typing.room, &typing.user);
            }
        }
    }

    /// Ask the backend whether this connection may follow a document.
    ///
    /// Only an explicit grant for a still-connected connection returns true.
    /// Denials and failures are silent towards the client.
    async fn authorize_doc(&self, conn_id: &str, session: &Session, doc: &DocRef) -> bool {
        if doc.doctype.is_empty() || doc.docname.is_empty() {
            return false;
        }

        let allowed = match self
            .collaborators
            .docs
            .can_subscribe(session, &doc.doctype, &doc.docname)
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                tracing::debug!(
                    "Connection {} denied {}/{}",
                    conn_id,
                    doc.doctype,
                    doc.docname
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    "Document authorization for {}/{} failed: {}",
                    doc.doctype,
                    doc.docname,
                    e
                );
                false
            }
        };

        if allowed && !self.is_connected(conn_id) {
            tracing::debug!(
                "Discarding authorization for disconnected connection {}",
                conn_id
            );
            return false;
        }
        allowed
    }

    /// Join the task room, then replay the task's log so far to this
    /// connection only.
    async fn progress_subscribe(&self, conn_id: &str, session: &Session, task_id: &str) {
        self.join(conn_id, &task_room(&session.site, task_id));

        let lines = match self.collaborators.task_logs.task_lines(session, task_id).await {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!("Failed to fetch log for task {}: {}", task_id, e);
                return;
            }
        };

        if !self
            .registry()
            .send_to(conn_id, ServerEvent::task_progress(task_id, lines))
        {
            tracing::debug!(
                "Task {} backlog not delivered to connection {}",
                task_id,
                conn_id
            );
        }
    }

    async fn accept_slice(&self, conn_id: &str, slice: &UploadSlice) {
        let chunk_size = self.config.chunk_size;

        let outcome = {
            let mut registry = self.registry();
            let Some(conn) = registry.connection_mut(conn_id) else {
                return;
            };
            let site = conn.session.site.clone();
            conn.uploads.accept(slice, &site, chunk_size)
        };

        let reply = match outcome {
            Ok(SliceOutcome::NeedMore(current)) => ServerEvent::upload_request_slice(current),
            Ok(SliceOutcome::Complete(upload)) => {
                let site_root = self.config.site_root(&upload.site);
                match upload.write(&site_root).await {
                    Ok(file_url) => ServerEvent::upload_end(&file_url),
                    Err(e) => {
                        tracing::warn!("Upload {} failed: {}", upload.name, e);
                        ServerEvent::upload_error(e)
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Rejected slice for {}: {}", slice.name, e);
                ServerEvent::upload_error(e)
            }
        };

        self.registry().send_to(conn_id, reply);
    }
}
