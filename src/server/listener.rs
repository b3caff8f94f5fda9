use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::http::connection::{CloseReason, Connection, ConnectionState};
use crate::server::routes::{Layered, RouteMap};
use crate::server::{ServerError, TickReport};
use crate::transport::{Acceptor, Bind, would_block};

type StreamOf<B> = <<B as Bind>::Acceptor as Acceptor>::Stream;

/// A tick-driven HTTP/1.0 server.
///
/// Nothing happens between calls to [`Server::serve`]. Each call accepts
/// pending connections and then runs every phase as a separate pass over
/// the live connections, in acceptance order.
pub struct Server<B: Bind> {
    binder: B,
    config: ServerConfig,
    acceptor: Option<B::Acceptor>,
    routes: RouteMap,
    connections: Vec<Connection<StreamOf<B>>>,
}

impl<B: Bind> Server<B> {
    /// Creates a stopped server. The configured routes become the initial
    /// route map.
    pub fn new(binder: B, config: ServerConfig) -> Self {
        let routes = config.routes.clone();
        Self {
            binder,
            config,
            acceptor: None,
            routes,
            connections: Vec::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.acceptor.is_some()
    }

    /// The listening socket, while running.
    pub fn acceptor(&self) -> Option<&B::Acceptor> {
        self.acceptor.as_ref()
    }

    pub fn routes(&self) -> &RouteMap {
        &self.routes
    }

    /// Adds or replaces routes. Routes not mentioned are kept.
    pub fn set_routes<K, V>(&mut self, routes: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.routes
            .extend(routes.into_iter().map(|(k, v)| (k.into(), v.into())));
    }

    pub fn set_route(&mut self, path: impl Into<String>, body: impl Into<String>) {
        self.routes.insert(path.into(), body.into());
    }

    pub fn connections(&self) -> &[Connection<StreamOf<B>>] {
        &self.connections
    }

    /// Binds and listens on the configured port.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.acceptor.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        let acceptor = self
            .binder
            .bind(self.config.port, self.config.backlog)
            .map_err(|source| ServerError::Bind {
                port: self.config.port,
                source,
            })?;

        info!(port = self.config.port, backlog = self.config.backlog, "Listening");
        self.acceptor = Some(acceptor);
        Ok(())
    }

    /// Closes the listening socket and every live connection.
    pub fn stop(&mut self) {
        if self.acceptor.take().is_some() {
            info!(port = self.config.port, live = self.connections.len(), "Stopping");
        }

        for conn in &mut self.connections {
            conn.close(CloseReason::Shutdown);
        }
        self.connections.clear();
    }

    /// Runs one tick with the persistent routes.
    pub fn serve(&mut self, now: u64) -> TickReport {
        self.serve_with(&RouteMap::new(), now)
    }

    /// Runs one tick, answering from `overlay` first and the persistent
    /// routes second. The overlay is not kept.
    pub fn serve_with(&mut self, overlay: &RouteMap, now: u64) -> TickReport {
        let mut report = TickReport::default();

        let Some(acceptor) = self.acceptor.as_mut() else {
            return report;
        };

        let expiry = match self.config.timeout_ms {
            0 => 0,
            timeout => now.saturating_add(timeout),
        };

        loop {
            match acceptor.try_accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, expiry, "Accepted connection");
                    self.connections.push(Connection::new(stream, peer, expiry));
                    report.accepted += 1;
                }
                Err(e) if would_block(&e) => break,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    break;
                }
            }
        }

        for conn in &mut self.connections {
            conn.read();
        }

        let routes = Layered {
            base: &self.routes,
            overlay,
        };
        for conn in &mut self.connections {
            conn.process(&self.config.template, &routes);
        }

        for conn in &mut self.connections {
            conn.write();
        }

        if self.config.timeout_ms > 0 {
            for conn in &mut self.connections {
                conn.expire(now);
            }
        }

        self.connections.retain(|conn| {
            if conn.state() != ConnectionState::Closed {
                return true;
            }

            match conn.close_reason() {
                Some(CloseReason::Completed) => report.completed += 1,
                Some(CloseReason::Expired) => report.expired += 1,
                _ => report.dropped += 1,
            }
            false
        });

        report.live = self.connections.len();
        report
    }
}

impl<B: Bind> Drop for Server<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
