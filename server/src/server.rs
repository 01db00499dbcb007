use std::collections::HashMap;
use tokio::sync::mpsc::{channel, Sender};

use poll_system::{
    validate_session_id, ClientCommand, CommandError, CommandResult, ConnectionId,
    IdentifiableCommand, IdentifiableEvent, Session, SessionId, SystemEvent, Username,
};

use super::connection::{ConnectionCommand, ConnectionEvent};
use crate::connection_tx_storage::ConnectionTxStorage;
use crate::edit::submit_edit;
use crate::query::QueryCommand;
use crate::registry::SubscriptionRegistry;
use crate::store::Store;
use crate::watcher::SessionWatcher;

pub type ServerTx = Sender<ServerCommand>;

#[derive(Debug)]
pub enum ServerCommand {
    ConnectionCommand(ConnectionCommand),
    QueryCommand(QueryCommand),
}

/// Owns the store and every connection. Commands are handled one at a time, so each
/// read-modify-write of a session runs without interleaving.
struct Server<S> {
    store: S,
    registry: SubscriptionRegistry,
    watchers: HashMap<(ConnectionId, SessionId), SessionWatcher>,
    connections: ConnectionTxStorage,
}

impl<S: Store> Server<S> {
    fn new(store: S) -> Self {
        Self {
            store,
            registry: SubscriptionRegistry::new(),
            watchers: HashMap::new(),
            connections: ConnectionTxStorage::new(),
        }
    }

    async fn handle_server_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::ConnectionCommand(command) => {
                self.handle_connection_command(command).await
            }
            ServerCommand::QueryCommand(command) => self.handle_query_command(command).await,
        }
    }

    async fn handle_connection_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Connect { tx } => {
                let connection_id = new_connection_id();
                log::info!("Connection {} connected", connection_id);
                self.connections.insert(connection_id.clone(), tx);
                let event = ConnectionEvent::Connected {
                    connection_id: connection_id.clone(),
                };
                self.connections.send(&connection_id, event).await;
            }
            ConnectionCommand::Disconnect { from } => {
                self.close_connection(&from).await;
                if self.connections.remove(&from).is_some() {
                    log::info!("Connection {} disconnected", from);
                }
            }
            ConnectionCommand::IdentifiableCommand {
                from,
                command: IdentifiableCommand {
                    command_id,
                    command,
                },
            } => {
                let result = match self.handle_client_command(&from, command).await {
                    Ok(system_event) => CommandResult::Ok(system_event),
                    Err(error) => {
                        log::warn!("Rejected command from {}: {}", from, error);
                        CommandResult::Error(error)
                    }
                };
                self.connections
                    .send(
                        &from,
                        ConnectionEvent::IdentifiableEvent(IdentifiableEvent::ByMyself {
                            command_id,
                            result,
                        }),
                    )
                    .await;
            }
        }
    }

    async fn handle_client_command(
        &mut self,
        from: &ConnectionId,
        command: ClientCommand,
    ) -> Result<SystemEvent, CommandError> {
        match command {
            ClientCommand::WatchSession { session_id } => {
                validate_session_id(&session_id)?;
                let session = self.store.find_one(&session_id).await?;
                self.registry.subscribe(from, &session_id);
                self.watchers
                    .entry((from.clone(), session_id.clone()))
                    .or_insert_with(|| SessionWatcher::new(session_id.clone(), from.clone()));
                Ok(SystemEvent::Watching {
                    session_id,
                    session,
                })
            }
            ClientCommand::UnwatchSession { session_id } => {
                if !self.registry.unsubscribe(from, &session_id) {
                    return Err(CommandError::NotWatching { session_id });
                }
                self.close_watcher(from, &session_id).await;
                Ok(SystemEvent::Unwatched { session_id })
            }
            // Only watchers may edit; their bindings are released when the watcher closes.
            ClientCommand::EditSession { session, claim } => {
                if !self.registry.is_subscribed(from, &session.id) {
                    return Err(CommandError::NotWatching {
                        session_id: session.id,
                    });
                }
                let stored = self.edit_session(from, session, claim.as_ref()).await?;
                Ok(SystemEvent::Edited {
                    session_id: stored.id,
                    version: stored.version,
                })
            }
        }
    }

    async fn edit_session(
        &mut self,
        from: &ConnectionId,
        session: Session,
        claim: Option<&Username>,
    ) -> Result<Session, CommandError> {
        let stored = submit_edit(&mut self.store, from, session, claim).await?;
        self.broadcast_session(&stored).await;
        Ok(stored)
    }

    async fn handle_query_command(&mut self, command: QueryCommand) {
        match command {
            QueryCommand::GetSession { session_id, tx } => {
                let _ = tx.send(self.store.find_one(&session_id).await);
            }
            QueryCommand::ListSessions { tx } => {
                let _ = tx.send(self.store.session_ids().await);
            }
        }
    }

    async fn close_connection(&mut self, connection_id: &ConnectionId) {
        for session_id in self.registry.remove_connection(connection_id) {
            self.close_watcher(connection_id, &session_id).await;
        }
    }

    /// Failures are logged only; the watcher counts as closed either way.
    async fn close_watcher(&mut self, connection_id: &ConnectionId, session_id: &SessionId) {
        let key = (connection_id.clone(), session_id.clone());
        let mut watcher = match self.watchers.remove(&key) {
            Some(watcher) => watcher,
            None => return,
        };
        match watcher.close(&mut self.store).await {
            Ok(outcome) => {
                if let Some(session) = outcome.changed_session() {
                    let session = session.clone();
                    self.broadcast_session(&session).await;
                }
            }
            Err(error) => log::warn!("{}", error),
        }
    }

    async fn broadcast_session(&mut self, session: &Session) {
        for connection_id in self.registry.subscribers(&session.id) {
            let event = ConnectionEvent::IdentifiableEvent(IdentifiableEvent::BySystem {
                system_event: SystemEvent::SessionChanged {
                    session: session.clone(),
                },
            });
            self.connections.send(&connection_id, event).await;
        }
    }
}

fn new_connection_id() -> ConnectionId {
    uuid::Uuid::new_v4().to_simple().to_string()
}

pub fn spawn_server<S>(store: S, capacity: usize) -> ServerTx
where
    S: Store + 'static,
{
    let (srv_tx, mut srv_rx) = channel::<ServerCommand>(capacity);

    tokio::spawn(async move {
        let mut server = Box::new(Server::new(store));

        while let Some(command) = srv_rx.recv().await {
            server.handle_server_command(command).await;
        }
        log::info!("Server loop terminated");
    });

    srv_tx
}
