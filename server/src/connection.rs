use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Running, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use actix_web_actors::ws::{CloseCode, CloseReason};

use poll_system::{serde_json, ConnectionId, IdentifiableCommand, IdentifiableEvent, SystemEvent};

use crate::connection_tx_storage::ConnectionTx;
use crate::server::{ServerCommand, ServerTx};

#[derive(Debug)]
pub enum ConnectionCommand {
    Connect {
        tx: ConnectionTx,
    },
    Disconnect {
        from: ConnectionId,
    },
    IdentifiableCommand {
        from: ConnectionId,
        command: IdentifiableCommand,
    },
}

#[derive(Debug)]
pub enum ConnectionEvent {
    Connected { connection_id: ConnectionId },
    IdentifiableEvent(IdentifiableEvent),
}

#[derive(Message)]
#[rtype(result = "()")]
struct ConnectionActorMessage(ConnectionEvent);

enum ConnectionState {
    Idle,
    Connected(ConnectionId),
    Disconnected,
}

struct ConnectionActor {
    state: ConnectionState,
    srv_tx: ServerTx,
}

impl ConnectionActor {
    /// Queues a command without awaiting, so commands of one connection keep their order.
    fn forward(&mut self, command: ConnectionCommand, ctx: &mut ws::WebsocketContext<Self>) {
        if self
            .srv_tx
            .try_send(ServerCommand::ConnectionCommand(command))
            .is_err()
        {
            log::warn!("Server queue is full or closed, dropping connection");
            ctx.close(Some(CloseReason {
                code: CloseCode::Again,
                description: None,
            }));
            ctx.stop();
        }
    }

    /// Tells the server exactly once that this connection is gone.
    fn notify_disconnect(&mut self) {
        if let ConnectionState::Connected(id) =
            std::mem::replace(&mut self.state, ConnectionState::Disconnected)
        {
            let mut srv_tx = self.srv_tx.clone();
            actix::spawn(async move {
                let command = ServerCommand::ConnectionCommand(ConnectionCommand::Disconnect {
                    from: id.clone(),
                });
                if srv_tx.send(command).await.is_err() {
                    log::warn!("Server stopped before disconnect of {} was handled", id);
                }
            });
        }
    }
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<ConnectionEvent>(32);

        self.forward(ConnectionCommand::Connect { tx }, ctx);

        let addr = ctx.address().recipient();

        tokio::spawn(async move {
            log::debug!("connection green thread - started");
            while let Some(msg) = rx.recv().await {
                if addr.try_send(ConnectionActorMessage(msg)).is_err() {
                    break;
                }
            }
            log::debug!("connection green thread - terminated");
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.notify_disconnect();
        Running::Stop
    }
}

/// Ingress
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let decoded = match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
                return;
            }
            Ok(ws::Message::Text(text)) => serde_json::from_str::<IdentifiableCommand>(&text),
            Ok(ws::Message::Binary(bin)) => serde_json::from_slice::<IdentifiableCommand>(&bin),
            Ok(ws::Message::Close(_)) => {
                self.notify_disconnect();
                ctx.stop();
                return;
            }
            Ok(_) => return,
            Err(err) => {
                log::warn!("Websocket protocol error: {}", err);
                self.notify_disconnect();
                ctx.stop();
                return;
            }
        };

        match decoded {
            Ok(command) => {
                if let ConnectionState::Connected(ref from) = self.state {
                    log::debug!("Ingress {:?}", command);
                    let from = from.clone();
                    self.forward(ConnectionCommand::IdentifiableCommand { from, command }, ctx);
                }
            }
            Err(err) => {
                log::warn!("Closing connection after undecodable frame: {}", err);
                ctx.close(Some(CloseReason {
                    code: CloseCode::Invalid,
                    description: Some(err.to_string()),
                }));
                self.notify_disconnect();
                ctx.stop();
            }
        }
    }
}

/// Egress
impl Handler<ConnectionActorMessage> for ConnectionActor {
    type Result = ();

    fn handle(
        &mut self,
        msg: ConnectionActorMessage,
        ctx: &mut ws::WebsocketContext<Self>,
    ) -> Self::Result {
        let event = match msg.0 {
            ConnectionEvent::Connected { connection_id } => {
                self.state = ConnectionState::Connected(connection_id.clone());
                IdentifiableEvent::BySystem {
                    system_event: SystemEvent::Connected { connection_id },
                }
            }
            ConnectionEvent::IdentifiableEvent(event) => event,
        };
        log::debug!("Egress {:?}", event);
        match serde_json::to_string(&event) {
            Ok(text) => ctx.text(text),
            Err(err) => log::warn!("Failed to encode event: {}", err),
        }
    }
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    srv_tx: web::Data<ServerTx>,
) -> Result<HttpResponse, Error> {
    ws::start(
        ConnectionActor {
            srv_tx: srv_tx.get_ref().clone(),
            state: ConnectionState::Idle,
        },
        &req,
        stream,
    )
}
