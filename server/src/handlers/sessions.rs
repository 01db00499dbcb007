use crate::query::QueryCommand;
use crate::server::{ServerCommand, ServerTx};
use crate::store::StoreError;
use actix_web::error;
use actix_web::web::{self, HttpResponse};
use actix_web::Result;
use poll_system::serde_json::json;
use poll_system::{validate_session_id, SessionId};
use tokio::sync::oneshot;

pub fn configure_session_handlers(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/sessions").route(web::get().to(list_sessions)))
        .service(web::resource("/sessions/{session_id}").route(web::get().to(show_session)));
}

fn store_error(err: StoreError) -> error::Error {
    match err {
        StoreError::InvalidKey(_) => error::ErrorBadRequest(err.to_string()),
        err => {
            log::warn!("Query failed: {}", err);
            error::ErrorServiceUnavailable("Store unavailable")
        }
    }
}

async fn query(srv_tx: &web::Data<ServerTx>, command: QueryCommand) -> Result<()> {
    srv_tx
        .get_ref()
        .clone()
        .send(ServerCommand::QueryCommand(command))
        .await
        .map_err(|_| error::ErrorInternalServerError("Internal Server Error"))
}

async fn list_sessions(srv_tx: web::Data<ServerTx>) -> Result<HttpResponse> {
    let (tx, rx) = oneshot::channel();
    query(&srv_tx, QueryCommand::ListSessions { tx }).await?;

    let session_ids = rx
        .await
        .map_err(|_| error::ErrorInternalServerError("Receiver await error"))?
        .map_err(store_error)?;
    Ok(HttpResponse::Ok().json(json!(session_ids)))
}

async fn show_session(
    path: web::Path<SessionId>,
    srv_tx: web::Data<ServerTx>,
) -> Result<HttpResponse> {
    let (tx, rx) = oneshot::channel();
    let session_id = path.into_inner();
    validate_session_id(&session_id).map_err(error::ErrorBadRequest)?;
    query(&srv_tx, QueryCommand::GetSession { session_id, tx }).await?;

    let session = rx
        .await
        .map_err(|_| error::ErrorInternalServerError("Receiver await error"))?
        .map_err(store_error)?;
    match session {
        Some(session) => Ok(HttpResponse::Ok().json(session)),
        None => Ok(HttpResponse::NotFound().finish()),
    }
}
