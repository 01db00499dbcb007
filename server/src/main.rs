use actix_cors::Cors;
use actix_web::{App, HttpServer};
use structopt::StructOpt;

use poll_server::handlers;
use poll_server::options::Options;
use poll_server::server::spawn_server;
use poll_server::store::{FileStore, MemoryStore};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let options = Options::from_args();
    let srv_tx = match &options.data_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await?;
            log::info!("Storing sessions in {}", dir.display());
            spawn_server(FileStore::new(dir), options.channel_capacity)
        }
        None => {
            log::info!("Storing sessions in memory");
            spawn_server(MemoryStore::new(), options.channel_capacity)
        }
    };

    log::info!("Listening on {}", options.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .data(srv_tx.clone())
            .configure(handlers::root)
    })
    .bind(&options.bind)?
    .run()
    .await
}
