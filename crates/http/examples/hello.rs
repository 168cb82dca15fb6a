use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use lean_http::config::ConnectionConfig;
use lean_http::connection::HttpConnection;
use lean_http::handler::make_handler;
use lean_http::pool::BufferPool;
use lean_http::protocol::body::ReqBody;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

async fn hello(req: Request<ReqBody>) -> Result<Response<Full<Bytes>>, Infallible> {
    let greeting = format!("hello from {}\n", req.uri().path());
    Ok(Response::new(Full::new(Bytes::from(greeting))))
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(listener) => listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };
    info!("listening at 127.0.0.1:8080");

    let pool = Arc::new(BufferPool::default());
    let config = ConnectionConfig::new().send_server_version(true);
    let handler = Arc::new(make_handler(hello));

    loop {
        let (stream, _remote_addr) = match listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let connection = HttpConnection::with_config(stream, config.clone(), pool.clone());
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.process(handler).await {
                error!("connection ended with error, cause: {}", e);
            }
        });
    }
}
