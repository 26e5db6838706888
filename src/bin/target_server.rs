use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use tokio::net::{TcpListener, TcpStream};

/// Local endpoint for trying out load runs: answers every request with a fixed status.
///
/// Usage: target_server [port] [status]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let port: u16 = args.next().and_then(|p| p.parse().ok()).unwrap_or(3000);
    let status = match args.next() {
        Some(code) => StatusCode::from_u16(code.parse()?)?,
        None => StatusCode::OK,
    };

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    println!("Target server listening on port {} answering {}", port, status);

    loop {
        let (socket, _) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = handle_client(socket, status).await {
                eprintln!("Error handling client: {}", e);
            }
        });
    }
}

async fn handle_client(socket: TcpStream, status: StatusCode) -> Result<(), hyper::Error> {
    let service = service_fn(move |request: Request<Incoming>| async move {
        let body = format!("{} {}\n", request.method(), request.uri());
        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;
        Ok::<_, Infallible>(response)
    });

    http1::Builder::new()
        .serve_connection(TokioIo::new(socket), service)
        .await
}
