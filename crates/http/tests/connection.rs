//! End-to-end connection tests over an in-memory duplex transport.
//!
//! The connection runs on one side of `tokio::io::duplex` and the test plays
//! the client on the other, writing raw request bytes and asserting the raw
//! response bytes. Driving both with `join!` keeps each test on a single
//! task and makes byte ordering deterministic.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use http_body::Frame;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use lean_http::config::ConnectionConfig;
use lean_http::connection::{upgrade, HttpConnection};
use lean_http::handler::{make_handler, HandlerFn};
use lean_http::pool::BufferPool;
use lean_http::protocol::body::ReqBody;
use lean_http::protocol::HttpError;

fn shared_pool() -> Arc<BufferPool> {
    Arc::new(BufferPool::default())
}

fn connection(server: DuplexStream, pool: Arc<BufferPool>) -> HttpConnection<DuplexStream> {
    HttpConnection::with_config(server, ConnectionConfig::default(), pool)
}

async fn read_exact_string(client: &mut DuplexStream, len: usize) -> String {
    let mut buf = vec![0u8; len];
    client.read_exact(&mut buf).await.expect("read response bytes");
    String::from_utf8(buf).expect("utf8 response")
}

async fn hi(_req: Request<ReqBody>) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(Response::new(Full::new(Bytes::from_static(b"hi"))))
}

async fn echo_path(req: Request<ReqBody>) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_owned();
    Ok(Response::new(Full::new(Bytes::from(path))))
}

async fn echo_body(req: Request<ReqBody>) -> Result<Response<Full<Bytes>>, Infallible> {
    let collected = req.into_body().collect().await.expect("collect request body");
    Ok(Response::new(Full::new(collected.to_bytes())))
}

#[tokio::test]
async fn simple_get_keeps_the_connection_open() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let expected = "HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nhi";

    let client_fut = async move {
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        let first = read_exact_string(&mut client, expected.len()).await;

        // the connection is still there for a second request
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        let second = read_exact_string(&mut client, expected.len()).await;
        (first, second)
    };

    let (server_result, (first, second)) = tokio::join!(conn.process(Arc::new(make_handler(hi))), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(first, expected);
    assert_eq!(second, expected);
}

#[tokio::test]
async fn http10_keep_alive_is_announced() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let expected = "HTTP/1.0 200 OK\r\nconnection: keep-alive\r\ncontent-length: 2\r\n\r\nhi";

    let client_fut = async move {
        client.write_all(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n").await.unwrap();
        let first = read_exact_string(&mut client, expected.len()).await;

        client.write_all(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n").await.unwrap();
        let second = read_exact_string(&mut client, expected.len()).await;
        (first, second)
    };

    let (server_result, (first, second)) = tokio::join!(conn.process(Arc::new(make_handler(hi))), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(first, expected);
    assert_eq!(second, expected);
}

#[tokio::test]
async fn http10_without_keep_alive_closes() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let client_fut = async move {
        client.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
        let mut all = String::new();
        client.read_to_string(&mut all).await.unwrap();
        all
    };

    let (server_result, all) = tokio::join!(conn.process(Arc::new(make_handler(hi))), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(all, "HTTP/1.0 200 OK\r\ncontent-length: 2\r\n\r\nhi");
}

#[tokio::test]
async fn http11_connection_close_is_honored() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let client_fut = async move {
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await.unwrap();
        // the server shuts its output down after the response, so reading to
        // the end terminates without the client closing anything
        let mut all = String::new();
        client.read_to_string(&mut all).await.unwrap();
        all
    };

    let (server_result, all) = tokio::join!(conn.process(Arc::new(make_handler(hi))), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(all, "HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-length: 2\r\n\r\nhi");
}

#[tokio::test]
async fn pipelined_requests_are_answered_in_order() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let client_fut = async move {
        client
            .write_all(b"GET /one HTTP/1.1\r\nHost: x\r\n\r\nGET /two HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        client.shutdown().await.unwrap();
        let mut all = String::new();
        client.read_to_string(&mut all).await.unwrap();
        all
    };

    let (server_result, all) = tokio::join!(conn.process(Arc::new(make_handler(echo_path))), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(
        all,
        "HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\n/one\
         HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\n/two"
    );
}

#[tokio::test]
async fn expectation_failed_without_reading_body_closes_the_connection() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let refuse = make_handler(|_req: Request<ReqBody>| async {
        Ok::<_, Infallible>(
            Response::builder().status(StatusCode::EXPECTATION_FAILED).body(Empty::<Bytes>::new()).unwrap(),
        )
    });

    let client_fut = async move {
        client
            .write_all(b"POST / HTTP/1.1\r\nHost: x\r\nExpect: 100-continue\r\nContent-Length: 10\r\n\r\n")
            .await
            .unwrap();
        let mut all = String::new();
        // no body is ever sent; the connection must close after the 417
        client.read_to_string(&mut all).await.unwrap();
        all
    };

    let (server_result, all) = tokio::join!(conn.process(Arc::new(refuse)), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(all, "HTTP/1.1 417 Expectation Failed\r\ncontent-length: 0\r\n\r\n");
}

#[tokio::test]
async fn continue_is_sent_when_the_handler_reads_the_body() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let interim = "HTTP/1.1 100 Continue\r\n\r\n";
    let expected = "HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nhelloworld";

    let client_fut = async move {
        client
            .write_all(b"POST / HTTP/1.1\r\nHost: x\r\nExpect: 100-continue\r\nContent-Length: 10\r\n\r\n")
            .await
            .unwrap();
        let interim_line = read_exact_string(&mut client, interim.len()).await;
        client.write_all(b"helloworld").await.unwrap();
        let response = read_exact_string(&mut client, expected.len()).await;
        (interim_line, response)
    };

    let (server_result, (interim_line, response)) =
        tokio::join!(conn.process(Arc::new(make_handler(echo_body))), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(interim_line, interim);
    assert_eq!(response, expected);
}

#[tokio::test]
async fn upgrade_hands_the_transport_to_the_new_protocol() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let switching = make_handler(|mut req: Request<ReqBody>| async move {
        let on_upgrade = upgrade::on(&mut req);
        tokio::spawn(async move {
            let mut upgraded = on_upgrade.await.expect("upgrade completes");
            let mut buf = [0u8; 4];
            upgraded.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");
            upgraded.write_all(b"pong").await.unwrap();
        });
        Ok::<_, Infallible>(
            Response::builder()
                .status(StatusCode::SWITCHING_PROTOCOLS)
                .header("upgrade", "echo")
                .body(Empty::<Bytes>::new())
                .unwrap(),
        )
    });

    let expected_head = "HTTP/1.1 101 Switching Protocols\r\nupgrade: echo\r\n\r\n";

    let client_fut = async move {
        // "ping" rides in the same segment as the request: the new protocol
        // must see it through the leftover buffer
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: upgrade\r\nUpgrade: echo\r\n\r\nping")
            .await
            .unwrap();
        let head = read_exact_string(&mut client, expected_head.len()).await;
        let pong = read_exact_string(&mut client, 4).await;
        (head, pong)
    };

    let (server_result, (head, pong)) = tokio::join!(conn.process(Arc::new(switching)), client_fut);

    server_result.expect("upgrade handoff is a clean exit");
    assert_eq!(head, expected_head);
    assert_eq!(pong, "pong");
}

#[tokio::test]
async fn request_split_into_tiny_pieces_still_parses() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let wire = b"POST /up HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello";
    let expected = "HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello";

    let client_fut = async move {
        for byte in wire.iter() {
            client.write_all(&[*byte]).await.unwrap();
            tokio::task::yield_now().await;
        }
        read_exact_string(&mut client, expected.len()).await
    };

    let (server_result, response) = tokio::join!(conn.process(Arc::new(make_handler(echo_body))), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(response, expected);
}

#[tokio::test]
async fn head_response_has_get_headers_and_no_body() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let hello = make_handler(|_req: Request<ReqBody>| async {
        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(b"hello world"))))
    });

    let header_block = "HTTP/1.1 200 OK\r\ncontent-length: 11\r\n\r\n";

    let client_fut = async move {
        // HEAD first, then a pipelined GET: anything between the HEAD's
        // header block and the next status line would be a stray body
        client
            .write_all(b"HEAD / HTTP/1.1\r\nHost: x\r\n\r\nGET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        client.shutdown().await.unwrap();
        let mut all = String::new();
        client.read_to_string(&mut all).await.unwrap();
        all
    };

    let (server_result, all) = tokio::join!(conn.process(Arc::new(hello)), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(all, format!("{header_block}{header_block}hello world"));
}

#[tokio::test]
async fn unread_body_is_drained_before_the_next_request() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    // echo_path never touches the body, so the driver has to consume the
    // leftover "ld" itself before /two can be parsed
    let client_fut = async move {
        client.write_all(b"POST /one HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nwor").await.unwrap();
        tokio::task::yield_now().await;
        client.write_all(b"ldGET /two HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();
        let mut all = String::new();
        client.read_to_string(&mut all).await.unwrap();
        all
    };

    let (server_result, all) = tokio::join!(conn.process(Arc::new(make_handler(echo_path))), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(
        all,
        "HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\n/one\
         HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\n/two"
    );
}

#[tokio::test]
async fn chunked_request_body_is_reassembled() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let expected = "HTTP/1.1 200 OK\r\ncontent-length: 11\r\n\r\nhello world";

    let client_fut = async move {
        client
            .write_all(b"POST /up HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n")
            .await
            .unwrap();
        tokio::task::yield_now().await;
        client.write_all(b"6\r\n world\r\n0\r\n\r\n").await.unwrap();
        read_exact_string(&mut client, expected.len()).await
    };

    let (server_result, response) = tokio::join!(conn.process(Arc::new(make_handler(echo_body))), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(response, expected);
}

#[tokio::test]
async fn unsized_response_body_goes_out_chunked() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let streaming = make_handler(|_req: Request<ReqBody>| async {
        let frames = futures::stream::iter(vec![
            Ok::<_, Infallible>(Frame::data(Bytes::from_static(b"hello"))),
            Ok(Frame::data(Bytes::from_static(b" world"))),
        ]);
        Ok::<_, Infallible>(Response::new(StreamBody::new(frames)))
    });

    let client_fut = async move {
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();
        let mut all = String::new();
        client.read_to_string(&mut all).await.unwrap();
        all
    };

    let (server_result, all) = tokio::join!(conn.process(Arc::new(streaming)), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(
        all,
        "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n"
    );
}

#[tokio::test]
async fn http09_simple_request_gets_a_bare_body() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let client_fut = async move {
        client.write_all(b"GET /\r\n").await.unwrap();
        let mut all = String::new();
        client.read_to_string(&mut all).await.unwrap();
        all
    };

    let (server_result, all) = tokio::join!(conn.process(Arc::new(make_handler(hi))), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(all, "hi");
}

#[tokio::test]
async fn malformed_request_gets_a_400_and_the_connection_closes() {
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, shared_pool());

    let client_fut = async move {
        client.write_all(b"GET / HTTP/9.9\r\n\r\n").await.unwrap();
        let mut all = String::new();
        client.read_to_string(&mut all).await.unwrap();
        all
    };

    let (server_result, all) = tokio::join!(conn.process(Arc::new(make_handler(hi))), client_fut);

    assert!(matches!(server_result, Err(HttpError::RequestError { .. })));
    assert_eq!(all, "HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\n\r\n");
}

#[tokio::test]
async fn buffers_go_back_to_the_pool_after_each_cycle() {
    let pool = shared_pool();
    let (mut client, server) = tokio::io::duplex(4096);
    let conn = connection(server, pool.clone());

    let client_fut = async move {
        for _ in 0..3 {
            client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
            let _ = read_exact_string(&mut client, "HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nhi".len()).await;
        }
    };

    let (server_result, ()) = tokio::join!(conn.process(Arc::new(make_handler(hi))), client_fut);

    server_result.expect("clean shutdown");
    assert_eq!(pool.acquired(), pool.released());
}

#[tokio::test]
async fn final_content_with_spare_capacity_lends_its_tail_to_the_header() {
    async fn run(body_fn: fn() -> Bytes) -> usize {
        let pool = shared_pool();
        let (mut client, server) = tokio::io::duplex(4096);
        let conn = HttpConnection::with_config(server, ConnectionConfig::default(), pool.clone());

        let handler: HandlerFn<_> = make_handler(move |_req: Request<ReqBody>| async move {
            Ok::<_, Infallible>(Response::new(Full::new(body_fn())))
        });

        let client_fut = async move {
            client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
            client.shutdown().await.unwrap();
            let mut all = String::new();
            client.read_to_string(&mut all).await.unwrap();
            all
        };

        let (server_result, all) = tokio::join!(conn.process(Arc::new(handler)), client_fut);
        server_result.expect("clean shutdown");
        assert_eq!(all, "HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nhi");

        assert_eq!(pool.acquired(), pool.released());
        pool.acquired()
    }

    // uniquely owned, plenty of spare tail capacity: the header is carved
    // from it instead of the pool
    let with_spare = run(|| {
        let mut content = BytesMut::with_capacity(8 * 1024);
        content.extend_from_slice(b"hi");
        content.freeze()
    })
    .await;

    // static content cannot lend anything, so the header comes from the pool
    let without_spare = run(|| Bytes::from_static(b"hi")).await;

    assert_eq!(with_spare + 1, without_spare);
}
