use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use courier_fabric::codec::{IdentityCompressor, JsonSerializer};
use courier_fabric::{
    service, CallContext, CallOptions, Client, Error, PoolConfig, Reply, Server,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetByIdReq {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetByIdResp {
    pub msg: String,
}

service! {
    /// User lookups
    pub trait UserService, client UserClient, name "user-service" {
        fn get_by_id(GetByIdReq) -> GetByIdResp as "GetById";
    }
}

/// What the server saw for one call
#[derive(Debug)]
struct Seen {
    id: i64,
    deadline: Option<SystemTime>,
    oneway: bool,
}

#[derive(Clone, Copy)]
enum Answer {
    Value,
    Error,
    ValueAndError,
}

struct MockUsers {
    answer: Answer,
    delay: Duration,
    seen: mpsc::UnboundedSender<Seen>,
}

#[courier_fabric::async_trait]
impl UserService for MockUsers {
    async fn get_by_id(&self, ctx: &CallContext, req: GetByIdReq) -> Reply<GetByIdResp> {
        let _ = self.seen.send(Seen {
            id: req.id,
            deadline: ctx.deadline(),
            oneway: ctx.is_oneway(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let resp = GetByIdResp {
            msg: "hello, world".to_string(),
        };
        match self.answer {
            Answer::Value => Reply::ok(resp),
            Answer::Error => Reply::err(Error::custom("mock error")),
            Answer::ValueAndError => Reply::partial(resp, Error::custom("mock error")),
        }
    }
}

struct Running {
    addr: SocketAddr,
    seen: mpsc::UnboundedReceiver<Seen>,
    _shutdown: oneshot::Sender<()>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn start(answer: Answer, delay: Duration) -> Running {
    init_tracing();
    let (tx, seen) = mpsc::unbounded_channel();
    let users = Arc::new(MockUsers {
        answer,
        delay,
        seen: tx,
    });

    let server = Server::builder()
        .service(users.into_registration())
        .serializer(JsonSerializer)
        .compressor(IdentityCompressor)
        .bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let (shutdown, signal) = oneshot::channel::<()>();
    tokio::spawn(server.serve_with_shutdown(async {
        let _ = signal.await;
    }));

    Running {
        addr,
        seen,
        _shutdown: shutdown,
    }
}

async fn user_client(addr: SocketAddr) -> (Client, UserClient) {
    let client = Client::connect(addr).await.unwrap();
    let users = client.init_service::<UserClient>().unwrap();
    (client, users)
}

async fn wait_for_idle(client: &Client) {
    for _ in 0..100 {
        if client.pool().in_use() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} connections still borrowed", client.pool().in_use());
}

#[tokio::test]
async fn call_without_error() {
    let running = start(Answer::Value, Duration::ZERO).await;
    let (client, users) = user_client(running.addr).await;

    let reply = users
        .get_by_id(&CallContext::background(), &GetByIdReq { id: 123 })
        .await;

    assert!(reply.error.is_none());
    assert_eq!(
        reply.value,
        Some(GetByIdResp {
            msg: "hello, world".to_string()
        })
    );
    assert_eq!(client.pool().in_use(), 0);
}

#[tokio::test]
async fn call_with_error_only() {
    let running = start(Answer::Error, Duration::ZERO).await;
    let (_client, users) = user_client(running.addr).await;

    let reply = users
        .get_by_id(&CallContext::background(), &GetByIdReq { id: 123 })
        .await;

    assert!(reply.value.is_none());
    let err = reply.error.expect("remote error expected");
    assert!(matches!(err, Error::Remote(_)));
    assert_eq!(err.to_string(), "mock error");
}

#[tokio::test]
async fn call_returns_value_and_error() {
    let running = start(Answer::ValueAndError, Duration::ZERO).await;
    let (_client, users) = user_client(running.addr).await;

    let reply = users
        .get_by_id(&CallContext::background(), &GetByIdReq { id: 123 })
        .await;

    assert_eq!(reply.value.as_ref().map(|r| r.msg.as_str()), Some("hello, world"));
    assert_eq!(reply.error.as_ref().map(ToString::to_string).as_deref(), Some("mock error"));
}

#[tokio::test]
async fn oneway_call_still_runs_on_server() {
    let mut running = start(Answer::Value, Duration::ZERO).await;
    let (client, users) = user_client(running.addr).await;

    let reply = users
        .get_by_id(&CallContext::oneway(), &GetByIdReq { id: 7 })
        .await;
    assert!(matches!(reply.error, Some(Error::Oneway)));
    assert!(reply.value.is_none());

    let seen = tokio::time::timeout(Duration::from_secs(2), running.seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen.id, 7);
    assert!(seen.oneway);

    // No response was written, so the reused connection is clean
    let reply = users
        .get_by_id(&CallContext::background(), &GetByIdReq { id: 8 })
        .await;
    assert_eq!(reply.into_result().unwrap().unwrap().msg, "hello, world");
    assert_eq!(client.pool().in_use(), 0);
}

#[tokio::test]
async fn timeout_returns_early_and_server_finishes() {
    let mut running = start(Answer::Value, Duration::from_millis(300)).await;
    let (client, users) = user_client(running.addr).await;

    let started = std::time::Instant::now();
    let reply = users
        .get_by_id(
            &CallContext::with_timeout(Duration::from_millis(50)),
            &GetByIdReq { id: 1 },
        )
        .await;
    assert!(matches!(reply.error, Some(Error::DeadlineExceeded)));
    assert!(started.elapsed() < Duration::from_millis(300));

    // Server got the deadline and kept working
    let seen = running.seen.recv().await.unwrap();
    assert_eq!(seen.id, 1);
    assert!(seen.deadline.is_some());
    assert!(!seen.oneway);

    // The late response is drained and the connection handed back
    wait_for_idle(&client).await;

    let reply = users
        .get_by_id(
            &CallContext::with_timeout(Duration::from_secs(5)),
            &GetByIdReq { id: 2 },
        )
        .await;
    assert_eq!(reply.into_result().unwrap().unwrap().msg, "hello, world");
}

#[tokio::test]
async fn expired_deadline_sends_nothing() {
    let mut running = start(Answer::Value, Duration::ZERO).await;
    let (client, users) = user_client(running.addr).await;
    let opened = client.pool().opened();

    let ctx = CallContext::new(
        CallOptions::new().deadline(SystemTime::now() - Duration::from_secs(1)),
    );
    let reply = users.get_by_id(&ctx, &GetByIdReq { id: 1 }).await;

    assert!(matches!(reply.error, Some(Error::DeadlineExceeded)));
    assert_eq!(client.pool().opened(), opened);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), running.seen.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn unknown_service_and_method() {
    let running = start(Answer::Value, Duration::ZERO).await;
    let (client, _users) = user_client(running.addr).await;
    let ctx = CallContext::background();

    let reply: Reply<GetByIdResp> = client
        .call(&ctx, "order-service", "GetById", &GetByIdReq { id: 1 })
        .await;
    assert_eq!(
        reply.error.unwrap().to_string(),
        "Service not found: order-service"
    );

    let reply: Reply<GetByIdResp> = client
        .call(&ctx, "user-service", "Delete", &GetByIdReq { id: 1 })
        .await;
    assert_eq!(
        reply.error.unwrap().to_string(),
        "Method not found: user-service.Delete"
    );

    // Dispatch errors leave the connection usable
    assert_eq!(client.pool().in_use(), 0);
    assert_eq!(client.pool().idle_count(), 1);
}

#[tokio::test]
async fn json_and_identity_codecs() {
    let running = start(Answer::Value, Duration::ZERO).await;
    let client = Client::builder()
        .address(running.addr)
        .serializer(JsonSerializer)
        .compressor(IdentityCompressor)
        .connect()
        .await
        .unwrap();
    let users: UserClient = client.init_service().unwrap();

    let reply = users
        .get_by_id(&CallContext::background(), &GetByIdReq { id: 5 })
        .await;
    assert_eq!(reply.into_result().unwrap().unwrap().msg, "hello, world");
}

#[tokio::test]
async fn server_rejects_unregistered_codec() {
    init_tracing();
    let (tx, _seen) = mpsc::unbounded_channel();
    let users = Arc::new(MockUsers {
        answer: Answer::Value,
        delay: Duration::ZERO,
        seen: tx,
    });
    // Defaults only: no JSON
    let server = Server::builder()
        .service(users.into_registration())
        .bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());

    // zstd is understood, JSON is not
    let client = Client::builder()
        .address(addr)
        .serializer(JsonSerializer)
        .connect()
        .await
        .unwrap();
    let users: UserClient = client.init_service().unwrap();

    let reply = users
        .get_by_id(&CallContext::background(), &GetByIdReq { id: 5 })
        .await;
    assert!(reply.value.is_none());
    assert_eq!(
        reply.error.unwrap().to_string(),
        "Unsupported serializer code: 2"
    );
}

#[tokio::test]
async fn concurrent_calls_share_the_pool() {
    let running = start(Answer::Value, Duration::from_millis(20)).await;
    let client = Client::builder()
        .address(running.addr)
        .pool(PoolConfig {
            max_open: 4,
            ..PoolConfig::default()
        })
        .connect()
        .await
        .unwrap();
    let users: UserClient = client.init_service().unwrap();

    let mut tasks = Vec::new();
    for id in 0..16 {
        let users = users.clone();
        tasks.push(tokio::spawn(async move {
            users
                .get_by_id(
                    &CallContext::with_timeout(Duration::from_secs(10)),
                    &GetByIdReq { id },
                )
                .await
        }));
    }
    for task in tasks {
        let reply = task.await.unwrap();
        assert_eq!(reply.into_result().unwrap().unwrap().msg, "hello, world");
    }

    assert_eq!(client.pool().in_use(), 0);
    assert!(client.pool().opened() <= 4);
    assert!(client.pool().idle_count() <= 4);
}

#[tokio::test]
async fn broken_connection_does_not_stop_server() {
    let running = start(Answer::Value, Duration::ZERO).await;

    // Claims a header it never sends, then hangs up
    let mut raw = tokio::net::TcpStream::connect(running.addr).await.unwrap();
    raw.write_u32(64).await.unwrap();
    raw.write_u32(0).await.unwrap();
    raw.write_all(b"short").await.unwrap();
    raw.shutdown().await.unwrap();
    drop(raw);

    let (_client, users) = user_client(running.addr).await;
    let reply = users
        .get_by_id(&CallContext::background(), &GetByIdReq { id: 9 })
        .await;
    assert_eq!(reply.into_result().unwrap().unwrap().msg, "hello, world");
}

#[tokio::test]
async fn call_timed_out_in_pool_queue_is_never_sent() {
    let mut running = start(Answer::Value, Duration::from_millis(300)).await;
    let client = Client::builder()
        .address(running.addr)
        .pool(PoolConfig {
            max_open: 1,
            ..PoolConfig::default()
        })
        .connect()
        .await
        .unwrap();
    let users: UserClient = client.init_service().unwrap();

    // First call holds the only connection while the server sleeps
    let first = {
        let users = users.clone();
        tokio::spawn(async move {
            users
                .get_by_id(
                    &CallContext::with_timeout(Duration::from_secs(5)),
                    &GetByIdReq { id: 1 },
                )
                .await
        })
    };
    let seen = running.seen.recv().await.unwrap();
    assert_eq!(seen.id, 1);

    let reply = users
        .get_by_id(
            &CallContext::with_timeout(Duration::from_millis(50)),
            &GetByIdReq { id: 2 },
        )
        .await;
    assert!(matches!(reply.error, Some(Error::DeadlineExceeded)));

    let first = first.await.unwrap();
    assert_eq!(first.into_result().unwrap().unwrap().msg, "hello, world");

    // The queued request gave up without touching the wire
    assert!(
        tokio::time::timeout(Duration::from_millis(300), running.seen.recv())
            .await
            .is_err()
    );
    wait_for_idle(&client).await;
    assert_eq!(client.pool().opened(), 1);
}
