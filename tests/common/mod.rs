#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use switchboard::auth::{InMemoryUserDirectory, NewUser, Role, UserDirectory};
use switchboard::handlers;
use switchboard::registry::{CommandHandler, CommandRegistry};
use switchboard::server::{Listener, ListenerConfig, ListenerStats};
use switchboard::session::SessionStore;
use switchboard::shutdown::Shutdown;

pub struct TestServer {
    pub addr: SocketAddr,
    pub sessions: Arc<SessionStore>,
    pub registry: Arc<CommandRegistry>,
    pub stats: Arc<ListenerStats>,
    pub shutdown: Shutdown,
    pub task: tokio::task::JoinHandle<switchboard::Result<()>>,
}

impl TestServer {
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("listener did not stop")
            .expect("listener task panicked")
            .expect("listener failed");
    }
}

pub async fn directory_with_user() -> Arc<InMemoryUserDirectory> {
    let directory = Arc::new(InMemoryUserDirectory::new());
    directory
        .create(NewUser {
            name: "Helena".to_string(),
            email: "helena@example.com".to_string(),
            password: "correct horse".to_string(),
            role: Role::User,
        })
        .await
        .unwrap();
    directory
}

pub async fn start_server(
    worker_count: usize,
    extra: Vec<Arc<dyn CommandHandler>>,
) -> TestServer {
    let directory = directory_with_user().await;
    let mut builder = CommandRegistry::builder();
    for handler in handlers::default_handlers(directory).into_iter().chain(extra) {
        builder = builder.register(handler).unwrap();
    }
    let registry = Arc::new(builder.build());
    let sessions = Arc::new(SessionStore::default());

    let config = ListenerConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        worker_count,
        ..Default::default()
    };
    let listener = Listener::bind(config, Arc::clone(&registry), Arc::clone(&sessions))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let stats = listener.stats();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(listener.run(shutdown.signal()));

    TestServer {
        addr,
        sessions,
        registry,
        stats,
        shutdown,
        task,
    }
}
