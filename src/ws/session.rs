//! Registry of live connections for targeted delivery

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::protocol::ServerMsg;

/// Per-connection queue depth for direct messages
pub const DIRECT_QUEUE_DEPTH: usize = 64;

/// Why a direct message was not queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DirectSendError {
    #[error("no session registered")]
    UnknownSession,
    #[error("session queue is full")]
    Full,
    #[error("session is closing")]
    Closed,
}

/// Connection id -> direct message queue
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, mpsc::Sender<ServerMsg>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and hand back the receiving end of its queue
    pub fn register(&self, conn_id: Uuid) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(DIRECT_QUEUE_DEPTH);
        self.sessions.insert(conn_id, tx);
        rx
    }

    pub fn remove(&self, conn_id: &Uuid) {
        self.sessions.remove(conn_id);
    }

    /// Queue a message without waiting; the tick loop never blocks on a client
    pub fn send(&self, conn_id: Uuid, msg: ServerMsg) -> Result<(), DirectSendError> {
        let tx = self
            .sessions
            .get(&conn_id)
            .map(|entry| entry.value().clone())
            .ok_or(DirectSendError::UnknownSession)?;

        tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DirectSendError::Full,
            mpsc::error::TrySendError::Closed(_) => DirectSendError::Closed,
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(message: &str) -> ServerMsg {
        ServerMsg::ErrorMsg {
            message: message.to_string(),
        }
    }

    #[test]
    fn test_send_routes_to_registered_session() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let mut rx = registry.register(id);

        registry.send(id, error("hello")).unwrap();
        assert!(matches!(rx.try_recv(), Ok(ServerMsg::ErrorMsg { message }) if message == "hello"));

        assert_eq!(
            registry.send(Uuid::new_v4(), error("nobody")),
            Err(DirectSendError::UnknownSession)
        );
    }

    #[test]
    fn test_full_and_closed_queues() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let rx = registry.register(id);

        for _ in 0..DIRECT_QUEUE_DEPTH {
            registry.send(id, error("x")).unwrap();
        }
        assert_eq!(registry.send(id, error("x")), Err(DirectSendError::Full));

        drop(rx);
        assert_eq!(registry.send(id, error("x")), Err(DirectSendError::Closed));

        registry.remove(&id);
        assert!(registry.is_empty());
    }
}
