//! Log/event fan-out
//!
//! Captured output lines are persisted and forwarded to the live connections
//! subscribed to the emitting application. Each application has its own topic
//! lock under which publishing, history replay and subscription happen, so a
//! new subscriber sees every entry exactly once: either in the replay or live.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::PlatformError;
use crate::models::log::{LogEntry, Severity};
use crate::store::logs::LogRepository;

/// Identifies one live connection (e.g. one websocket)
pub type ConnectionId = u64;

/// Receiving half handed to a connection; carries entries of every
/// application the connection is subscribed to
pub type LogReceiver = mpsc::UnboundedReceiver<LogEntry>;

type LogSender = mpsc::UnboundedSender<LogEntry>;

#[derive(Default)]
struct Topic {
    subscribers: HashMap<ConnectionId, LogSender>,
}

/// Distributes application output to storage and live subscribers
pub struct LogFanout {
    logs: LogRepository,
    replay_count: usize,
    seq: AtomicU64,
    next_connection: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, LogSender>>,
    topics: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Topic>>>>,
}

impl LogFanout {
    pub fn new(logs: LogRepository, replay_count: usize) -> Self {
        Self {
            logs,
            replay_count,
            seq: AtomicU64::new(0),
            next_connection: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn topic(&self, app_id: &str) -> Arc<tokio::sync::Mutex<Topic>> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.entry(app_id.to_string()).or_default().clone()
    }

    /// Persist one line and forward it to the application's subscribers
    pub async fn publish(
        &self,
        app_id: &str,
        level: Severity,
        message: impl Into<String>,
    ) -> Result<LogEntry, PlatformError> {
        let topic = self.topic(app_id);
        let mut topic = topic.lock().await;

        let entry = LogEntry {
            app_id: app_id.to_string(),
            timestamp: Utc::now(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            level,
            message: message.into(),
        };

        let persisted = self.logs.append(&entry).await;

        topic
            .subscribers
            .retain(|connection, tx| match tx.send(entry.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!(connection = connection, app_id = %app_id, "Dropping closed log subscriber");
                    false
                }
            });

        persisted?;
        Ok(entry)
    }

    /// Open a connection. Nothing is delivered until it subscribes.
    pub fn connect(&self) -> (ConnectionId, LogReceiver) {
        let id = self.next_connection.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.insert(id, tx);
        (id, rx)
    }

    /// Subscribe a connection to an application: replay the most recent
    /// entries oldest-first, then deliver live ones. Returns the number
    /// of replayed entries.
    pub async fn subscribe(&self, connection: ConnectionId, app_id: &str) -> Result<usize, PlatformError> {
        let tx = {
            let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
            connections
                .get(&connection)
                .cloned()
                .ok_or_else(|| PlatformError::NotFound(format!("Connection {}", connection)))?
        };

        let topic = self.topic(app_id);
        let mut topic = topic.lock().await;

        let mut history = self.logs.recent(app_id, self.replay_count).await?;
        history.reverse();
        let replayed = history.len();
        for entry in history {
            if tx.send(entry).is_err() {
                return Err(PlatformError::NotFound(format!("Connection {} closed", connection)));
            }
        }

        topic.subscribers.insert(connection, tx);
        debug!(connection = connection, app_id = %app_id, replayed = replayed, "Log subscriber attached");
        Ok(replayed)
    }

    /// Stop delivering an application's entries to a connection
    pub async fn unsubscribe(&self, connection: ConnectionId, app_id: &str) {
        let topic = self.topic(app_id);
        topic.lock().await.subscribers.remove(&connection);
    }

    /// Forget a connection and all its subscriptions
    pub async fn disconnect(&self, connection: ConnectionId) {
        {
            let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
            connections.remove(&connection);
        }

        let topics: Vec<_> = {
            let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
            topics.values().cloned().collect()
        };
        for topic in topics {
            topic.lock().await.subscribers.remove(&connection);
        }
    }

    /// Persisted entries of an application, newest first
    pub async fn recent(&self, app_id: &str, limit: usize) -> Result<Vec<LogEntry>, PlatformError> {
        self.logs.recent(app_id, limit).await
    }

    /// Drop an application's topic and stored entries
    pub async fn forget(&self, app_id: &str) {
        let removed = {
            let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
            topics.remove(app_id)
        };
        if let Some(topic) = removed {
            topic.lock().await.subscribers.clear();
        }
        if let Err(e) = self.logs.delete_all(app_id).await {
            warn!(app_id = %app_id, "Failed to delete logs: {}", e);
        }
    }

    /// Number of live subscribers of an application
    pub async fn subscriber_count(&self, app_id: &str) -> usize {
        let topic = self.topic(app_id);
        let count = topic.lock().await.subscribers.len();
        count
    }
}
