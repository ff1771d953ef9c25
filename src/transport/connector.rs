//! # Notification Connector
//!
//! The database side of the transport. [`PgConnector`] wraps sqlx's
//! `PgListener`; tests plug in an in-process connector.

use async_trait::async_trait;
use sqlx::postgres::PgListener;

use super::errors::{TransportError, TransportResult};

/// One received notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub payload: String,
}

/// Opens notification connections
#[async_trait]
pub trait NotificationConnector: Send + Sync {
    /// Open a fresh connection with no channel subscribed
    async fn connect(&self) -> TransportResult<Box<dyn NotificationStream>>;
}

/// A live notification connection
#[async_trait]
pub trait NotificationStream: Send {
    /// Subscribe the connection to `channel`
    async fn listen(&mut self, channel: &str) -> TransportResult<()>;

    /// Wait for the next notification. A dropped connection is an error.
    async fn recv(&mut self) -> TransportResult<Notification>;

    /// Unsubscribe and release the connection
    async fn close(self: Box<Self>) -> TransportResult<()>;
}

/// Connector backed by a dedicated Postgres connection per stream
#[derive(Debug, Clone)]
pub struct PgConnector {
    database_url: String,
}

impl PgConnector {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl NotificationConnector for PgConnector {
    async fn connect(&self) -> TransportResult<Box<dyn NotificationStream>> {
        let listener = PgListener::connect(&self.database_url).await?;
        Ok(Box::new(PgStream { listener }))
    }
}

struct PgStream {
    listener: PgListener,
}

#[async_trait]
impl NotificationStream for PgStream {
    async fn listen(&mut self, channel: &str) -> TransportResult<()> {
        self.listener.listen(channel).await?;
        Ok(())
    }

    async fn recv(&mut self) -> TransportResult<Notification> {
        // try_recv reports a lost connection instead of reconnecting behind
        // our back, so the state machine sees it
        match self.listener.try_recv().await? {
            Some(notification) => Ok(Notification {
                channel: notification.channel().to_string(),
                payload: notification.payload().to_string(),
            }),
            None => Err(TransportError::ConnectionLost),
        }
    }

    async fn close(mut self: Box<Self>) -> TransportResult<()> {
        self.listener.unlisten_all().await?;
        Ok(())
    }
}
