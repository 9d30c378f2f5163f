//! Control Channel
//!
//! Host code talks to a running agent through typed messages. Each message
//! carries a oneshot sender for its reply, so the caller awaits exactly the
//! answer to its own message.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::CacheAgent;
use crate::error::{AgentError, Result};
use crate::models::{ControlMessage, ControlReply};

struct Envelope {
    message: ControlMessage,
    reply: oneshot::Sender<ControlReply>,
}

/// Cloneable sending side of the control channel.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<Envelope>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl ControlHandle {
    /// Sends one message and waits for the agent's reply.
    pub async fn send(&self, message: ControlMessage) -> Result<ControlReply> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { message, reply })
            .await
            .map_err(|_| AgentError::ChannelClosed)?;
        rx.await.map_err(|_| AgentError::ChannelClosed)
    }
}

/// Spawns the task that serves control messages for `agent`.
///
/// The task ends once every [`ControlHandle`] has been dropped.
pub fn spawn_control_channel(
    agent: Arc<CacheAgent>,
    capacity: usize,
) -> (ControlHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Envelope>(capacity.max(1));

    let handle = tokio::spawn(async move {
        info!("Control channel started");
        while let Some(Envelope { message, reply }) = rx.recv().await {
            debug!(?message, "Control message received");
            let answer = agent.handle_message(message);
            // The caller may have given up waiting
            let _ = reply.send(answer);
        }
        info!("Control channel closed");
    });

    (ControlHandle { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::error::NetworkError;
    use crate::fetch::{FetchRequest, FetchResponse, Fetcher};
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl Fetcher for Offline {
        async fn send(
            &self,
            _request: &FetchRequest,
        ) -> std::result::Result<FetchResponse, NetworkError> {
            Err(NetworkError::Connection("offline".to_string()))
        }
    }

    fn agent() -> Arc<CacheAgent> {
        let config = Config {
            precache_urls: Vec::new(),
            ..Config::default()
        };
        Arc::new(CacheAgent::new(&config, Arc::new(Offline), Arc::new(ManualClock::new(0))).unwrap())
    }

    #[tokio::test]
    async fn test_get_stats_round_trip() {
        let (control, _task) = spawn_control_channel(agent(), 8);
        let reply = control.send(ControlMessage::GetStats).await.unwrap();
        match reply {
            ControlReply::Stats(stats) => assert_eq!(stats.hits, 0),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_after_task_stops_is_channel_closed() {
        let (control, task) = spawn_control_channel(agent(), 8);
        task.abort();
        let _ = task.await;

        let err = control.send(ControlMessage::ClearCache).await.unwrap_err();
        assert!(matches!(err, AgentError::ChannelClosed));
    }
}
