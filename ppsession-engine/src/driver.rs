//! Tokio driver: the single control context for a [`SessionManager`].
//!
//! The driver task owns the manager. Local operations, inbound stanzas and
//! transport notices arrive as [`Command`]s; posted self-messages are
//! delivered when due; every produced [`SessionEvent`] is forwarded on the
//! event channel.

use std::time::Instant;

use ppsession_core::{SessionDescription, SessionError, SessionResult, Stanza};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::manager::SessionManager;
use crate::signal::SessionEvent;
use crate::transport::TransportNotice;

type Reply<T> = oneshot::Sender<SessionResult<T>>;

/// Requests handled by the driver task.
#[derive(Debug)]
pub enum Command {
    CreateSession {
        remote_name: String,
        reply: oneshot::Sender<String>,
    },
    CreateChannel {
        sid: String,
        content_name: String,
        channel_name: String,
        reply: Reply<()>,
    },
    Initiate {
        sid: String,
        description: SessionDescription,
        reply: Reply<()>,
    },
    Accept {
        sid: String,
        description: SessionDescription,
        reply: Reply<()>,
    },
    Reject {
        sid: String,
        reason: String,
        reply: Reply<()>,
    },
    Terminate {
        sid: String,
        reason: String,
        reply: Reply<()>,
    },
    SendInfo {
        sid: String,
        payload: serde_json::Value,
        reply: Reply<()>,
    },
    SignalingReady {
        sid: String,
    },
    Stanza(Stanza),
    Transport {
        sid: String,
        content_name: String,
        notice: TransportNotice,
    },
}

/// Cloneable handle for sending commands to a running driver.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    commands: mpsc::Sender<Command>,
}

impl DriverHandle {
    async fn send(&self, command: Command) -> SessionResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Send("driver stopped".to_string()))
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> SessionResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await
            .map_err(|_| SessionError::Send("driver dropped reply".to_string()))?
    }

    pub async fn create_session(&self, remote_name: &str) -> SessionResult<String> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::CreateSession {
            remote_name: remote_name.to_string(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| SessionError::Send("driver dropped reply".to_string()))
    }

    pub async fn create_channel(
        &self,
        sid: &str,
        content_name: &str,
        channel_name: &str,
    ) -> SessionResult<()> {
        self.request(|reply| Command::CreateChannel {
            sid: sid.to_string(),
            content_name: content_name.to_string(),
            channel_name: channel_name.to_string(),
            reply,
        })
        .await
    }

    pub async fn initiate(&self, sid: &str, description: SessionDescription) -> SessionResult<()> {
        self.request(|reply| Command::Initiate {
            sid: sid.to_string(),
            description,
            reply,
        })
        .await
    }

    pub async fn accept(&self, sid: &str, description: SessionDescription) -> SessionResult<()> {
        self.request(|reply| Command::Accept {
            sid: sid.to_string(),
            description,
            reply,
        })
        .await
    }

    pub async fn reject(&self, sid: &str, reason: &str) -> SessionResult<()> {
        self.request(|reply| Command::Reject {
            sid: sid.to_string(),
            reason: reason.to_string(),
            reply,
        })
        .await
    }

    pub async fn terminate(&self, sid: &str, reason: &str) -> SessionResult<()> {
        self.request(|reply| Command::Terminate {
            sid: sid.to_string(),
            reason: reason.to_string(),
            reply,
        })
        .await
    }

    pub async fn send_info(&self, sid: &str, payload: serde_json::Value) -> SessionResult<()> {
        self.request(|reply| Command::SendInfo {
            sid: sid.to_string(),
            payload,
            reply,
        })
        .await
    }

    pub async fn signaling_ready(&self, sid: &str) -> SessionResult<()> {
        self.send(Command::SignalingReady {
            sid: sid.to_string(),
        })
        .await
    }

    /// Deliver a stanza received from the signaling channel.
    pub async fn deliver(&self, stanza: Stanza) -> SessionResult<()> {
        self.send(Command::Stanza(stanza)).await
    }

    /// Deliver a notice from a session's transport.
    pub async fn transport_notice(
        &self,
        sid: &str,
        content_name: &str,
        notice: TransportNotice,
    ) -> SessionResult<()> {
        self.send(Command::Transport {
            sid: sid.to_string(),
            content_name: content_name.to_string(),
            notice,
        })
        .await
    }
}

/// Spawn a driver for `manager`.
///
/// The task ends once every [`DriverHandle`] is dropped.
pub fn spawn(
    manager: SessionManager,
) -> (
    DriverHandle,
    mpsc::UnboundedReceiver<SessionEvent>,
    JoinHandle<()>,
) {
    let (command_tx, command_rx) = mpsc::channel(manager.config().command_capacity);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let driver = Driver {
        manager,
        commands: command_rx,
        events: event_tx,
    };
    let task = tokio::spawn(driver.run());
    (
        DriverHandle {
            commands: command_tx,
        },
        event_rx,
        task,
    )
}

struct Driver {
    manager: SessionManager,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            self.manager.process_messages(Instant::now());
            self.flush_events();

            let deadline = self.manager.next_deadline();
            let timer = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = timer => {}
            }
        }
        debug!("Driver stopped");
    }

    fn handle(&mut self, command: Command) {
        let manager = &mut self.manager;
        match command {
            Command::CreateSession { remote_name, reply } => {
                let sid = manager.create_session(&remote_name);
                let _ = reply.send(sid);
            }
            Command::CreateChannel {
                sid,
                content_name,
                channel_name,
                reply,
            } => {
                let result = manager.with_session(&sid, |s| {
                    s.create_channel(&content_name, &channel_name);
                    Ok(())
                });
                let _ = reply.send(result);
            }
            Command::Initiate {
                sid,
                description,
                reply,
            } => {
                let _ = reply.send(manager.with_session(&sid, |s| s.initiate(description)));
            }
            Command::Accept {
                sid,
                description,
                reply,
            } => {
                let _ = reply.send(manager.with_session(&sid, |s| s.accept(description)));
            }
            Command::Reject { sid, reason, reply } => {
                let _ = reply.send(manager.with_session(&sid, |s| s.reject(&reason)));
            }
            Command::Terminate { sid, reason, reply } => {
                let _ = reply
                    .send(manager.with_session(&sid, |s| s.terminate_with_reason(&reason)));
            }
            Command::SendInfo {
                sid,
                payload,
                reply,
            } => {
                let _ = reply.send(manager.with_session(&sid, |s| s.send_info_message(payload)));
            }
            Command::SignalingReady { sid } => {
                let result = manager.with_session(&sid, |s| {
                    s.on_signaling_ready();
                    Ok(())
                });
                if let Err(e) = result {
                    debug!("Signaling ready dropped: {}", e);
                }
            }
            Command::Stanza(stanza) => manager.on_stanza(&stanza),
            Command::Transport {
                sid,
                content_name,
                notice,
            } => {
                let result = manager.with_session(&sid, |s| {
                    s.on_transport_notice(&content_name, notice);
                    Ok(())
                });
                if let Err(e) = result {
                    debug!("Transport notice dropped: {}", e);
                }
            }
        }
    }

    fn flush_events(&mut self) {
        while let Some(event) = self.manager.poll_event() {
            if self.events.send(event).is_err() {
                debug!("Event receiver gone, discarding events");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use ppsession_core::SessionState;

    use crate::config::SessionConfig;
    use crate::memory::MemoryTransportFactory;
    use crate::session::tests::audio_video;
    use crate::signal::SessionSignal;

    async fn next_signal(
        events: &mut mpsc::UnboundedReceiver<SessionEvent>,
        wanted: impl Fn(&SessionSignal) -> bool,
    ) -> SessionSignal {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = events.recv().await.expect("driver stopped");
                if wanted(&event.signal) {
                    return event.signal;
                }
            }
        })
        .await
        .expect("signal not seen in time")
    }

    #[tokio::test]
    async fn local_operations_round_trip() {
        let factory = Arc::new(MemoryTransportFactory::new());
        let manager = SessionManager::new(SessionConfig::with_local_name("alice@example.net"), factory);
        let (handle, mut events, _task) = spawn(manager);

        let sid = handle.create_session("bob@example.net").await.unwrap();
        handle.initiate(&sid, audio_video()).await.unwrap();
        assert!(handle.accept(&sid, audio_video()).await.is_err());

        let signal = next_signal(&mut events, |s| matches!(s, SessionSignal::Outgoing(_))).await;
        assert!(matches!(signal, SessionSignal::Outgoing(Stanza::Request(_))));
        next_signal(&mut events, |s| {
            *s == SessionSignal::StateChanged(SessionState::SentInitiate)
        })
        .await;

        handle.terminate(&sid, "success").await.unwrap();
        next_signal(&mut events, |s| *s == SessionSignal::Released).await;

        let err = handle.terminate(&sid, "success").await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn watchdog_fires_through_driver() {
        let factory = Arc::new(MemoryTransportFactory::new());
        let config = SessionConfig::with_local_name("alice@example.net")
            .with_writable_timeout(Duration::from_millis(50));
        let (handle, mut events, _task) = spawn(SessionManager::new(config, factory));

        let sid = handle.create_session("bob@example.net").await.unwrap();
        handle.create_channel(&sid, "audio", "rtp").await.unwrap();
        handle.initiate(&sid, audio_video()).await.unwrap();
        handle
            .transport_notice(&sid, "audio", TransportNotice::Connecting)
            .await
            .unwrap();

        next_signal(&mut events, |s| {
            *s == SessionSignal::StateChanged(SessionState::SentTerminate)
        })
        .await;
        next_signal(&mut events, |s| *s == SessionSignal::Released).await;
    }
}
