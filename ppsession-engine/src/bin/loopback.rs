//! Loopback demo: two endpoints negotiate a session over in-memory transports.
//!
//! Alice offers an audio content with candidates already gathered, Bob
//! accepts, Alice's candidates reach Bob's transport and Alice then hangs up.
//! Stanzas are routed between the two drivers by hand. Set `RUST_LOG=debug`
//! for the full exchange.

use std::sync::Arc;
use std::time::Duration;

use ppsession_core::{
    Candidate, ContentInfo, MessageBody, SessionDescription, SessionState, Stanza,
    TERMINATE_SUCCESS,
};
use ppsession_engine::{
    driver, MemoryTransportFactory, SessionConfig, SessionManager, SessionSignal, TransportNotice,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AUDIO: &str = "audio";
const RTP_CHANNEL: &str = "rtp";
const RTP_CONTENT_TYPE: &str = "urn:xmpp:jingle:apps:rtp:1";

fn offer() -> SessionDescription {
    SessionDescription::default().with_content(ContentInfo::new(AUDIO, RTP_CONTENT_TYPE))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let alice_factory = Arc::new(MemoryTransportFactory::new());
    let bob_factory = Arc::new(MemoryTransportFactory::new());
    let (alice, mut alice_events, _) = driver::spawn(SessionManager::new(
        SessionConfig::with_local_name("alice@example.net"),
        alice_factory.clone(),
    ));
    let (bob, mut bob_events, _) = driver::spawn(SessionManager::new(
        SessionConfig::with_local_name("bob@example.net"),
        bob_factory.clone(),
    ));

    let sid = alice.create_session("bob@example.net").await?;
    alice.create_channel(&sid, AUDIO, RTP_CHANNEL).await?;
    alice.initiate(&sid, offer()).await?;
    info!("Alice offered session {}", sid);

    // Candidates are ready before Bob has seen the offer; they are held
    // until the initiate is acked and resent if Bob refuses them early.
    let candidate = Candidate::local_udp(RTP_CHANNEL, ([127, 0, 0, 1], 40000).into(), 100);
    alice
        .transport_notice(&sid, AUDIO, TransportNotice::CandidatesReady(vec![candidate]))
        .await?;

    let exchange = async {
        let mut transport_info_id: Option<String> = None;
        let mut released = (false, false);

        while !(released.0 && released.1) {
            tokio::select! {
                Some(event) = alice_events.recv() => match event.signal {
                    SessionSignal::Outgoing(stanza) => {
                        if let Stanza::Request(msg) = &stanza {
                            if matches!(msg.body, MessageBody::TransportInfo { .. }) {
                                transport_info_id = Some(msg.id.clone());
                            }
                        }
                        bob.deliver(stanza).await?;
                    }
                    SessionSignal::StateChanged(SessionState::ReceivedAccept) => {
                        info!("Alice: accepted");
                        if let Some(transport) = alice_factory.transport(&sid, AUDIO) {
                            transport.set_writable(true);
                        }
                        alice
                            .transport_notice(&sid, AUDIO, TransportNotice::WritableChanged)
                            .await?;
                    }
                    SessionSignal::StateChanged(state) => info!("Alice: {}", state),
                    SessionSignal::ErrorMessage { error, .. } => warn!("Alice: peer error {}", error),
                    SessionSignal::Released => released.0 = true,
                    _ => {}
                },
                Some(event) = bob_events.recv() => match event.signal {
                    SessionSignal::Outgoing(stanza) => {
                        let answers_candidates = matches!(
                            (&stanza, &transport_info_id),
                            (Stanza::Result { id, .. }, Some(sent)) if id == sent
                        );
                        alice.deliver(stanza).await?;
                        if answers_candidates {
                            let applied = bob_factory
                                .transport(&sid, AUDIO)
                                .map(|t| t.remote_candidates().len())
                                .unwrap_or_default();
                            info!("Bob applied {} remote candidate(s), hanging up", applied);
                            alice.terminate(&sid, TERMINATE_SUCCESS).await?;
                        }
                    }
                    SessionSignal::StateChanged(SessionState::ReceivedInitiate) => {
                        info!("Bob: incoming session, accepting");
                        bob.create_channel(&sid, AUDIO, RTP_CHANNEL).await?;
                        bob.accept(&sid, offer()).await?;
                    }
                    SessionSignal::StateChanged(state) => info!("Bob: {}", state),
                    SessionSignal::ReceivedTerminateReason(reason) => {
                        info!("Bob: peer terminated ({})", reason)
                    }
                    SessionSignal::Released => released.1 = true,
                    _ => {}
                },
                else => break,
            }
        }
        Ok::<_, Box<dyn std::error::Error>>(())
    };

    tokio::time::timeout(Duration::from_secs(5), exchange).await??;
    info!("Session {} released on both sides", sid);
    Ok(())
}
