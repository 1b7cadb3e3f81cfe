//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Publish transports and delivery primitives."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lumicert_common::BrokerConfig;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ClientError, Event, EventLoop, MqttOptions, Outgoing, Packet};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{Ack, DeliveryGuarantee, LinkEvent, MessagingError, Result, Transport};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// MQTT transport backed by the `rumqttc` async client.
///
/// The event loop runs on a background task spawned by `connect`; it keeps
/// reconnecting after session loss and stops once a DISCONNECT was sent.
///
/// Requests never wait for room in the client queue. While the broker is
/// unreachable the queue fills up and further publishes fail right away.
pub struct MqttTransport {
    options: MqttOptions,
    capacity: usize,
    connect_timeout: Duration,
    client: Mutex<Option<AsyncClient>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    link: broadcast::Sender<LinkEvent>,
}

impl MqttTransport {
    /// Build a transport from broker settings. No I/O happens until `connect`.
    pub fn from_config(config: &BrokerConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.clone().unwrap_or_default());
        }
        if config.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        let (link, _) = broadcast::channel(16);
        Self {
            options,
            capacity: config.channel_capacity,
            connect_timeout: config.connect_timeout,
            client: Mutex::new(None),
            driver: Mutex::new(None),
            link,
        }
    }

    fn client(&self) -> Result<AsyncClient> {
        self.client.lock().clone().ok_or(MessagingError::NotConnected)
    }
}

async fn drive(mut eventloop: EventLoop, link: broadcast::Sender<LinkEvent>) {
    let mut connected = false;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                debug!(session_present = ack.session_present, "broker accepted session");
                connected = true;
                let _ = link.send(LinkEvent::Connected);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("disconnect sent; stopping mqtt event loop");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                if connected {
                    warn!(error = %err, "mqtt session lost; reconnecting");
                }
                connected = false;
                let _ = link.send(LinkEvent::Disconnected {
                    reason: err.to_string(),
                });
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self) -> Result<()> {
        let previous = self.driver.lock().take();
        if let Some(handle) = previous {
            debug!("replacing existing mqtt session");
            handle.abort();
            self.client.lock().take();
        }

        let (client, eventloop) = AsyncClient::new(self.options.clone(), self.capacity);
        let mut events = self.link.subscribe();
        let handle = tokio::spawn(drive(eventloop, self.link.clone()));

        let outcome = tokio::time::timeout(self.connect_timeout, async {
            loop {
                match events.recv().await {
                    Ok(LinkEvent::Connected) => return Ok(()),
                    Ok(LinkEvent::Disconnected { reason }) => {
                        return Err(MessagingError::Connection(reason))
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(MessagingError::Connection("event loop stopped".into()))
                    }
                }
            }
        })
        .await;

        match outcome {
            Ok(Ok(())) => {
                let (host, port) = self.options.broker_address();
                info!(%host, port, client_id = %self.options.client_id(), "connected to mqtt broker");
                *self.client.lock() = Some(client);
                *self.driver.lock() = Some(handle);
                Ok(())
            }
            Ok(Err(err)) => {
                handle.abort();
                Err(err)
            }
            Err(_) => {
                handle.abort();
                Err(MessagingError::Connection(format!(
                    "no CONNACK within {:?}",
                    self.connect_timeout
                )))
            }
        }
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: DeliveryGuarantee,
        retain: bool,
    ) -> Result<Ack> {
        let client = self.client()?;
        let bytes = payload.len();
        client
            .try_publish(topic, qos.into(), retain, payload.to_vec())
            .map_err(|err| MessagingError::Publish {
                topic: topic.to_owned(),
                reason: match err {
                    ClientError::TryRequest(_) => "request queue full; broker unreachable".into(),
                    other => other.to_string(),
                },
            })?;
        Ok(Ack {
            topic: topic.to_owned(),
            bytes,
        })
    }

    async fn disconnect(&self) -> Result<()> {
        let client = self
            .client
            .lock()
            .take()
            .ok_or(MessagingError::NotConnected)?;
        let requested = client
            .try_disconnect()
            .map_err(|err| MessagingError::Connection(err.to_string()));

        let driver = self.driver.lock().take();
        if let Some(mut handle) = driver {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await.is_err() {
                warn!("mqtt event loop did not drain in time; aborting");
                handle.abort();
            }
        }
        requested
    }

    fn link_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.link.subscribe()
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::{mpsc, oneshot};
    use tokio::task::JoinSet;
    use tokio::time::timeout;

    const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    /// Minimal broker on loopback. Acknowledges up to `sessions` CONNECTs and
    /// reports a session index once the client closes that socket. Firing (or
    /// dropping) the returned sender drops every socket and the listener.
    async fn loopback_broker(
        sessions: usize,
    ) -> (u16, oneshot::Sender<()>, mpsc::UnboundedReceiver<usize>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind loopback");
        let port = listener.local_addr().expect("local addr").port();
        let (hang_up, mut hung_up) = oneshot::channel::<()>();
        let (closed_tx, closed) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut readers = JoinSet::new();
            let mut accepted = 0;
            loop {
                tokio::select! {
                    _ = &mut hung_up => break,
                    conn = listener.accept(), if accepted < sessions => {
                        let Ok((mut socket, _)) = conn else { break };
                        let index = accepted;
                        accepted += 1;
                        let closed_tx = closed_tx.clone();
                        readers.spawn(async move {
                            let mut buf = [0u8; 1024];
                            if socket.read(&mut buf).await.unwrap_or(0) > 0 {
                                let _ = socket.write_all(&CONNACK).await;
                                while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
                            }
                            let _ = closed_tx.send(index);
                        });
                    }
                }
            }
            readers.abort_all();
        });
        (port, hang_up, closed)
    }

    fn loopback_config(port: u16, channel_capacity: usize) -> BrokerConfig {
        BrokerConfig {
            host: "127.0.0.1".into(),
            port,
            channel_capacity,
            connect_timeout: Duration::from_secs(3),
            ..BrokerConfig::default()
        }
    }

    fn unreachable_broker() -> BrokerConfig {
        BrokerConfig {
            host: "127.0.0.1".into(),
            port: 1,
            connect_timeout: Duration::from_secs(3),
            ..BrokerConfig::default()
        }
    }

    #[tokio::test]
    async fn publish_before_connect_is_rejected() {
        let transport = MqttTransport::from_config(&BrokerConfig::default());
        let err = transport
            .publish("t", Bytes::new(), DeliveryGuarantee::AtLeastOnce, true)
            .await
            .expect_err("not connected");
        assert!(matches!(err, MessagingError::NotConnected));
    }

    #[tokio::test]
    async fn unreachable_broker_surfaces_connection_error() {
        let transport = MqttTransport::from_config(&unreachable_broker());
        let err = transport.connect().await.expect_err("nothing listens on port 1");
        assert!(matches!(err, MessagingError::Connection(_)));
    }

    #[tokio::test]
    async fn disconnect_without_session_is_rejected() {
        let transport = MqttTransport::from_config(&BrokerConfig::default());
        assert!(matches!(
            transport.disconnect().await,
            Err(MessagingError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn live_session_publishes_and_drains_on_disconnect() {
        let (port, _hang_up, mut closed) = loopback_broker(1).await;
        let transport = MqttTransport::from_config(&loopback_config(port, 8));
        transport.connect().await.expect("broker acknowledges");

        let ack = transport
            .publish("lumicert/test", Bytes::from_static(b"online"), DeliveryGuarantee::AtMostOnce, true)
            .await
            .expect("publish queued");
        assert_eq!(ack.bytes, 6);

        timeout(DRAIN_TIMEOUT, transport.disconnect())
            .await
            .expect("event loop drains before the deadline")
            .expect("disconnect sent");
        let index = timeout(Duration::from_secs(2), closed.recv())
            .await
            .expect("broker sees the client leave");
        assert_eq!(index, Some(0));
    }

    #[tokio::test]
    async fn broker_outage_fails_publishes_instead_of_blocking() {
        let (port, hang_up, _closed) = loopback_broker(1).await;
        let transport = MqttTransport::from_config(&loopback_config(port, 2));
        transport.connect().await.expect("broker acknowledges");
        let mut events = transport.link_events();

        let _ = hang_up.send(());
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("link event after socket loss")
            .expect("link channel open");
        assert!(matches!(event, LinkEvent::Disconnected { .. }));

        let mut rejected = 0;
        for _ in 0..8 {
            let outcome = timeout(
                Duration::from_secs(1),
                transport.publish(
                    "lumicert/test",
                    Bytes::from_static(b"{}"),
                    DeliveryGuarantee::AtLeastOnce,
                    true,
                ),
            )
            .await
            .expect("publish returns while the broker is down");
            if let Err(err) = outcome {
                assert!(matches!(err, MessagingError::Publish { .. }));
                rejected += 1;
            }
        }
        assert!(rejected >= 6, "only {rejected} of 8 publishes were rejected");

        let _ = timeout(DRAIN_TIMEOUT + Duration::from_secs(1), transport.disconnect())
            .await
            .expect("disconnect gives up after the drain window");
    }

    #[tokio::test]
    async fn reconnecting_releases_the_previous_session() {
        let (port, _hang_up, mut closed) = loopback_broker(2).await;
        let transport = MqttTransport::from_config(&loopback_config(port, 8));
        transport.connect().await.expect("first session");
        transport.connect().await.expect("second session");

        let index = timeout(Duration::from_secs(2), closed.recv())
            .await
            .expect("first socket released");
        assert_eq!(index, Some(0));
        transport.disconnect().await.expect("second session closes cleanly");
    }
}
