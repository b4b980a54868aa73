//! MQTT transport
//!
//! Thin adapter between the rumqttc event loop and the [`Dispatcher`]. Events
//! are handled one at a time: a message is dispatched on the blocking pool and
//! awaited before the event loop is polled again.

use crate::conf::Settings;
use crate::dispatch::Dispatcher;
use crate::rules::Subscription;
use crate::shell::CommandRunner;
use rumqttc::{
    AsyncClient, ClientError, ConnAck, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, Publish, QoS, SubscribeFilter,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Pause before polling again after the connection drops
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// How long shutdown waits for the DISCONNECT to be written
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the client request channel
const REQUEST_CAPACITY: usize = 10;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to {server}: {source}")]
    Connect {
        server: String,
        #[source]
        source: ConnectionError,
    },
    #[error("failed to send request to broker: {0}")]
    Client(#[from] ClientError),
}

pub fn mqtt_options(settings: &Settings) -> MqttOptions {
    let mut options = MqttOptions::new(&settings.client_id, &settings.server, settings.port);
    options
        .set_keep_alive(Duration::from_secs(settings.keepalive))
        .set_clean_session(true);
    options
}

fn qos(level: u8) -> QoS {
    match level {
        2 => QoS::ExactlyOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::AtMostOnce,
    }
}

pub fn subscribe_filters(topics: &[Subscription]) -> Vec<SubscribeFilter> {
    topics
        .iter()
        .map(|s| SubscribeFilter::new(s.topic.clone(), qos(s.qos)))
        .collect()
}

pub struct MqttTransport {
    server: String,
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttTransport {
    pub fn new(settings: &Settings) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(settings), REQUEST_CAPACITY);
        Self {
            server: format!("{}:{}", settings.server, settings.port),
            client,
            eventloop,
        }
    }

    /// Feed broker events to `dispatcher` until Ctrl-C
    ///
    /// Failing to reach the broker before the first successful connect is an
    /// error; after that, drops are logged and the event loop reconnects on
    /// the next poll.
    pub async fn run<R>(mut self, dispatcher: Arc<Dispatcher<R>>) -> Result<(), TransportError>
    where
        R: CommandRunner + Send + Sync + 'static,
    {
        tracing::info!(server = %self.server, "connecting");

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        let mut connected_once = false;
        let mut connected = false;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        connected_once = true;
                        connected = true;
                        if let Some(filters) = connack_filters(&dispatcher, &ack) {
                            self.client.subscribe_many(filters).await?;
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let Some(payload) = decode_payload(&publish) else {
                            continue;
                        };
                        dispatch_blocking(&dispatcher, publish.topic, payload).await;
                    }
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        tracing::debug!(pkid = ack.pkid, codes = ?ack.return_codes, "subscribed");
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        connected = false;
                        dispatcher.on_disconnect("broker sent disconnect");
                    }
                    Ok(other) => {
                        tracing::trace!(event = ?other, "mqtt event");
                    }
                    Err(e) if !connected_once => {
                        dispatcher.on_connect_failed(&e.to_string());
                        return Err(TransportError::Connect {
                            server: self.server,
                            source: e,
                        });
                    }
                    Err(e) => {
                        if connected {
                            connected = false;
                            dispatcher.on_disconnect(&e.to_string());
                        } else {
                            dispatcher.on_connect_failed(&e.to_string());
                        }
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        }

        tracing::info!("interrupted, shutting down");
        if connected {
            self.disconnect().await;
        }
        Ok(())
    }

    /// Queue a DISCONNECT and poll until it has been written to the socket
    async fn disconnect(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(error = %e, "disconnect request not queued");
            return;
        }

        let eventloop = &mut self.eventloop;
        let flushed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "connection closed while disconnecting");
                        break;
                    }
                }
            }
        })
        .await;

        if flushed.is_err() {
            tracing::warn!("timed out sending disconnect");
        }
    }
}

/// Run one message on the blocking pool; a panicking dispatch is only logged
pub async fn dispatch_blocking<R>(dispatcher: &Arc<Dispatcher<R>>, topic: String, payload: String)
where
    R: CommandRunner + Send + Sync + 'static,
{
    let task = {
        let dispatcher = Arc::clone(dispatcher);
        let topic = topic.clone();
        tokio::task::spawn_blocking(move || {
            dispatcher.on_message(&topic, &payload);
        })
    };
    if let Err(e) = task.await {
        tracing::error!(topic = %topic, error = %e, "dispatch task failed");
    }
}

/// Subscriptions to request for a ConnAck, `None` when there is nothing to subscribe to
pub fn connack_filters<R: CommandRunner>(
    dispatcher: &Dispatcher<R>,
    ack: &ConnAck,
) -> Option<Vec<SubscribeFilter>> {
    dispatcher
        .on_connect(&format!("{:?}", ack.code))
        .map(subscribe_filters)
}

/// Payload as text; non UTF-8 payloads are logged and dropped
pub fn decode_payload(publish: &Publish) -> Option<String> {
    match std::str::from_utf8(&publish.payload) {
        Ok(payload) => Some(payload.to_string()),
        Err(e) => {
            tracing::warn!(topic = %publish.topic, error = %e, "dropping non UTF-8 payload");
            None
        }
    }
}
