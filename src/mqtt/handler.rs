use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;
use crate::publish::stats::PublishStats;

/// Delay between reconnect attempts after a poll error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Cloneable outbound handle; every publish targets the configured topic.
#[derive(Clone)]
pub struct Publisher {
    client: AsyncClient,
    topic: String,
    qos: QoS,
    retain: bool,
}

impl Publisher {
    pub async fn publish_text(&self, line: &str) -> Result<(), rumqttc::ClientError> {
        self.client
            .publish(
                self.topic.clone(),
                self.qos,
                self.retain,
                line.as_bytes().to_vec(),
            )
            .await
    }

    pub async fn publish_json(&self, value: &serde_json::Value) -> Result<(), rumqttc::ClientError> {
        self.publish_text(&value.to_string()).await
    }
}

/// Connects to the broker and spawns the event-loop task. Returns the
/// publisher plus the task handle.
pub fn start_link(
    config: &MqttConfig,
    stats: Arc<Mutex<PublishStats>>,
    inbound: mpsc::Sender<Vec<u8>>,
) -> (Publisher, JoinHandle<()>) {
    let mut options = MqttOptions::new(
        config.client_id.clone(),
        config.server.clone(),
        config.port,
    );
    let _ = options
        .set_credentials(config.user.clone(), config.password.clone())
        .set_keep_alive(Duration::from_secs(config.keep_alive_secs))
        .set_clean_session(config.clean_session)
        .set_last_will(LastWill::new(
            config.topic.clone(),
            format!("Disconnected for ClientID={}", config.client_id),
            QoS::AtMostOnce,
            false,
        ));

    let (client, mut eventloop) = AsyncClient::new(options, 100);
    let qos = qos_from(config.qos);
    let publisher = Publisher {
        client: client.clone(),
        topic: config.topic.clone(),
        qos,
        retain: config.retain,
    };

    let topic = config.topic.clone();
    let client_id = config.client_id.clone();
    let handle = tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected for ClientID: {client_id}");
                    if let Err(e) = client.subscribe(topic.clone(), qos).await {
                        error!("Subscribe failed: {e}");
                    }
                    stats.lock().await.link_up = true;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic == topic {
                        // Dispatcher gone means shutdown; stop polling.
                        if inbound.send(publish.payload.to_vec()).await.is_err() {
                            debug!("Dispatcher channel closed, stopping MQTT link");
                            return;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT connection error: {e}");
                    {
                        let mut stats = stats.lock().await;
                        // Count each outage once, not once per retry.
                        if stats.link_up {
                            stats.link_up = false;
                            stats.outage_count += 1;
                            warn!("Broker link is down");
                        }
                    }
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    });

    (publisher, handle)
}

fn qos_from(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
