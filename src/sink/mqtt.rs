/// MQTT broker session and publish sink
use async_trait::async_trait;
use log::{debug, error, info, warn};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

use crate::error::SinkError;
use crate::models::SensorRecord;
use crate::sink::Sink;

// Outstanding requests buffered between publishers and the event loop
const REQUEST_CAPACITY: usize = 64;
const RETRY_BACKOFF_SECS: u64 = 1;
const SHUTDOWN_GRACE_SECS: u64 = 5;

/// Broker connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Topic decoded records are published to
    pub topic: String,
    /// Topic subscribed for incoming messages, which are only logged
    pub command_topic: String,
    pub keep_alive: Duration,
}

/// Running broker connection
///
/// The event loop is driven by a background task, so publishing never waits
/// for the network or for acknowledgements.
pub struct MqttSession {
    client: AsyncClient,
    topic: String,
    task: JoinHandle<()>,
}

impl MqttSession {
    /// Connect in the background and subscribe to the command topic once the
    /// broker accepts the connection
    pub fn start(settings: &MqttSettings) -> Self {
        let mut options =
            MqttOptions::new(settings.client_id.clone(), settings.host.clone(), settings.port);
        options.set_keep_alive(settings.keep_alive);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        info!(
            "Connecting to MQTT broker {}:{} as {}",
            settings.host, settings.port, settings.client_id
        );

        let task = tokio::spawn(drive_event_loop(
            eventloop,
            client.clone(),
            settings.command_topic.clone(),
        ));

        Self {
            client,
            topic: settings.topic.clone(),
            task,
        }
    }

    /// Publish sink bound to this session
    pub fn sink(&self) -> MqttSink {
        MqttSink::new(self.client.clone(), self.topic.clone())
    }

    /// Send DISCONNECT and wait briefly for the event loop to finish
    pub async fn stop(self) {
        if let Err(e) = self.client.try_disconnect() {
            warn!("Failed to queue MQTT disconnect: {}", e);
        }

        let mut task = self.task;
        match timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), &mut task).await {
            Ok(_) => info!("MQTT session closed"),
            Err(_) => {
                warn!("MQTT event loop did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

async fn drive_event_loop(mut eventloop: EventLoop, client: AsyncClient, command_topic: String) {
    loop {
        match eventloop.poll().await {
            // Refused CONNACKs surface as errors, so this one is always a success
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker");
                if let Err(e) = client.try_subscribe(command_topic.as_str(), QoS::AtMostOnce) {
                    error!("Failed to subscribe to {}: {}", command_topic, e);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                // Commands are not executed, only recorded
                info!(
                    "Received on {}: {}",
                    publish.topic,
                    String::from_utf8_lossy(&publish.payload)
                );
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("{}", describe_failure(&e));
                sleep(Duration::from_secs(RETRY_BACKOFF_SECS)).await;
            }
        }
    }
}

fn describe_failure(err: &ConnectionError) -> String {
    match err {
        ConnectionError::ConnectionRefused(code) => {
            format!("MQTT connection refused by broker: {}", refusal_reason(*code))
        }
        other => format!("MQTT connection error: {}", other),
    }
}

fn refusal_reason(code: ConnectReturnCode) -> &'static str {
    match code {
        ConnectReturnCode::Success => "accepted",
        ConnectReturnCode::RefusedProtocolVersion => "unsupported protocol version",
        ConnectReturnCode::BadClientId => "client id rejected",
        ConnectReturnCode::ServiceUnavailable => "service unavailable",
        ConnectReturnCode::BadUserNamePassword => "bad user name or password",
        ConnectReturnCode::NotAuthorized => "not authorized",
    }
}

/// Publishes records as JSON, fire-and-forget at QoS 0
#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
    topic: String,
}

impl MqttSink {
    pub fn new(client: AsyncClient, topic: String) -> Self {
        Self { client, topic }
    }
}

#[async_trait]
impl Sink for MqttSink {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn accept(&self, record: &SensorRecord) -> Result<(), SinkError> {
        let payload = record.to_json()?;
        // Enqueue only; a full request queue is reported instead of waited on
        self.client
            .try_publish(self.topic.as_str(), QoS::AtMostOnce, false, payload.clone())?;
        debug!("Published to {}: {}", self.topic, payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FrameReading;

    fn record() -> SensorRecord {
        SensorRecord::Frame(FrameReading {
            timestamp: "t".into(),
            device_mac: "FFEEDDCCBBAA".into(),
            packet_no: 1,
            temperature: 60.0,
            humidity: 40,
            pressure: 101325,
        })
    }

    #[tokio::test]
    async fn publish_is_enqueued_without_a_broker() {
        let options = MqttOptions::new("test-client", "localhost", 1883);
        // The event loop is never polled, so requests stay queued.
        let (client, _eventloop) = AsyncClient::new(options, 1);
        let sink = MqttSink::new(client, "sensors/test".into());

        sink.accept(&record()).await.unwrap();
        assert!(matches!(
            sink.accept(&record()).await,
            Err(SinkError::Publish(_))
        ));
    }

    #[tokio::test]
    async fn refused_connack_is_reported_as_refusal() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut connect = [0u8; 256];
            let _ = socket.read(&mut connect).await.unwrap();
            // CONNACK, return code 5
            socket.write_all(&[0x20, 0x02, 0x00, 0x05]).await.unwrap();
            socket
        });

        let options = MqttOptions::new("refused-client", "127.0.0.1", port);
        let (_client, mut eventloop) = AsyncClient::new(options, 4);
        let err = loop {
            match timeout(Duration::from_secs(5), eventloop.poll()).await.unwrap() {
                Ok(_) => continue,
                Err(e) => break e,
            }
        };

        assert!(matches!(
            err,
            ConnectionError::ConnectionRefused(ConnectReturnCode::NotAuthorized)
        ));
        assert_eq!(
            describe_failure(&err),
            "MQTT connection refused by broker: not authorized"
        );
        drop(broker.await.unwrap());
    }
}
