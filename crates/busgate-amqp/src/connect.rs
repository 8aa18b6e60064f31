use crate::client::{
    BrokerReady, ConfirmPublishClient, ConsumeClient, PublishProperties, ReplyDelivery,
    ReplyQueueClient,
};
use crate::config::AmqpConfig;
use bytes::Bytes;
use futures_util::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions,
    QueueDeleteOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Transient delivery: the broker drops the message on restart.
const TRANSIENT_DELIVERY_MODE: u8 = 1;

#[derive(Debug)]
pub enum ConnectError {
    ConnectionFailed {
        host: String,
        port: u16,
        error: lapin::Error,
    },
    ChannelFailed(lapin::Error),
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed { host, port, error } => {
                write!(f, "Failed to connect to AMQP broker {}:{}: {}", host, port, error)
            }
            Self::ChannelFailed(error) => {
                write!(f, "Failed to open AMQP channel: {}", error)
            }
        }
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConnectionFailed { error, .. } => Some(error),
            Self::ChannelFailed(error) => Some(error),
        }
    }
}

/// Connect to the AMQP broker.
#[instrument(name = "amqp.connect", skip(config), fields(host = %config.host, port = config.port))]
pub async fn connect(config: &AmqpConfig) -> Result<Connection, ConnectError> {
    info!(host = %config.host, port = config.port, "Connecting to AMQP broker");

    let options = ConnectionProperties::default()
        .with_executor(tokio_executor_trait::Tokio::current())
        .with_reactor(tokio_reactor_trait::Tokio);

    match Connection::connect(&config.url(), options).await {
        Ok(conn) => {
            info!(host = %config.host, port = config.port, "Connected to AMQP broker");
            Ok(conn)
        }
        Err(e) => {
            warn!(
                error = %e,
                host = %config.host,
                port = config.port,
                "Failed to connect to AMQP broker"
            );
            Err(ConnectError::ConnectionFailed {
                host: config.host.clone(),
                port: config.port,
                error: e,
            })
        }
    }
}

/// The two channels every request shares: a plain one for queue
/// declare/consume/delete, and one switched to publisher-confirm mode for
/// request publishes. Opened once at process start.
#[derive(Clone)]
pub struct GatewayChannels {
    channel: Channel,
    confirm_channel: Channel,
}

impl GatewayChannels {
    pub async fn open(conn: &Connection) -> Result<Self, ConnectError> {
        let channel = conn
            .create_channel()
            .await
            .map_err(ConnectError::ChannelFailed)?;
        let confirm_channel = conn
            .create_channel()
            .await
            .map_err(ConnectError::ChannelFailed)?;
        confirm_channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(ConnectError::ChannelFailed)?;

        info!("AMQP channels open");
        Ok(Self {
            channel,
            confirm_channel,
        })
    }
}

impl BrokerReady for GatewayChannels {
    fn is_ready(&self) -> bool {
        self.channel.status().connected() && self.confirm_channel.status().connected()
    }
}

impl ReplyQueueClient for GatewayChannels {
    type QueueError = lapin::Error;

    async fn declare_reply_queue(&self, expires: Duration) -> Result<String, lapin::Error> {
        let mut arguments = FieldTable::default();
        arguments.insert(
            ShortString::from("x-expires"),
            AMQPValue::LongLongInt(expires.as_millis() as i64),
        );

        let queue = self
            .channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    durable: false,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                arguments,
            )
            .await?;
        Ok(queue.name().as_str().to_string())
    }

    async fn delete_reply_queue(&self, queue: &str) -> Result<(), lapin::Error> {
        let _ = self
            .channel
            .queue_delete(queue, QueueDeleteOptions::default())
            .await?;
        Ok(())
    }
}

impl ConsumeClient for GatewayChannels {
    type ConsumeError = lapin::Error;

    async fn first_delivery(&self, queue: &str) -> Result<Option<ReplyDelivery>, lapin::Error> {
        let mut consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    exclusive: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        match consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(ReplyDelivery {
                correlation_id: delivery
                    .properties
                    .correlation_id()
                    .as_ref()
                    .map(|id| id.as_str().to_string()),
                payload: Bytes::from(delivery.data),
            })),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

#[derive(Debug)]
pub enum PublishConfirmError {
    Channel(lapin::Error),
    Nacked,
}

impl std::fmt::Display for PublishConfirmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Channel(e) => write!(f, "{}", e),
            Self::Nacked => write!(f, "Publish was rejected by the broker"),
        }
    }
}

impl std::error::Error for PublishConfirmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Channel(e) => Some(e),
            Self::Nacked => None,
        }
    }
}

impl ConfirmPublishClient for GatewayChannels {
    type PublishError = PublishConfirmError;

    async fn publish_confirmed(
        &self,
        exchange: &str,
        payload: Bytes,
        properties: PublishProperties,
    ) -> Result<(), PublishConfirmError> {
        let props = BasicProperties::default()
            .with_expiration(ShortString::from(
                properties.expiration.as_millis().to_string(),
            ))
            .with_delivery_mode(TRANSIENT_DELIVERY_MODE)
            .with_reply_to(ShortString::from(properties.reply_to))
            .with_correlation_id(ShortString::from(properties.correlation_id));

        let confirmation = self
            .confirm_channel
            .basic_publish(
                exchange,
                "",
                BasicPublishOptions::default(),
                &payload,
                props,
            )
            .await
            .map_err(PublishConfirmError::Channel)?
            .await
            .map_err(PublishConfirmError::Channel)?;

        match confirmation {
            Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
            Confirmation::Nack(_) => Err(PublishConfirmError::Nacked),
        }
    }
}
