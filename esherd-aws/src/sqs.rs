//! SQS-backed event queue

use crate::{cloud_error, cloud_ok};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sqs::Client;
use esherd::cloud::{MessageQueue, QueueMessage};
use esherd::Result;
use std::time::Duration;
use tracing::warn;

/// SQS caps a receive at ten messages
const MAX_MESSAGES: i32 = 10;
const WAIT_TIME_SECS: i32 = 20;

#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
    visibility_timeout: Duration,
}

impl SqsQueue {
    pub fn new(config: &SdkConfig, queue_url: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            client: Client::new(config),
            queue_url: queue_url.into(),
            visibility_timeout,
        }
    }
}

fn secs(d: Duration) -> i32 {
    i32::try_from(d.as_secs()).unwrap_or(i32::MAX)
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive(&self) -> Result<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(MAX_MESSAGES)
            .wait_time_seconds(WAIT_TIME_SECS)
            .visibility_timeout(secs(self.visibility_timeout))
            .send()
            .await
            .map_err(|e| cloud_error("ReceiveMessage", e))?;
        cloud_ok("ReceiveMessage");

        let mut messages = Vec::with_capacity(output.messages().len());
        for message in output.messages() {
            let (Some(id), Some(receipt)) = (message.message_id(), message.receipt_handle()) else {
                warn!("received message without ID or receipt handle");
                continue;
            };
            messages.push(QueueMessage {
                id: id.to_string(),
                receipt: receipt.to_string(),
                body: message.body().unwrap_or_default().to_string(),
            });
        }
        Ok(messages)
    }

    async fn extend_visibility(&self, message: &QueueMessage, timeout: Duration) -> Result<()> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt)
            .visibility_timeout(secs(timeout))
            .send()
            .await
            .map_err(|e| cloud_error("ChangeMessageVisibility", e))?;
        cloud_ok("ChangeMessageVisibility");
        Ok(())
    }

    async fn ack(&self, message: &QueueMessage) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt)
            .send()
            .await
            .map_err(|e| cloud_error("DeleteMessage", e))?;
        cloud_ok("DeleteMessage");
        Ok(())
    }
}
