use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::{MailMessage, NotificationJob, NotificationKind, NotificationQueueError};

/// Delivery transport used by the worker pool.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &MailMessage) -> Result<(), NotificationQueueError>;
}

pub struct MailRenderer;

impl MailRenderer {
    pub fn render(job: &NotificationJob) -> MailMessage {
        let payload = &job.payload;
        let to = format!("{} <{}>", payload.recipient_name, payload.recipient_address);
        let context = json!({
            "recipient": payload.recipient_name,
            "otherParty": payload.other_party_name,
            "date": payload.formatted_date,
            "appointmentId": job.appointment_id,
        });

        match payload.kind {
            NotificationKind::BookingCreated => MailMessage {
                to,
                subject: "Novo agendamento".to_string(),
                template: "booking_created".to_string(),
                text: payload.booking_created_text(),
                context,
            },
            NotificationKind::BookingCancelled => MailMessage {
                to,
                subject: "Agendamento cancelado".to_string(),
                template: "cancellation".to_string(),
                text: format!(
                    "O agendamento com {} para {} foi cancelado",
                    payload.other_party_name, payload.formatted_date
                ),
                context,
            },
        }
    }
}

/// Posts rendered messages to a transactional mail HTTP API (`POST {base}/send`).
pub struct HttpMailTransport {
    client: Client,
    base_url: String,
    api_key: String,
    from: String,
}

impl HttpMailTransport {
    pub fn new(base_url: &str, api_key: &str, from: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Option<Self> {
        if !config.is_mail_configured() {
            return None;
        }
        let base_url = config.mail_api_url.as_deref()?;
        Some(Self::new(base_url, &config.mail_api_key, &config.mail_from))
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn deliver(&self, message: &MailMessage) -> Result<(), NotificationQueueError> {
        let url = format!("{}/send", self.base_url);
        debug!("Sending '{}' mail to {} via {}", message.subject, message.to, url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "from": self.from,
                "to": message.to,
                "subject": message.subject,
                "template": message.template,
                "text": message.text,
                "context": message.context,
            }))
            .send()
            .await
            .map_err(|e| NotificationQueueError::DeliveryFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Mail API rejected message: {} - {}", status, body);
            return Err(NotificationQueueError::DeliveryFailed(format!("HTTP {}: {}", status, body)));
        }

        Ok(())
    }
}

/// Used when no mail API is configured; the message only reaches the logs.
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn deliver(&self, message: &MailMessage) -> Result<(), NotificationQueueError> {
        info!("Mail to {}: [{}] {}", message.to, message.subject, message.text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NotificationPayload;
    use chrono::Utc;

    fn job(kind: NotificationKind) -> NotificationJob {
        NotificationJob::new(
            9,
            Utc::now(),
            NotificationPayload {
                kind,
                recipient_id: 4,
                recipient_address: "ana@example.com".to_string(),
                recipient_name: "Ana".to_string(),
                other_party_name: "Bruno".to_string(),
                formatted_date: "dia 01 de junho, às 10:00h".to_string(),
            },
        )
    }

    #[test]
    fn renders_booking_created_for_recipient() {
        let message = MailRenderer::render(&job(NotificationKind::BookingCreated));

        assert_eq!(message.to, "Ana <ana@example.com>");
        assert_eq!(message.subject, "Novo agendamento");
        assert_eq!(message.text, "Novo agendamento de Bruno para dia 01 de junho, às 10:00h");
    }

    #[test]
    fn renders_cancellation_template() {
        let message = MailRenderer::render(&job(NotificationKind::BookingCancelled));

        assert_eq!(message.subject, "Agendamento cancelado");
        assert_eq!(message.template, "cancellation");
        assert_eq!(message.context["otherParty"], "Bruno");
        assert_eq!(message.context["appointmentId"], 9);
    }
}
