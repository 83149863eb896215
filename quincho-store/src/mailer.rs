use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use quincho_domain::reservation::Reservation;

use crate::app_config::MailerConfig;

/// Outbound transactional mail. Delivery is strictly best-effort: every error
/// path ends in a log line, never in the caller's Result. Transient failures
/// are retried a few times with exponential backoff; reservation mutations
/// themselves are never retried from here.
pub struct Mailer {
    config: MailerConfig,
    client: reqwest::Client,
}

#[derive(Debug, Clone)]
pub enum Notification {
    /// Request received; carries the confirmation token for the 24h link.
    Received { token: Uuid },
    Approved,
    Rejected { notes: Option<String> },
    Cancelled { reason: Option<String> },
}

impl Notification {
    fn kind(&self) -> &'static str {
        match self {
            Notification::Received { .. } => "reservation_received",
            Notification::Approved => "reservation_approved",
            Notification::Rejected { .. } => "reservation_rejected",
            Notification::Cancelled { .. } => "reservation_cancelled",
        }
    }
}

#[derive(Debug, Serialize)]
struct MailPayload {
    #[serde(rename = "type")]
    kind: String,
    recipient: String,
    from: String,
    subject: String,
    reservation: ReservationSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirmation_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReservationSummary {
    id: Uuid,
    responsable: String,
    fecha: String,
    inicio: String,
    fin: String,
    personas: i32,
}

impl From<&Reservation> for ReservationSummary {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id,
            responsable: r.responsable.clone(),
            fecha: r.fecha.to_string(),
            inicio: r.inicio.format("%H:%M").to_string(),
            fin: r.fin.format("%H:%M").to_string(),
            personas: r.personas,
        }
    }
}

/// Delay before retry `attempt` (1-based): 1s, 2s, 4s, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

/// Every notification gets at least one delivery attempt, whatever the
/// configured retry count says.
fn attempt_budget(max_retries: u32) -> u32 {
    max_retries.max(1)
}

impl Mailer {
    pub fn new(config: MailerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!("Mail client builder failed, falling back to an untimed default: {}", e);
                reqwest::Client::new()
            });
        Self { config, client }
    }

    /// Fire-and-forget dispatch; the caller's operation is already durable.
    pub fn spawn_send(self: &Arc<Self>, reservation: &Reservation, notification: Notification) {
        let mailer = Arc::clone(self);
        let reservation = reservation.clone();
        tokio::spawn(async move {
            mailer.send(&reservation, notification).await;
        });
    }

    pub async fn send(&self, reservation: &Reservation, notification: Notification) {
        let kind = notification.kind();

        if !self.config.enabled {
            info!("Mailer disabled, skipping {} for {}", kind, reservation.email);
            return;
        }

        let Some(endpoint) = self.config.endpoint.clone() else {
            warn!("Mailer enabled but no endpoint configured, dropping {}", kind);
            return;
        };

        let payload = self.payload(reservation, &notification);

        let budget = attempt_budget(self.config.max_retries);
        for attempt in 1..=budget {
            match self.post(&endpoint, &payload).await {
                Ok(()) => {
                    info!("Sent {} to {}", kind, reservation.email);
                    return;
                }
                Err(e) if attempt < budget => {
                    warn!("Mail {} attempt {} failed, retrying: {}", kind, attempt, e);
                    sleep(backoff_delay(attempt)).await;
                }
                Err(e) => {
                    error!("Mail {} to {} failed after {} attempts: {}",
                        kind, reservation.email, attempt, e);
                }
            }
        }
    }

    async fn post(&self, endpoint: &str, payload: &MailPayload) -> Result<(), reqwest::Error> {
        let mut req = self.client.post(endpoint).json(payload);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        req.send().await?.error_for_status()?;
        Ok(())
    }

    fn payload(&self, reservation: &Reservation, notification: &Notification) -> MailPayload {
        let (subject, reason, confirmation_url) = match notification {
            Notification::Received { token } => (
                "Reserva recibida: confirmá tu solicitud".to_string(),
                None,
                Some(format!(
                    "{}/confirm/{}",
                    self.config.public_base_url.trim_end_matches('/'),
                    token
                )),
            ),
            Notification::Approved => ("Reserva aprobada".to_string(), None, None),
            Notification::Rejected { notes } => {
                ("Reserva rechazada".to_string(), notes.clone(), None)
            }
            Notification::Cancelled { reason } => {
                ("Reserva cancelada".to_string(), reason.clone(), None)
            }
        };

        MailPayload {
            kind: notification.kind().to_string(),
            recipient: reservation.email.clone(),
            from: self.config.from.clone(),
            subject,
            reservation: ReservationSummary::from(reservation),
            reason,
            confirmation_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use quincho_domain::reservation::ReservationStatus;

    fn sample_reservation() -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            responsable: "Ana".into(),
            email: "ana@example.com".into(),
            motivo: "Asado".into(),
            fecha: NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(),
            inicio: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            fin: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            personas: 10,
            affiliation: None,
            status: ReservationStatus::Pending,
            admin_notes: None,
            confirmed: false,
            confirmation_token: Some(Uuid::new_v4()),
            token_expires_at: Some(Utc::now()),
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            updated_by: None,
        }
    }

    fn mailer() -> Mailer {
        Mailer::new(MailerConfig {
            enabled: true,
            endpoint: Some("http://localhost:9/send".into()),
            api_key: None,
            from: "quincho@example.com".into(),
            public_base_url: "http://localhost:3000/".into(),
            max_retries: 3,
        })
    }

    #[test]
    fn test_backoff_is_exponential() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        // Capped so a misconfigured retry count cannot sleep for minutes.
        assert_eq!(backoff_delay(10), Duration::from_secs(32));
    }

    #[test]
    fn test_attempt_budget_never_zero() {
        assert_eq!(attempt_budget(0), 1);
        assert_eq!(attempt_budget(1), 1);
        assert_eq!(attempt_budget(3), 3);
    }

    #[test]
    fn test_confirmation_url_has_no_double_slash() {
        let m = mailer();
        let token = Uuid::new_v4();
        let payload =
            m.payload(&sample_reservation(), &Notification::Received { token });
        assert_eq!(
            payload.confirmation_url.unwrap(),
            format!("http://localhost:3000/confirm/{}", token)
        );
    }

    #[test]
    fn test_cancelled_payload_carries_reason() {
        let m = mailer();
        let payload = m.payload(
            &sample_reservation(),
            &Notification::Cancelled { reason: Some("maintenance".into()) },
        );
        assert_eq!(payload.kind, "reservation_cancelled");
        assert_eq!(payload.reason.as_deref(), Some("maintenance"));
        assert!(payload.confirmation_url.is_none());
    }
}
