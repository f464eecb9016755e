use async_trait::async_trait;
use tracing::info;

use crate::{AlertMessage, Notifier, SeriesAlert};

/// Writes alerts to the log instead of delivering them. Always reports success.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, alert: &SeriesAlert) -> bool {
        let message = AlertMessage::render(alert, None);
        info!(
            series = %alert.series_code,
            recipient = %alert.subscriber_address,
            margin = %alert.margin,
            subject = %message.subject,
            "alert recorded (log notifier)"
        );
        true
    }
}
