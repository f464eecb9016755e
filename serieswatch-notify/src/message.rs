use rust_decimal::Decimal;

use crate::SeriesAlert;

/// Rendered alert content shared by every delivery channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl AlertMessage {
    /// Render `alert`, linking to `dashboard_url` when one is configured.
    pub fn render(alert: &SeriesAlert, dashboard_url: Option<&str>) -> Self {
        let code = alert.series_code.as_str();
        let change = format_change(alert.margin);
        let date = alert.provider_update_date;
        let subject = format!("Series alert #{code}");
        let link = dashboard_url.map(|base| {
            format!("{}/analysis?series={code}", base.trim_end_matches('/'))
        });

        let mut text = format!(
            "Series {code} was updated on {date}.\nChange since the previous observation: {change}.\n"
        );
        if let Some(link) = &link {
            text.push_str(&format!("Full analysis: {link}\n"));
        }
        text.push_str("This is an automated message; do not reply.\n");

        let color = if alert.margin.is_sign_negative() {
            "#E53E3E"
        } else {
            "#27AE60"
        };
        let button = link
            .as_deref()
            .map(|link| format!(r#"<p><a href="{link}" class="button">View full analysis</a></p>"#))
            .unwrap_or_default();
        let html = format!(
            r#"<html>
<body style="font-family: 'Segoe UI', Arial, sans-serif; color: #333;">
  <div style="max-width: 480px; margin: 0 auto;">
    <h2 style="color: #135730;">Economic variation alert</h2>
    <p>Monitored series: <strong>{code}</strong></p>
    <p>Updated on: {date}</p>
    <p>Change detected: <span style="color: {color}; font-weight: bold;">{change}</span></p>
    {button}
    <p style="font-size: 12px; color: #aaa;">This is an automated message; do not reply.</p>
  </div>
</body>
</html>"#
        );

        Self {
            subject,
            text,
            html,
        }
    }
}

/// Signed percentage with two decimals, e.g. `+5.00%` or `-33.33%`.
pub(crate) fn format_change(margin: Decimal) -> String {
    let rounded = margin.round_dp(2);
    let sign = if rounded > Decimal::ZERO { "+" } else { "" };
    format!("{sign}{rounded:.2}%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn alert(margin: Decimal) -> SeriesAlert {
        SeriesAlert {
            series_code: "PRECOS12_IPCA12".parse().unwrap(),
            subscriber_address: "a@example.com".into(),
            margin,
            provider_update_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        }
    }

    #[test]
    fn formats_signed_change() {
        assert_eq!(format_change(dec!(5)), "+5.00%");
        assert_eq!(format_change(dec!(-33.333333)), "-33.33%");
        assert_eq!(format_change(Decimal::ZERO), "0.00%");
    }

    #[test]
    fn renders_subject_and_link() {
        let message = AlertMessage::render(&alert(dec!(12.5)), Some("https://dash.example.com/"));
        assert_eq!(message.subject, "Series alert #PRECOS12_IPCA12");
        assert!(message.text.contains("+12.50%"));
        assert!(message
            .html
            .contains("https://dash.example.com/analysis?series=PRECOS12_IPCA12"));
    }

    #[test]
    fn omits_link_without_dashboard() {
        let message = AlertMessage::render(&alert(dec!(-7)), None);
        assert!(message.text.contains("-7.00%"));
        assert!(!message.html.contains("href"));
    }
}
