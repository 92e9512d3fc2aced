use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::Settings;
use crate::error::ConfigurationError;
use crate::notify::{escape_html, NotificationChannel, NotificationError, OutgoingReport};

const IMPLICIT_TLS_PORT: u16 = 465;

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl SmtpNotifier {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigurationError> {
        let user = settings.require_email_user()?;
        let pass = settings.require_email_pass()?;
        let recipients = settings.require_email_to()?;

        let from: Mailbox = user.parse().map_err(|e| ConfigurationError::InvalidSetting {
            name: "EMAIL_USER",
            detail: format!("invalid sender address: {e}"),
        })?;
        let to = recipients
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .map_err(|e| ConfigurationError::InvalidSetting {
                        name: "EMAIL_TO",
                        detail: format!("invalid recipient {addr:?}: {e}"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let builder = if settings.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
        }
        .map_err(|e| ConfigurationError::InvalidSetting {
            name: "SMTP_HOST",
            detail: e.to_string(),
        })?;

        let transport = builder
            .port(settings.smtp_port)
            .credentials(Credentials::new(user.to_string(), pass.to_string()))
            .build();

        Ok(Self {
            transport,
            from,
            to,
        })
    }
}

pub(crate) fn subject(run_date: NaiveDate) -> String {
    format!("📊 Daily GARP Report | {}", run_date.format("%b %d"))
}

pub(crate) fn render_html(body: &str) -> String {
    format!(
        "<html><body>{}</body></html>",
        escape_html(body).replace('\n', "<br>")
    )
}

#[async_trait]
impl NotificationChannel for SmtpNotifier {
    async fn send(&self, report: &OutgoingReport<'_>) -> Result<(), NotificationError> {
        let html_body = render_html(&report.report.body);

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject(report.run_date))
            .header(ContentType::TEXT_HTML);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        let email = builder
            .body(html_body)
            .map_err(|e| NotificationError::Smtp(format!("failed to build email: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotificationError::Smtp(format!("failed to send email: {e}")))?;

        Ok(())
    }

    fn name(&self) -> &str {
        "email"
    }
}
