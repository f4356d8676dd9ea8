use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::task::EmailTemplate;
use crate::utils::ics::make_ics;
use crate::utils::time::{from_rfc3339, human_datetime};

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";
const SENDER_NAME: &str = "Talent Team";

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
    pub ics: Option<String>,
}

fn var<'a>(variables: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str> {
    variables
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidInput(format!("email variable `{}` is missing", key)))
}

/// Builds subject, plain-text body and optional calendar attachment for a template.
pub fn render(template: EmailTemplate, variables: &BTreeMap<String, String>) -> Result<RenderedEmail> {
    match template {
        EmailTemplate::Invite => {
            let job_title = var(variables, "job_title")?;
            let link = var(variables, "link")?;
            let expires_at = var(variables, "expires_at")?;
            let mut subject = format!("You're shortlisted for {}: pick your interview slot", job_title);
            // Replies keep the subject, which is how inbound availability finds its application.
            if let Some(application_id) = variables.get("application_id") {
                subject.push_str(&format!(" [AppID:{}]", application_id));
            }
            Ok(RenderedEmail {
                subject,
                body: format!(
                    "Hi,\n\nGreat news: you've been shortlisted for the {job_title} role.\n\
                     Choose an interview time here: {link}\n\
                     Or simply reply to this email with a few times that suit you.\n\
                     This link is valid until {expires_at}.\n\nThanks,\n{SENDER_NAME}"
                ),
                ics: None,
            })
        }
        EmailTemplate::Confirmation => {
            let job_title = var(variables, "job_title")?;
            let link = var(variables, "link")?;
            let start = parse_time(var(variables, "start")?)?;
            let end = parse_time(var(variables, "end")?)?;
            let uid = var(variables, "interview_id")?;
            let summary = format!("Interview: {}", job_title);
            let ics = make_ics(uid, start, start, end, &summary, &format!("Join: {}", link));
            Ok(RenderedEmail {
                subject: format!("Interview confirmed: {}", job_title),
                body: format!(
                    "Hi,\n\nYour interview for {job_title} is scheduled on {}.\n\
                     Join link: {link}\n\nAttachment: calendar invite (.ics)\n\
                     Tip: use a headset in a quiet room. The interview is recorded for evaluation.\n\n\
                     Thanks,\n{SENDER_NAME}",
                    human_datetime(start)
                ),
                ics: Some(ics),
            })
        }
        EmailTemplate::ScoreRecorded => {
            let candidate = var(variables, "candidate_name")?;
            let job_title = var(variables, "job_title")?;
            let total = var(variables, "total_score")?;
            let recommendation = var(variables, "recommendation")?;
            Ok(RenderedEmail {
                subject: format!("Interview scored: {} for {}", candidate, job_title),
                body: format!(
                    "The interview of {candidate} for {job_title} has been scored.\n\
                     Total score: {total}\nRecommendation: {recommendation}\n"
                ),
                ics: None,
            })
        }
    }
}

fn parse_time(raw: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    from_rfc3339(raw).map_err(|e| Error::InvalidInput(format!("invalid timestamp `{}`: {}", raw, e)))
}

/// Opaque delivery channel for lifecycle emails. Returns the provider message id.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(
        &self,
        template: EmailTemplate,
        recipient: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<String>;
}

#[derive(Clone)]
pub struct SendGridSink {
    client: Client,
    api_key: String,
    from_email: String,
    timeout: Duration,
}

impl SendGridSink {
    pub fn new(client: Client, api_key: String, from_email: String, timeout: Duration) -> Self {
        Self {
            client,
            api_key,
            from_email,
            timeout,
        }
    }
}

#[async_trait]
impl NotificationSink for SendGridSink {
    async fn send(
        &self,
        template: EmailTemplate,
        recipient: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<String> {
        let email = render(template, variables)?;
        let mut data = json!({
            "personalizations": [{"to": [{"email": recipient}]}],
            "from": {"email": self.from_email, "name": SENDER_NAME},
            "subject": email.subject,
            "content": [{"type": "text/plain", "value": email.body}]
        });
        if let Some(ics) = &email.ics {
            data["attachments"] = json!([{
                "content": BASE64.encode(ics.as_bytes()),
                "filename": "interview.ics",
                "type": "text/calendar"
            }]);
        }

        let res = self
            .client
            .post(SENDGRID_URL)
            .bearer_auth(&self.api_key)
            .json(&data)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            // 4xx other than throttling means the message itself is bad.
            if status.is_client_error() && status.as_u16() != 429 {
                return Err(Error::InvalidInput(format!("SendGrid rejected email {}: {}", status, text)));
            }
            return Err(Error::UpstreamUnavailable(format!("SendGrid error {}: {}", status, text)));
        }

        let message_id = res
            .headers()
            .get("X-Message-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        tracing::info!(template = %template, to = %recipient, %message_id, "email sent");
        Ok(message_id)
    }
}

/// Renders and logs instead of delivering; used when no provider key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(
        &self,
        template: EmailTemplate,
        recipient: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<String> {
        let email = render(template, variables)?;
        let message_id = format!("log-{}", Uuid::new_v4().simple());
        tracing::info!(
            template = %template,
            to = %recipient,
            subject = %email.subject,
            %message_id,
            "email delivery skipped, no provider configured"
        );
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn confirmation_carries_calendar_invite() {
        let email = render(
            EmailTemplate::Confirmation,
            &vars(&[
                ("job_title", "Backend Engineer"),
                ("link", "http://localhost/join/abc"),
                ("start", "2026-10-20T10:00:00Z"),
                ("end", "2026-10-20T11:00:00Z"),
                ("interview_id", "i-1"),
            ]),
        )
        .unwrap();
        assert_eq!(email.subject, "Interview confirmed: Backend Engineer");
        assert!(email.body.contains("Tue, 20 Oct 2026 10:00 UTC"));
        assert!(email.ics.unwrap().contains("DTSTART:20261020T100000Z"));
    }

    #[test]
    fn invite_subject_tags_the_application() {
        let email = render(
            EmailTemplate::Invite,
            &vars(&[
                ("job_title", "Backend Engineer"),
                ("link", "http://localhost/confirm?token=abc"),
                ("expires_at", "Wed, 21 Oct 2026 09:00 UTC"),
                ("application_id", "3f0c"),
            ]),
        )
        .unwrap();
        assert!(email.subject.ends_with("[AppID:3f0c]"));
        assert!(email.body.contains("reply to this email"));
    }

    #[test]
    fn missing_variable_is_not_retryable() {
        let err = render(EmailTemplate::Invite, &vars(&[("job_title", "X")])).unwrap_err();
        assert!(!err.is_transient());
    }
}
