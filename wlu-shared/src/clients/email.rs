use reqwest::Client;
use serde::Serialize;

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("email delivery is not configured")]
    NotConfigured,

    #[error("email send failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("email API error ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound mail over the SendGrid v3 HTTP API.
#[derive(Clone)]
pub struct EmailClient {
    client: Client,
    api_key: String,
    from_email: String,
    from_name: String,
}

#[derive(Debug, Serialize)]
struct SendGridRequest {
    personalizations: Vec<Personalization>,
    from: Address,
    subject: String,
    content: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Personalization {
    to: Vec<Address>,
}

#[derive(Debug, Serialize)]
struct Address {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(rename = "type")]
    kind: &'static str,
    value: String,
}

impl EmailClient {
    pub fn new(api_key: &str, from_email: &str, from_name: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            from_email: from_email.to_string(),
            from_name: from_name.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn build_request(&self, to: &str, subject: &str, html: &str, text: &str) -> SendGridRequest {
        SendGridRequest {
            personalizations: vec![Personalization {
                to: vec![Address { email: to.to_string(), name: None }],
            }],
            from: Address {
                email: self.from_email.clone(),
                name: Some(self.from_name.clone()),
            },
            subject: subject.to_string(),
            // SendGrid requires text/plain before text/html.
            content: vec![
                Content { kind: "text/plain", value: text.to_string() },
                Content { kind: "text/html", value: html.to_string() },
            ],
        }
    }

    pub async fn send_email(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        text: &str,
    ) -> Result<(), EmailError> {
        if !self.is_configured() {
            return Err(EmailError::NotConfigured);
        }

        let request = self.build_request(to, subject, html, text);

        let response = self.client
            .post(SENDGRID_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected { status, body });
        }

        tracing::debug!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}
