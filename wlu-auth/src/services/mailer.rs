use chrono::{Datelike, Duration, Utc};

use wlu_shared::clients::email::{EmailClient, EmailError};

/// Account emails sent by the auth flows.
#[async_trait::async_trait]
pub trait AccountMailer: Send + Sync {
    async fn send_verification_email(&self, to: &str, username: &str, token: &str) -> Result<(), EmailError>;

    async fn send_password_reset_email(&self, to: &str, username: &str, token: &str) -> Result<(), EmailError>;
}

pub struct SendGridMailer {
    client: EmailClient,
    frontend_url: String,
    verification_ttl: Duration,
    reset_ttl: Duration,
}

impl SendGridMailer {
    /// The TTLs only feed the "link will expire" line; the stores enforce them.
    pub fn new(client: EmailClient, frontend_url: &str, verification_ttl: Duration, reset_ttl: Duration) -> Self {
        Self {
            client,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            verification_ttl,
            reset_ttl,
        }
    }

    pub fn verification_link(&self, token: &str) -> String {
        format!("{}/verify-email?token={token}", self.frontend_url)
    }

    pub fn reset_link(&self, token: &str) -> String {
        format!("{}/reset-password?token={token}", self.frontend_url)
    }

    fn preferences_link(&self) -> String {
        format!("{}/email-preferences", self.frontend_url)
    }
}

fn expiry_notice(ttl: Duration) -> String {
    format!("This link will expire in {}.", describe_ttl(ttl))
}

/// Largest whole unit: "24 hours", "2 days", "30 minutes".
fn describe_ttl(ttl: Duration) -> String {
    let secs = ttl.num_seconds();
    let (count, unit) = if secs > 86_400 && secs % 86_400 == 0 {
        (secs / 86_400, "day")
    } else if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

struct Template<'a> {
    heading: &'a str,
    username: &'a str,
    intro: &'a str,
    button: &'a str,
    link: &'a str,
    expiry: &'a str,
    ignore: &'a str,
    preferences: &'a str,
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl Template<'_> {
    fn html(&self) -> String {
        let year = Utc::now().year();
        format!(
            r#"<!DOCTYPE html>
<html>
  <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
      <div style="background: #7c3aed; color: white; padding: 20px; text-align: center; border-radius: 5px 5px 0 0;">
        <h1>{heading}</h1>
      </div>
      <div style="background: #f9f9f9; padding: 30px; border-radius: 0 0 5px 5px;">
        <p>Hi <strong>{username}</strong>,</p>
        <p>{intro}</p>
        <p style="text-align: center;">
          <a href="{link}" style="display: inline-block; padding: 12px 30px; background-color: #7c3aed; color: white; text-decoration: none; border-radius: 5px; font-weight: bold;">{button}</a>
        </p>
        <p>Or copy and paste this link into your browser:</p>
        <p style="word-break: break-all; color: #7c3aed;">{link}</p>
        <p><strong>{expiry}</strong></p>
        <p>{ignore}</p>
      </div>
      <div style="text-align: center; margin-top: 20px; color: #666; font-size: 12px;">
        <p>WLU Connect - Connecting Laurier Students</p>
        <p><a href="{preferences}" style="color: #7c3aed;">Email Preferences</a></p>
        <p>&copy; {year} WLU Connect. All rights reserved.</p>
      </div>
    </div>
  </body>
</html>"#,
            heading = self.heading,
            username = escape_html(self.username),
            intro = self.intro,
            link = self.link,
            button = self.button,
            expiry = self.expiry,
            ignore = self.ignore,
            preferences = self.preferences,
        )
    }

    fn text(&self) -> String {
        format!(
            "{heading}\n\nHi {username},\n\n{intro}\n\n{button}: {link}\n\n{expiry}\n\n{ignore}\n\n---\nWLU Connect - Connecting Laurier Students\nEmail Preferences: {preferences}\n",
            heading = self.heading,
            username = self.username,
            intro = self.intro,
            button = self.button,
            link = self.link,
            expiry = self.expiry,
            ignore = self.ignore,
            preferences = self.preferences,
        )
    }
}

#[async_trait::async_trait]
impl AccountMailer for SendGridMailer {
    async fn send_verification_email(&self, to: &str, username: &str, token: &str) -> Result<(), EmailError> {
        let link = self.verification_link(token);
        let preferences = self.preferences_link();
        let expiry = expiry_notice(self.verification_ttl);
        let template = Template {
            heading: "Welcome to WLU Connect!",
            username,
            intro: "Thank you for signing up! Please verify your email address to activate your account.",
            button: "Verify Email Address",
            link: &link,
            expiry: &expiry,
            ignore: "If you didn't create this account, you can safely ignore this email.",
            preferences: &preferences,
        };
        self.client
            .send_email(to, "Verify Your WLU Connect Account", &template.html(), &template.text())
            .await?;
        tracing::info!(to = %to, "verification email sent");
        Ok(())
    }

    async fn send_password_reset_email(&self, to: &str, username: &str, token: &str) -> Result<(), EmailError> {
        let link = self.reset_link(token);
        let preferences = self.preferences_link();
        let expiry = expiry_notice(self.reset_ttl);
        let template = Template {
            heading: "Password Reset Request",
            username,
            intro: "We received a request to reset your password. Use the link below to choose a new one.",
            button: "Reset Password",
            link: &link,
            expiry: &expiry,
            ignore: "If you didn't request this, please ignore this email.",
            preferences: &preferences,
        };
        self.client
            .send_email(to, "Reset Your WLU Connect Password", &template.html(), &template.text())
            .await?;
        tracing::info!(to = %to, "password reset email sent");
        Ok(())
    }
}
