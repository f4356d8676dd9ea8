use serde::Deserialize;

/// Fields of a provider inbound-parse webhook (`application/x-www-form-urlencoded`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundEmail {
    pub to: Option<String>,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundQuery {
    pub secret: Option<String>,
}
