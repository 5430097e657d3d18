//! Connection defaults and tunables, replacing the original
//! implementation's module-level globals with a single configuration
//! value the caller builds up before connecting.

use std::time::Duration;

use url::Url;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9020;
pub const DEFAULT_WHOIS: &str = "/json_data";
/// How long a command waits for its response before timing out.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
/// How long a caller waits for the connection to become ready to send
/// before giving up.
pub const SEND_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub whois: String,
    pub user: Option<String>,
    pub request_timeout: Duration,
    pub send_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            whois: DEFAULT_WHOIS.to_owned(),
            user: None,
            request_timeout: REQUEST_TIMEOUT,
            send_grace: SEND_GRACE,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_whois(mut self, whois: impl Into<String>) -> Self {
        self.whois = whois.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_send_grace(mut self, grace: Duration) -> Self {
        self.send_grace = grace;
        self
    }

    pub fn ws_url(&self) -> std::result::Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("ws://{}:{}", self.host, self.port))?;
        url.set_path(&self.whois);
        if let Some(user) = &self.user {
            url.query_pairs_mut().append_pair("user", user);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_the_default_url() {
        let url = ClientConfig::new().ws_url().unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9020/json_data");
    }

    #[test]
    fn appends_user_as_a_query_param() {
        let url = ClientConfig::new().with_user("alice").ws_url().unwrap();
        assert_eq!(url.query_pairs().find(|(k, _)| k == "user").unwrap().1, "alice");
    }
}
