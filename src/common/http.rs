use std::time::Duration;

use reqwest::{Client, Error};

const DEFAULT_USER_AGENT: &str = concat!("airwave/", env!("CARGO_PKG_VERSION"));

pub struct HttpClient;

impl HttpClient {
  pub fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
  }

  /// Client for live streams: bounded connect time, no total timeout since
  /// a radio body never ends.
  pub fn new() -> Result<Client, Error> {
    Client::builder()
      .user_agent(Self::default_user_agent())
      .connect_timeout(Duration::from_secs(10))
      .read_timeout(Duration::from_secs(30))
      .build()
  }
}
