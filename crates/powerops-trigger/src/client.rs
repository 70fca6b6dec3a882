use async_trait::async_trait;
use powerops_config::{Settings, TriggerMode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use url::Url;

use crate::error::TriggerError;

const RUN_SHOP_PATH: &str = "run-shop";
const RUN_SHOP_AS_SERVICE_PATH: &str = "run-shop-as-service";

/// Where and how to reach the compute service.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
  pub service_url: Url,
  pub project: String,
  pub shop_version: String,
  pub mode: TriggerMode,
  pub token: Option<String>,
}

impl TriggerConfig {
  pub fn from_settings(settings: &Settings) -> Result<Self, TriggerError> {
    let service_url = Url::parse(&settings.service_url).map_err(|e| TriggerError::InvalidUrl {
      url: settings.service_url.clone(),
      message: e.to_string(),
    })?;

    if !matches!(service_url.scheme(), "http" | "https") {
      return Err(TriggerError::InvalidUrl {
        url: settings.service_url.clone(),
        message: format!("unsupported scheme '{}'", service_url.scheme()),
      });
    }

    Ok(Self {
      service_url,
      project: settings.project.clone(),
      shop_version: settings.shop_version.clone(),
      mode: settings.trigger_mode,
      token: settings.token.clone(),
    })
  }
}

/// What the compute service answered to a successful trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResponse {
  /// External id of the triggered run.
  pub run: String,
  pub status: u16,
  /// Response body as JSON, or as a JSON string if it was not JSON.
  pub body: serde_json::Value,
}

/// Something that can ask the compute service to execute a run.
#[async_trait]
pub trait Dispatch: Send + Sync {
  /// Trigger the run with the given event external id.
  async fn dispatch(&self, run_external_id: &str) -> Result<TriggerResponse, TriggerError>;
}

/// HTTP client for the compute service's trigger endpoints.
pub struct TriggerClient {
  http: Client,
  config: TriggerConfig,
}

impl TriggerClient {
  pub fn new(config: TriggerConfig) -> Self {
    Self {
      http: Client::new(),
      config,
    }
  }

  pub fn from_settings(settings: &Settings) -> Result<Self, TriggerError> {
    Ok(Self::new(TriggerConfig::from_settings(settings)?))
  }

  pub fn config(&self) -> &TriggerConfig {
    &self.config
  }

  /// `{service_url}/{project}/run-shop[-as-service]`
  pub fn endpoint(&self) -> Result<Url, TriggerError> {
    let path = match self.config.mode {
      TriggerMode::Standard => RUN_SHOP_PATH,
      TriggerMode::AsService => RUN_SHOP_AS_SERVICE_PATH,
    };

    let base = &self.config.service_url;
    let mut url = base.clone();
    url
      .path_segments_mut()
      .map_err(|_| TriggerError::InvalidUrl {
        url: base.to_string(),
        message: "url cannot be a base".to_string(),
      })?
      .pop_if_empty()
      .push(&self.config.project)
      .push(path);
    Ok(url)
  }

  /// JSON body sent for the given run.
  pub fn request_body(&self, run_external_id: &str) -> serde_json::Value {
    match self.config.mode {
      TriggerMode::Standard => serde_json::json!({
        "shopEventExternalId": run_external_id,
        "cogShopVersion": self.config.shop_version,
      }),
      TriggerMode::AsService => serde_json::json!({
        "mode": "asset",
        "runs": [{ "event_external_id": run_external_id }],
      }),
    }
  }
}

#[async_trait]
impl Dispatch for TriggerClient {
  #[instrument(
    name = "trigger_dispatch",
    skip(self),
    fields(project = %self.config.project, mode = ?self.config.mode)
  )]
  async fn dispatch(&self, run_external_id: &str) -> Result<TriggerResponse, TriggerError> {
    let url = self.endpoint()?;

    let mut request = self
      .http
      .post(url)
      .json(&self.request_body(run_external_id));
    if let Some(token) = &self.config.token {
      request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
      error!(run = %run_external_id, status = status.as_u16(), "trigger rejected");
      return Err(TriggerError::Status {
        run: run_external_id.to_string(),
        status: status.as_u16(),
        body,
      });
    }

    // Try to parse body as JSON, fall back to string
    let body = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));

    info!(run = %run_external_id, status = status.as_u16(), "run triggered");
    Ok(TriggerResponse {
      run: run_external_id.to_string(),
      status: status.as_u16(),
      body,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(url: &str, mode: TriggerMode) -> TriggerClient {
    let mut settings = Settings::new("power-ops-dev", url);
    settings.trigger_mode = mode;
    settings.shop_version = "15.3.0.0".to_string();
    TriggerClient::from_settings(&settings).unwrap()
  }

  #[test]
  fn test_endpoint_standard() {
    let client = client("https://api.example.com", TriggerMode::Standard);
    assert_eq!(
      client.endpoint().unwrap().as_str(),
      "https://api.example.com/power-ops-dev/run-shop"
    );
  }

  #[test]
  fn test_endpoint_keeps_base_path() {
    let client = client("https://api.example.com/v1/", TriggerMode::AsService);
    assert_eq!(
      client.endpoint().unwrap().as_str(),
      "https://api.example.com/v1/power-ops-dev/run-shop-as-service"
    );
  }

  #[test]
  fn test_request_bodies() {
    let standard = client("https://a", TriggerMode::Standard).request_body("RUN_1");
    assert_eq!(
      standard,
      serde_json::json!({"shopEventExternalId": "RUN_1", "cogShopVersion": "15.3.0.0"})
    );

    let as_service = client("https://a", TriggerMode::AsService).request_body("RUN_1");
    assert_eq!(
      as_service,
      serde_json::json!({"mode": "asset", "runs": [{"event_external_id": "RUN_1"}]})
    );
  }

  #[test]
  fn test_rejects_bad_urls() {
    let settings = Settings::new("p", "not a url");
    assert!(matches!(
      TriggerClient::from_settings(&settings),
      Err(TriggerError::InvalidUrl { .. })
    ));

    let settings = Settings::new("p", "ftp://files.example.com");
    assert!(matches!(
      TriggerClient::from_settings(&settings),
      Err(TriggerError::InvalidUrl { .. })
    ));
  }
}
