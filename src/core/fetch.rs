use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::core::auth::{read_credentials, CodexCredentials};
use crate::core::config::{AppConfig, EndpointSettings};
use crate::core::error::UsageError;
use crate::core::selector::SelectionPolicy;

const ACCOUNT_HEADER: &str = "ChatGPT-Account-Id";

pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Value, UsageError>> + Send>>;

/// Source of raw usage JSON for a given model.
///
/// The returned future owns everything it needs so the coordinator can keep
/// it pending across loop iterations.
pub trait UsageSource: Send + Sync {
    fn fetch(&self, model_id: &str) -> FetchFuture;
}

/// Validate that a resolved endpoint URL uses HTTPS.
///
/// Must be called before sending credentials, to prevent exfiltration over
/// plain HTTP or other schemes.
pub fn validate_endpoint(url: &str) -> Result<(), UsageError> {
    if !url.starts_with("https://") {
        return Err(UsageError::InsecureEndpoint(url.to_string()));
    }
    Ok(())
}

/// Where to ask for usage: one URL, plus an optional second try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPlan {
    pub primary: String,
    pub fallback: Option<String>,
}

impl EndpointPlan {
    fn single(url: &str) -> Self {
        Self {
            primary: url.to_string(),
            fallback: None,
        }
    }
}

/// Resolve the endpoint(s) to query for `model_id`.
pub fn endpoint_plan(
    endpoints: &EndpointSettings,
    policy: &SelectionPolicy,
    model_id: &str,
) -> EndpointPlan {
    if !policy.targets_spark(model_id) {
        return EndpointPlan::single(&endpoints.usage_url);
    }
    match endpoints.spark_usage_url() {
        Some(spark) if endpoints.spark_endpoint_fallback && spark != endpoints.usage_url => {
            EndpointPlan {
                primary: spark.to_string(),
                fallback: Some(endpoints.usage_url.clone()),
            }
        }
        Some(spark) => EndpointPlan::single(spark),
        None => EndpointPlan::single(&endpoints.usage_url),
    }
}

/// Run `fetch_one` against the primary URL, then the fallback if it failed.
pub async fn fetch_with_fallback<F, Fut>(
    plan: &EndpointPlan,
    mut fetch_one: F,
) -> Result<Value, UsageError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Value, UsageError>>,
{
    let err = match fetch_one(plan.primary.clone()).await {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };
    let Some(fallback) = &plan.fallback else {
        return Err(err);
    };
    // Missing credentials will not improve on another URL.
    if err.is_credentials_missing() {
        return Err(err);
    }
    warn!(url = plan.primary.as_str(), error = %err, "usage endpoint failed, trying fallback");
    fetch_one(fallback.clone()).await
}

/// Fetches usage from the ChatGPT backend with OAuth credentials from disk.
#[derive(Clone)]
pub struct HttpUsageSource {
    client: reqwest::Client,
    auth_path: PathBuf,
    endpoints: EndpointSettings,
    policy: SelectionPolicy,
}

impl HttpUsageSource {
    pub fn new(config: &AppConfig) -> Result<Self, UsageError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.endpoint.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            auth_path: config.refresh.auth_path(),
            endpoints: config.endpoint.clone(),
            policy: config.selection.clone(),
        })
    }
}

async fn fetch_json(
    client: &reqwest::Client,
    url: &str,
    creds: &CodexCredentials,
) -> Result<Value, UsageError> {
    validate_endpoint(url)?;
    debug!(url, "requesting usage");

    let response = client
        .get(url)
        .header("Accept", "*/*")
        .header("Authorization", format!("Bearer {}", creds.access_token))
        .header(ACCOUNT_HEADER, &creds.account_id)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(UsageError::RequestFailed {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

impl UsageSource for HttpUsageSource {
    fn fetch(&self, model_id: &str) -> FetchFuture {
        let client = self.client.clone();
        let auth_path = self.auth_path.clone();
        let plan = endpoint_plan(&self.endpoints, &self.policy, model_id);
        Box::pin(async move {
            let creds = read_credentials(&auth_path).await?;
            let (client, creds) = (&client, &creds);
            fetch_with_fallback(&plan, move |url| async move {
                fetch_json(client, &url, creds).await
            })
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::selector::SPARK_MODEL_ID;
    use serde_json::json;

    const SPARK_URL: &str = "https://example.com/spark";

    fn plan(endpoints: &EndpointSettings, model_id: &str) -> EndpointPlan {
        endpoint_plan(endpoints, &SelectionPolicy::default(), model_id)
    }

    fn server_error(url: &str) -> UsageError {
        UsageError::RequestFailed {
            status: 503,
            url: url.to_string(),
        }
    }

    #[test]
    fn validate_endpoint_accepts_https() {
        assert!(validate_endpoint("https://chatgpt.com/backend-api/wham/usage").is_ok());
    }

    #[test]
    fn validate_endpoint_rejects_other_schemes() {
        assert!(validate_endpoint("http://evil.com").is_err());
        assert!(validate_endpoint("").is_err());
        assert!(validate_endpoint("file:///etc/passwd").is_err());
        assert!(validate_endpoint("chatgpt.com/backend-api").is_err());
    }

    #[test]
    fn standard_model_uses_standard_endpoint() {
        let endpoints = EndpointSettings {
            spark_usage_url: Some(SPARK_URL.into()),
            ..EndpointSettings::default()
        };
        assert_eq!(
            plan(&endpoints, "gpt-5.3-codex"),
            EndpointPlan::single(&endpoints.usage_url)
        );
    }

    #[test]
    fn spark_model_without_dedicated_endpoint_uses_standard() {
        let endpoints = EndpointSettings::default();
        assert_eq!(
            plan(&endpoints, SPARK_MODEL_ID),
            EndpointPlan::single(&endpoints.usage_url)
        );
    }

    #[test]
    fn spark_model_dedicated_endpoint_without_fallback() {
        let endpoints = EndpointSettings {
            spark_usage_url: Some(SPARK_URL.into()),
            ..EndpointSettings::default()
        };
        assert_eq!(
            plan(&endpoints, SPARK_MODEL_ID),
            EndpointPlan::single(SPARK_URL)
        );
    }

    #[test]
    fn spark_model_dedicated_endpoint_with_fallback() {
        let endpoints = EndpointSettings {
            spark_usage_url: Some(SPARK_URL.into()),
            spark_endpoint_fallback: true,
            ..EndpointSettings::default()
        };
        let resolved = plan(&endpoints, SPARK_MODEL_ID);
        assert_eq!(resolved.primary, SPARK_URL);
        assert_eq!(resolved.fallback, Some(endpoints.usage_url.clone()));
    }

    #[tokio::test]
    async fn failed_primary_falls_back_to_standard_endpoint() {
        let plan = EndpointPlan {
            primary: SPARK_URL.to_string(),
            fallback: Some("https://example.com/usage".to_string()),
        };
        let mut calls = Vec::new();
        let value = fetch_with_fallback(&plan, |url| {
            calls.push(url.clone());
            let result = if url == SPARK_URL {
                Err(server_error(&url))
            } else {
                Ok(json!({"rate_limit": {"allowed": true}}))
            };
            async move { result }
        })
        .await
        .unwrap();

        assert_eq!(value["rate_limit"]["allowed"], json!(true));
        assert_eq!(calls, vec![SPARK_URL, "https://example.com/usage"]);
    }

    #[tokio::test]
    async fn successful_primary_skips_fallback() {
        let plan = EndpointPlan {
            primary: SPARK_URL.to_string(),
            fallback: Some("https://example.com/usage".to_string()),
        };
        let mut calls = Vec::new();
        fetch_with_fallback(&plan, |url| {
            calls.push(url);
            async { Ok(json!({})) }
        })
        .await
        .unwrap();
        assert_eq!(calls, vec![SPARK_URL]);
    }

    #[tokio::test]
    async fn failure_without_fallback_returns_primary_error() {
        let plan = EndpointPlan::single(SPARK_URL);
        let mut attempts = 0;
        let err = fetch_with_fallback(&plan, |url| {
            attempts += 1;
            let err = server_error(&url);
            async move { Err(err) }
        })
        .await
        .unwrap_err();
        assert_eq!(attempts, 1);
        assert!(matches!(err, UsageError::RequestFailed { status: 503, .. }));
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.refresh.auth_path = Some(dir.path().join("auth.json"));
        let source = HttpUsageSource::new(&config).unwrap();
        let err = source.fetch("gpt-5.3-codex").await.unwrap_err();
        assert!(err.is_credentials_missing());
    }

    #[tokio::test]
    async fn insecure_endpoint_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let auth = dir.path().join("auth.json");
        std::fs::write(
            &auth,
            r#"{"openai": {"type": "oauth", "access": "at", "accountId": "acc"}}"#,
        )
        .unwrap();
        let mut config = AppConfig::default();
        config.refresh.auth_path = Some(auth);
        config.endpoint.usage_url = "http://localhost:1/usage".into();
        let source = HttpUsageSource::new(&config).unwrap();
        let err = source.fetch("gpt-5.3-codex").await.unwrap_err();
        assert!(matches!(err, UsageError::InsecureEndpoint(_)));
    }
}
