use crate::domain::ports::{ChallengeSolver, FetchRequest, FetchResponse, HttpMethod};
use crate::utils::error::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize)]
struct SolverReply {
    status: String,
    #[serde(default)]
    message: String,
    solution: Option<Solution>,
}

#[derive(Debug, Deserialize)]
struct Solution {
    status: u16,
    #[serde(default)]
    response: String,
}

/// FlareSolverr 相容的挑戰求解服務（`POST /v1`）
pub struct FlareSolverrClient {
    client: Client,
    endpoint: String,
    max_timeout: Duration,
}

impl FlareSolverrClient {
    pub fn new(endpoint: impl Into<String>, max_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            // 求解器本身需要時間執行瀏覽器
            .timeout(max_timeout + Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            max_timeout,
        })
    }

    fn target_url(request: &FetchRequest) -> Result<String, TransportError> {
        let mut url = Url::parse(&request.url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", request.url, e)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url.into())
    }
}

#[async_trait]
impl ChallengeSolver for FlareSolverrClient {
    async fn solve(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        let mut payload = json!({
            "cmd": "request.get",
            "url": Self::target_url(request)?,
            "maxTimeout": self.max_timeout.as_millis() as u64,
        });
        if request.method == HttpMethod::Post {
            payload["cmd"] = json!("request.post");
            payload["postData"] = json!(request.body.clone().unwrap_or_default());
        }

        let reply: SolverReply = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?
            .json()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("Invalid solver reply: {}", e)))?;

        match reply.solution {
            Some(solution) if reply.status == "ok" => Ok(FetchResponse {
                status: solution.status,
                body: solution.response,
            }),
            _ => Err(TransportError::Blocked {
                url: request.url.clone(),
                reason: format!("solver status '{}': {}", reply.status, reply.message),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_url_includes_query() {
        let request = FetchRequest::get("https://store.example/products.json").with_query("limit", "250");
        assert_eq!(
            FlareSolverrClient::target_url(&request).unwrap(),
            "https://store.example/products.json?limit=250"
        );
    }

    #[test]
    fn test_target_url_rejects_garbage() {
        let request = FetchRequest::get("not a url");
        assert!(matches!(
            FlareSolverrClient::target_url(&request),
            Err(TransportError::InvalidUrl(_))
        ));
    }
}
