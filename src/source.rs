use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;

/// A single GET against a node endpoint. Query values are kept unescaped
/// here; escaping happens once when the URL is built.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Request {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: vec![],
            headers: vec![],
        }
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn url(&self, endpoint: &str) -> anyhow::Result<Url> {
        let base = format!("{}{}", endpoint.trim_end_matches('/'), self.path);
        let url = if self.query.is_empty() {
            Url::parse(&base)
        } else {
            Url::parse_with_params(&base, &self.query)
        };
        url.with_context(|| format!("Invalid request url {base}"))
    }
}

#[async_trait]
pub trait JsonSource: Send + Sync {
    async fn get_json(&self, request: &Request) -> anyhow::Result<serde_json::Value>;
}

pub async fn fetch<T: DeserializeOwned>(
    source: &dyn JsonSource,
    request: &Request,
) -> anyhow::Result<T> {
    let value = source.get_json(request).await?;
    serde_json::from_value(value)
        .with_context(|| format!("Unexpected response shape from {}", request.path))
}

pub struct HttpSource {
    endpoint: String,
    client: Client,
}

impl HttpSource {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP Client")?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl JsonSource for HttpSource {
    async fn get_json(&self, request: &Request) -> anyhow::Result<serde_json::Value> {
        let url = request.url(&self.endpoint)?;
        let mut builder = self.client.get(url.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to get {url}"))?;

        match response.status() {
            StatusCode::OK => response
                .json()
                .await
                .with_context(|| format!("Expect {url} to return json")),
            code => Err(anyhow!("error: {:?} from {}", code, url)),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::source::{JsonSource, Request};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned responses keyed by request and records what was asked.
    #[derive(Default)]
    pub struct FakeSource {
        responses: HashMap<Request, serde_json::Value>,
        requests: Mutex<Vec<Request>>,
    }

    impl FakeSource {
        pub fn with(mut self, request: Request, response: serde_json::Value) -> Self {
            self.responses.insert(request, response);
            self
        }

        pub fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }

        pub fn requests_to(&self, path_prefix: &str) -> usize {
            self.requests()
                .iter()
                .filter(|request| request.path.starts_with(path_prefix))
                .count()
        }
    }

    #[async_trait]
    impl JsonSource for FakeSource {
        async fn get_json(&self, request: &Request) -> anyhow::Result<serde_json::Value> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .get(request)
                .cloned()
                .ok_or_else(|| anyhow!("no canned response for {:?}", request))
        }
    }
}
