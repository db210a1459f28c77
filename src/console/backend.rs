use crate::console::config::Config;
use crate::console::error::{ConsoleError, Result};
use crate::console::nodes::{NodeCatalog, NodeList};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use tracing::{debug, info, warn};

/// Form fields sent with a request, in order
pub type Form = Vec<(String, String)>;

/// The HTTP endpoints of the test backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Run the active app's client; returns its combined output
    async fn command(&self, form: &[(String, String)]) -> Result<String>;

    /// Fetch a named node list
    async fn get_nodes(&self, list: NodeList) -> Result<NodeCatalog>;

    /// Description of the newest image
    async fn txt_last(&self) -> Result<String>;

    /// The newest image as an HTML fragment
    async fn img_last(&self) -> Result<String>;
}

/// reqwest-based implementation of Backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()?;

        debug!(backend = %config.backend, "Backend client created");
        Ok(Self {
            client,
            base_url: config.backend.trim_end_matches('/').to_string(),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_form(&self, path: &str, form: &[(String, String)]) -> Result<String> {
        let url = self.url(path);
        let response = self.client.post(&url).form(form).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Request failed");
            ConsoleError::Http(e)
        })?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ConsoleError::Upstream(format!(
                "{} answered {}: {}",
                path,
                status,
                body.trim()
            )));
        }
        Ok(body)
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = self.url(path);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ConsoleError::Upstream(format!("{} answered {}", path, status)));
        }
        Ok(body)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn command(&self, form: &[(String, String)]) -> Result<String> {
        info!(fields = form.len(), "Sending command");
        let body = self.post_form("/command", form).await?;
        debug!(bytes = body.len(), "Command output received");
        Ok(body)
    }

    async fn get_nodes(&self, list: NodeList) -> Result<NodeCatalog> {
        let form = [("node_type".to_string(), list.name().to_string())];
        let body = self.post_form("/getnodes", &form).await?;
        NodeCatalog::from_json(&body)
    }

    async fn txt_last(&self) -> Result<String> {
        self.get_text("/txtlast").await
    }

    async fn img_last(&self) -> Result<String> {
        self.get_text("/imglast").await
    }
}


#[cfg(test)]
pub use tests::MockBackend;
