//! Legacy REST transport.
//!
//! `GET /api/tool/{name}` and `GET /api/toolset/{name}` return manifests;
//! `POST /api/tool/{name}/invoke` runs a tool and answers `{result}` or
//! `{error}`.

use {
    async_trait::async_trait,
    reqwest::{Client, header::HeaderMap},
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::{
    error::{Error, Result},
    manifest::Manifest,
    traits::Transport,
};

pub struct RestTransport {
    client: Client,
    base_url: String,
}

impl RestTransport {
    pub fn new(base_url: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_manifest(&self, url: String, headers: HeaderMap) -> Result<Manifest> {
        debug!(url = %url, "fetching manifest");
        let resp = self.client.get(&url).headers(headers).send().await?;
        let body = Self::success_body(resp).await?;
        let manifest: Manifest =
            serde_json::from_str(&body).map_err(|e| Error::ManifestStructure(e.to_string()))?;
        manifest.validate_with_descriptions()?;
        Ok(manifest)
    }

    async fn success_body(resp: reqwest::Response) -> Result<String> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl Transport for RestTransport {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn tool_get(&self, tool_name: &str, headers: HeaderMap) -> Result<Manifest> {
        let url = format!("{}/api/tool/{tool_name}", self.base_url);
        self.fetch_manifest(url, headers).await
    }

    async fn tools_list(
        &self,
        toolset_name: Option<&str>,
        headers: HeaderMap,
    ) -> Result<Manifest> {
        let url = format!(
            "{}/api/toolset/{}",
            self.base_url,
            toolset_name.unwrap_or_default()
        );
        self.fetch_manifest(url, headers).await
    }

    async fn tool_invoke(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        headers: HeaderMap,
    ) -> Result<String> {
        let url = format!("{}/api/tool/{tool_name}/invoke", self.base_url);
        debug!(tool = %tool_name, url = %url, "invoking tool");
        let resp = self
            .client
            .post(&url)
            .headers(headers)
            .json(&arguments)
            .send()
            .await?;
        let body = Self::success_body(resp).await?;
        let mut envelope: Map<String, Value> = serde_json::from_str(&body)?;

        if let Some(err) = envelope.remove("error") {
            return Err(Error::message(match err {
                Value::String(message) => message,
                other => other.to_string(),
            }));
        }
        Ok(match envelope.remove("result") {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => Value::Null.to_string(),
        })
    }
}
