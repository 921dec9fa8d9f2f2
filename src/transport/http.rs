//! REST backend for the [`RequestSender`] contract, speaking a
//! management-over-REST endpoint.

use super::{
    EntityAttributes, EntityQuery, ReportRow, RequestSender, TransportError, TransportKind,
};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, StatusCode};
use serde_json::Value as Json;
use std::time::Duration;
use url::Url;

pub struct HttpRequestSender {
    base: Url,
    client: reqwest::Client,
}

impl HttpRequestSender {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base, client })
    }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        let joined = format!(
            "{}/{}",
            self.base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }

    fn items_of(body: Json) -> Vec<Json> {
        match body {
            Json::Array(items) => items,
            Json::Object(mut object) => match object.remove("items") {
                Some(Json::Array(items)) => items,
                _ => vec![Json::Object(object)],
            },
            other => vec![other],
        }
    }
}

#[async_trait]
impl RequestSender for HttpRequestSender {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn get_attributes(
        &self,
        query: &EntityQuery,
        names: &[&str],
    ) -> Result<Vec<EntityAttributes>, TransportError> {
        let mut url = self.url_for(query.collection)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &query.params {
                pairs.append_pair(key, value);
            }
            if !names.is_empty() {
                pairs.append_pair("fields", &names.join(","));
            }
        }
        let response = self.client.get(url).send().await?;
        // An optional subsystem that is absent is an empty result, not
        // a retrieval failure.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body: Json = response.error_for_status()?.json().await?;
        Ok(Self::items_of(body)
            .into_iter()
            .filter_map(EntityAttributes::from_object)
            .collect())
    }

    async fn invoke_report(&self, descriptor: &str) -> Result<Vec<ReportRow>, TransportError> {
        let url = self.url_for("reports")?;
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/xml")
            .body(descriptor.to_owned())
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::ReportExecution(format!("{status}: {body}")));
        }
        let body: Json = response.json().await?;
        let rows = Self::items_of(body)
            .into_iter()
            .filter_map(|item| match item {
                Json::Object(object) => Some(object.into_iter().collect::<ReportRow>()),
                _ => None,
            })
            .collect();
        Ok(rows)
    }

    async fn get_structured(&self, path: &str) -> Result<Json, TransportError> {
        let url = self.url_for(path)?;
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }
}
