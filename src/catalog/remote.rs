//! Client for the remote catalog service
//!
//! Talks to `GET /tracks` and `GET /tracks/{code}`, see `crate::http::server`.

use std::time::Duration;

use reqwest::{StatusCode, Url, blocking::Client};

use crate::{
    catalog::error::RemoteError,
    domain::track::{TrackCode, TrackRecord},
};

const USER_AGENT: &str = concat!("unheard/", env!("CARGO_PKG_VERSION"));

/// Source of track records that lives behind the network.
pub trait RemoteCatalog: Send + Sync {
    /// fetches a single track; one request per call
    fn fetch_track(&self, code: &TrackCode) -> Result<TrackRecord, RemoteError>;

    /// fetches the whole catalog
    fn fetch_all(&self) -> Result<Vec<TrackRecord>, RemoteError>;
}

pub struct HttpCatalog {
    http_client: Client,
    base_url: Url,
}

impl HttpCatalog {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let base_url =
            Url::parse(base_url).map_err(|e| RemoteError::Url(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Url(base_url.to_string()));
        }

        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// appends percent-encoded path segments to the base url
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> Result<reqwest::blocking::Response, RemoteError> {
        log::debug!("GET {url}");
        self.http_client
            .get(url)
            .send()
            .map_err(|e| RemoteError::Network(e.to_string()))
    }
}

impl RemoteCatalog for HttpCatalog {
    fn fetch_track(&self, code: &TrackCode) -> Result<TrackRecord, RemoteError> {
        let response = self.get(self.endpoint(&["tracks", code.as_str()])?)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::TrackNotFound(code.clone()));
        }
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }

        response
            .json()
            .map_err(|e| RemoteError::Parse(e.to_string()))
    }

    fn fetch_all(&self) -> Result<Vec<TrackRecord>, RemoteError> {
        let response = self.get(self.endpoint(&["tracks"])?)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }

        response
            .json()
            .map_err(|e| RemoteError::Parse(e.to_string()))
    }
}
