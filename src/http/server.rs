use log::info;
use rouille::{Request, Response};

use crate::{
    catalog::local::LocalCatalog,
    config::HttpConfig,
    domain::track::{TrackCode, TrackRecord},
    http::error::ApiError,
};

/// Serves a catalog over HTTP:
/// `GET /tracks`, `GET /tracks/{code}` and `GET /track?code={code}`
pub struct CatalogServer {
    catalog: LocalCatalog,
    pub config: HttpConfig,
}

impl CatalogServer {
    pub fn new(catalog: LocalCatalog, config: HttpConfig) -> Self {
        Self { catalog, config }
    }

    pub fn run(self) {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        rouille::start_server(addr, move |request| self.handle_request(request));
    }

    pub fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let response = rouille::router!(request,
            (GET) (/tracks) => {
                self.handle_list_tracks()
            },
            (GET) (/tracks/{code: String}) => {
                self.handle_get_track(Some(code))
            },
            (GET) (/track) => {
                self.handle_get_track(request.get_param("code"))
            },
            _ => ApiError::RouteNotFound.into_response()
        );
        let response = response.with_additional_header("Access-Control-Allow-Origin", "*");

        info!("Response: {} {}", request.method(), response.status_code);
        response
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.url());
    }

    fn handle_list_tracks(&self) -> Response {
        Response::json(&self.catalog.list())
    }

    fn handle_get_track(&self, code: Option<String>) -> Response {
        match self.find_track(code) {
            Ok(track) => Response::json(&track),
            Err(e) => e.into_response(),
        }
    }

    /// codes are trimmed, then matched exactly
    fn find_track(&self, code: Option<String>) -> Result<TrackRecord, ApiError> {
        let parsed = code.as_deref().and_then(TrackCode::parse);
        parsed
            .and_then(|c| self.catalog.get(&c).cloned())
            .ok_or(ApiError::TrackNotFound(code))
    }
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}
