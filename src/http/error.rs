use rouille::Response;
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    /// no track with the requested code; `None` if no code was given at all
    TrackNotFound(Option<String>),
    RouteNotFound,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::TrackNotFound(_) | ApiError::RouteNotFound => 404,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::TrackNotFound(code) => Response::json(&ErrorBody {
                error: "Track not found",
                code,
            })
            .with_status_code(status),

            ApiError::RouteNotFound => Response::empty_404(),
        }
    }
}
