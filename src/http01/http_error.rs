use crate::error::Error;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

pub(crate) struct HttpError(Error);

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match err {
            Error::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{err}"),
        )
            .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let resp = HttpError::from(Error::ResourceNotFound("/foo".to_string())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn other_errors_map_to_500() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let resp = HttpError::from(io).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
