use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use jam_collab::ParticipantId;

use crate::ServerContext;

/// The header carrying the id handed out when creating or joining a session
pub const PARTICIPANT_HEADER: &str = "x-jam-participant";

/// The participant making the request
#[derive(Debug, Clone, Copy)]
pub struct Requester(pub ParticipantId);

impl Requester {
    pub fn id(&self) -> ParticipantId {
        self.0
    }

    fn from_headers(headers: &HeaderMap) -> Result<Self, (StatusCode, &'static str)> {
        let value = headers
            .get(PARTICIPANT_HEADER)
            .ok_or((StatusCode::UNAUTHORIZED, "Missing participant"))?
            .to_str()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Participant must be a numeric id"))?;

        value
            .trim()
            .parse()
            .map(Self)
            .map_err(|_| (StatusCode::BAD_REQUEST, "Participant must be a numeric id"))
    }
}

#[async_trait]
impl FromRequestParts<ServerContext> for Requester {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn reads_the_participant_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            Requester::from_headers(&headers).unwrap_err().0,
            StatusCode::UNAUTHORIZED
        );

        headers.insert(PARTICIPANT_HEADER, HeaderValue::from_static("kat"));
        assert_eq!(
            Requester::from_headers(&headers).unwrap_err().0,
            StatusCode::BAD_REQUEST
        );

        headers.insert(
            PARTICIPANT_HEADER,
            HeaderValue::from_bytes(b"\xff42").unwrap(),
        );
        assert_eq!(
            Requester::from_headers(&headers).unwrap_err().0,
            StatusCode::BAD_REQUEST
        );

        headers.insert(PARTICIPANT_HEADER, HeaderValue::from_static(" 42 "));
        assert_eq!(
            Requester::from_headers(&headers).unwrap().id(),
            ParticipantId::from_value(42)
        );
    }
}
