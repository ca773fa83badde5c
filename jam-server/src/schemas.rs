use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use jam_collab::{PlaybackCommand, Privacy, VoteDirection};
use serde::{de::DeserializeOwned, Deserialize};
use validator::Validate;

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewSessionSchema {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(length(min = 1, max = 20))]
    pub nickname: String,
    pub privacy: Privacy,
    #[validate(length(min = 1, max = 32))]
    pub access_code: Option<String>,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinSessionSchema {
    #[validate(length(min = 1, max = 16))]
    pub code: String,
    #[validate(length(min = 1, max = 20))]
    pub nickname: String,
    #[validate(length(min = 1, max = 32))]
    pub access_code: Option<String>,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddTrackSchema {
    #[validate(length(min = 1, max = 512))]
    pub track_ref: String,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VoteSchema {
    pub direction: VoteDirection,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReactionSchema {
    #[validate(length(min = 1, max = 16))]
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
#[serde(
    rename_all = "camelCase",
    rename_all_fields = "camelCase",
    tag = "action",
    deny_unknown_fields
)]
pub enum PlaybackActionSchema {
    Play,
    Pause,
    Seek { position_ms: u64 },
    Skip,
}

impl From<PlaybackActionSchema> for PlaybackCommand {
    fn from(value: PlaybackActionSchema) -> Self {
        match value {
            PlaybackActionSchema::Play => Self::Play,
            PlaybackActionSchema::Pause => Self::Pause,
            PlaybackActionSchema::Seek { position_ms } => Self::Seek { position_ms },
            PlaybackActionSchema::Skip => Self::Skip,
        }
    }
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}
