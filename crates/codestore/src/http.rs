use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::{CodeKey, CodeStore, StoreError, UserIdentity};

/// Store backed by a web endpoint that accepts JSON `action` requests.
#[derive(Debug, Clone)]
pub struct HttpCodeStore {
    http: Client,
    endpoint: Url,
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
enum Request<'a> {
    #[serde(rename_all = "camelCase")]
    SaveCode {
        code_name: &'a str,
        code_content: &'a str,
        nickname: &'a str,
        uuid: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    LoadCode {
        code_name: &'a str,
        nickname: &'a str,
        uuid: Uuid,
    },
    GetSavedCodes { nickname: &'a str, uuid: Uuid },
}

impl HttpCodeStore {
    pub fn new(endpoint: &str, timeout: Option<Duration>) -> Result<Self, StoreError> {
        let endpoint =
            Url::parse(endpoint).map_err(|_| StoreError::InvalidEndpoint(endpoint.to_string()))?;
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn post(&self, request: &Request<'_>) -> Result<String, StoreError> {
        debug!(endpoint = %self.endpoint, ?request, "remote store request");
        let body = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()?
            .error_for_status()?
            .text()?;
        Ok(body)
    }
}

impl CodeStore for HttpCodeStore {
    fn save(&self, key: &CodeKey, source: &str) -> Result<(), StoreError> {
        self.post(&Request::SaveCode {
            code_name: &key.name,
            code_content: source,
            nickname: &key.user.nickname,
            uuid: key.user.uuid,
        })?;
        Ok(())
    }

    fn load(&self, key: &CodeKey) -> Result<String, StoreError> {
        let body = self.post(&Request::LoadCode {
            code_name: &key.name,
            nickname: &key.user.nickname,
            uuid: key.user.uuid,
        })?;
        if body.trim().is_empty() {
            return Err(StoreError::NotFound(key.name.clone()));
        }
        Ok(body)
    }

    fn list(&self, user: &UserIdentity) -> Result<Vec<String>, StoreError> {
        let body = self.post(&Request::GetSavedCodes {
            nickname: &user.nickname,
            uuid: user.uuid,
        })?;
        parse_saved_codes(&body)
    }
}

/// The endpoint answers with an object keyed by code name; a plain array of
/// names is accepted too.
fn parse_saved_codes(body: &str) -> Result<Vec<String>, StoreError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|err| {
        let snippet = body.chars().take(200).collect::<String>();
        StoreError::Protocol(format!("{err}; first 200 bytes: {snippet}"))
    })?;
    let mut names = match value {
        serde_json::Value::Object(map) => map.into_iter().map(|(name, _)| name).collect(),
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        serde_json::Value::Null => Vec::new(),
        other => {
            return Err(StoreError::Protocol(format!(
                "expected an object of saved codes, got {other}"
            )))
        }
    };
    names.sort();
    Ok(names)
}
