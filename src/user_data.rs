use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{PilotError, Result};
use crate::types::UserRecord;

const SERVICE: &str = "user-data source";

/// Where the values typed into forms come from.
#[async_trait]
pub trait UserDataSource: Send + Sync {
    async fn fetch(&self) -> Result<UserRecord>;
}

/// GETs a JSON array of user records and keeps the first one.
pub struct HttpUserData {
    client: Client,
    url: String,
}

impl HttpUserData {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PilotError::upstream(SERVICE, e))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl UserDataSource for HttpUserData {
    async fn fetch(&self) -> Result<UserRecord> {
        debug!(url = %self.url, "fetching user data");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PilotError::upstream(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PilotError::upstream(SERVICE, format!("HTTP {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PilotError::upstream(SERVICE, format!("unreadable body: {e}")))?;
        let record = first_record(body)?;
        info!(fields = record.len(), "user data loaded");
        Ok(record)
    }
}

fn first_record(body: Value) -> Result<UserRecord> {
    match body {
        Value::Array(records) => match records.into_iter().next() {
            Some(Value::Object(record)) => Ok(record),
            Some(_) => Err(PilotError::ResponseShapeError(
                "first user record is not an object".to_string(),
            )),
            None => Err(PilotError::ResponseShapeError(
                "user-data source returned no records".to_string(),
            )),
        },
        _ => Err(PilotError::ResponseShapeError(
            "user-data source did not return an array".to_string(),
        )),
    }
}
