use std::{
    env,
    error::Error,
    io::{Cursor, Read},
};

use jiff::{SignedDuration, Timestamp};
use log::{info, warn};
use reqwest::{
    blocking::Client,
    header::{ACCEPT, CONTENT_TYPE},
    StatusCode,
};
use serde::Deserialize;

use crate::db::lib_archive::{http_client, FetchError};

pub const ENTSOE_API_URL: &str = "https://web-api.tp.entsoe.eu/api";

/// Load frequency control area of the Czech TSO (CEPS).
pub const CZ_AREA: &str = "10YCZ-CEPS-----N";

/// Romanian bidding zone (Transelectrica).
pub const RO_BIDDING_ZONE: &str = "10YRO-TEL------P";

/// Client for the ENTSO-E Transparency Platform REST API.
pub struct EntsoeClient {
    pub base_url: String,
    api_key: String,
    client: Client,
}

impl EntsoeClient {
    /// Use the given API key, or the `ENTSOE_API_KEY` environment variable.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<EntsoeClient, Box<dyn Error>> {
        let api_key = match api_key.or_else(|| env::var("ENTSOE_API_KEY").ok()) {
            Some(key) if !key.trim().is_empty() => key,
            _ => return Err(Box::new(FetchError::MissingApiKey)),
        };
        Ok(EntsoeClient {
            base_url: base_url.to_string(),
            api_key,
            client: http_client()?,
        })
    }

    /// Get one XML document.
    ///
    /// Return `None` when the platform confirms there is no data: HTTP 400
    /// or 409, an empty body or zip archive, or an acknowledgement document
    /// saying "No matching data".  Any other failure is an error.
    pub fn get_document(
        &self,
        params: &[(&str, String)],
    ) -> Result<Option<String>, Box<dyn Error>> {
        let mut query: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        query.push(("securityToken", self.api_key.as_str()));
        let response = self
            .client
            .get(&self.base_url)
            .header(ACCEPT, "application/xml, application/zip")
            .query(&query)
            .send()?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::CONFLICT {
            info!("ENTSO-E returned HTTP {}, no data", status.as_u16());
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Box::new(FetchError::UnexpectedStatus {
                service: "ENTSO-E".to_string(),
                status: status.as_u16(),
            }));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|e| e.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        let bytes = response.bytes()?;
        let text = if content_type.contains("zip") || content_type.contains("octet") {
            match unzip_first(bytes.as_ref())? {
                Some(text) => text,
                None => {
                    warn!("Empty ZIP archive from ENTSO-E");
                    return Ok(None);
                }
            }
        } else {
            String::from_utf8(bytes.to_vec())?
        };

        if text.trim().is_empty() || is_no_data_acknowledgement(&text) {
            return Ok(None);
        }
        Ok(Some(text))
    }
}

/// Content of the first file in a zip archive, `None` if the archive is empty.
pub fn unzip_first(bytes: &[u8]) -> Result<Option<String>, Box<dyn Error>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    if archive.len() == 0 {
        return Ok(None);
    }
    let mut file = archive.by_index(0)?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(Some(text))
}

fn is_no_data_acknowledgement(text: &str) -> bool {
    text.contains("<Reason>") && text.contains("No matching data")
}

/// Parse a resolution like `PT15M`, `PT60M` or `PT4H`.
pub fn parse_resolution(resolution: &str) -> Result<SignedDuration, Box<dyn Error>> {
    let step: SignedDuration = resolution.trim().parse()?;
    if !step.is_positive() {
        return Err(format!("invalid resolution {}", resolution).into());
    }
    Ok(step)
}

#[derive(Debug, Deserialize)]
pub struct TimeInterval {
    pub start: String,
    pub end: String,
}

impl TimeInterval {
    /// Instants are given in UTC with minute precision, e.g. `2025-01-14T23:00Z`
    pub fn parse(&self) -> Result<(Timestamp, Timestamp), Box<dyn Error>> {
        let start: Timestamp = self.start.trim().parse()?;
        let end: Timestamp = self.end.trim().parse()?;
        Ok((start, end))
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "P: Deserialize<'de>"))]
pub struct Period<P> {
    #[serde(rename = "timeInterval", default)]
    pub time_interval: Option<TimeInterval>,
    #[serde(default)]
    pub resolution: String,
    #[serde(rename = "Point", default)]
    pub points: Vec<P>,
}
