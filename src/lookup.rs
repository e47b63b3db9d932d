//! Contract of the remote elevation lookup service.
//!
//! A request is an HTTP GET with two query parameters: `json`, holding
//! `{"shape": [{"lat": .., "lon": ..}, ..]}`, and `api_key`. A successful
//! reply carries parallel `shape` and `height` arrays.

use crate::error::{Error, Result};
use crate::Coordinate;
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_ENDPOINT: &str = "http://elevation.mapzen.com/height";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapePoint {
    pub lat: f64,
    pub lon: f64,
}

impl From<&Coordinate> for ShapePoint {
    fn from(c: &Coordinate) -> Self {
        ShapePoint {
            lat: c.lat(),
            lon: c.lon(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ShapeRequest {
    shape: Vec<ShapePoint>,
}

#[derive(Debug, Deserialize)]
struct HeightResponse {
    shape: Option<Vec<ShapePoint>>,
    height: Option<Vec<Option<f64>>>,
}

/// Builds the lookup URL for one chunk of coordinates.
pub fn request_url(endpoint: &Url, api_key: &str, chunk: &[Coordinate]) -> Result<Url> {
    let request = ShapeRequest {
        shape: chunk.iter().map(ShapePoint::from).collect(),
    };
    let json = serde_json::to_string(&request)
        .map_err(|e| Error::MalformedResponse(format!("cannot encode request: {e}")))?;

    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair("json", &json)
        .append_pair("api_key", api_key);
    Ok(url)
}

/// Decodes a lookup reply into (coordinate, height) pairs.
///
/// Pairing is positional: the i-th shape point gets the i-th height. A
/// `null` height stays unresolved.
pub fn parse_response(body: &str) -> Result<Vec<(Coordinate, Option<f64>)>> {
    let response: HeightResponse =
        serde_json::from_str(body).map_err(|e| Error::MalformedResponse(e.to_string()))?;

    let (Some(shape), Some(height)) = (response.shape, response.height) else {
        return Err(Error::MalformedResponse(
            "reply lacks shape or height".to_string(),
        ));
    };

    if shape.len() != height.len() {
        warn!(
            shape = shape.len(),
            height = height.len(),
            "shape and height lengths differ, pairing up to the shorter one"
        );
    }

    Ok(shape
        .iter()
        .zip(height)
        .map(|(point, h)| (Coordinate::new(point.lon, point.lat), h))
        .collect())
}

/// Raw reply of one lookup request.
#[derive(Debug, Clone)]
pub struct LookupReply {
    pub status: StatusCode,
    pub body: String,
}

impl LookupReply {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        LookupReply {
            status,
            body: body.into(),
        }
    }
}

/// Transport for lookup requests.
pub trait ElevationService {
    fn get(&self, url: &Url) -> Result<LookupReply>;
}

/// Blocking HTTP transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpElevationService {
    client: Client,
}

impl HttpElevationService {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpElevationService { client })
    }
}

impl ElevationService for HttpElevationService {
    fn get(&self, url: &Url) -> Result<LookupReply> {
        let response = self.client.get(url.clone()).send()?;
        let status = response.status();
        let body = response.text()?;
        Ok(LookupReply { status, body })
    }
}
