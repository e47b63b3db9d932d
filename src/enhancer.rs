use crate::error::{Error, Result};
use crate::lookup::{self, DEFAULT_ENDPOINT, ElevationService, HttpElevationService};
use crate::trackxml::Document;
use crate::{CoordinateSet, Format, chunked};
use reqwest::{StatusCode, Url};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_CHUNK_SIZE: usize = 112;
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.25;
pub const DEFAULT_ERROR_THRESHOLD: f64 = 0.75;
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct EnhancerConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub api_key: String,
    /// `None` guesses the format from the input's extension.
    pub format: Option<Format>,
    pub chunk_size: usize,
    /// Cap on unique coordinates, 0 for no cap.
    pub max_points: usize,
    pub warning_threshold: f64,
    pub error_threshold: f64,
    pub endpoint: String,
    /// Pause after every lookup request.
    pub request_delay: Duration,
}

impl EnhancerConfig {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        api_key: impl Into<String>,
    ) -> Self {
        EnhancerConfig {
            input: input.into(),
            output: output.into(),
            api_key: api_key.into(),
            format: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_points: 0,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }

    /// Fixes the input format. `None` guesses it from the input's extension.
    pub fn format(mut self, format: impl Into<Option<Format>>) -> Self {
        self.format = format.into();
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points;
        self
    }

    pub fn thresholds(mut self, warning: f64, error: f64) -> Self {
        self.warning_threshold = warning;
        self.error_threshold = error;
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }
}

/// Drives parse, elevation lookup, write-back and write for one track file.
pub struct Enhancer<S = HttpElevationService> {
    config: EnhancerConfig,
    endpoint: Url,
    service: S,
    document: Option<Document>,
    coordinates: CoordinateSet,
}

impl Enhancer<HttpElevationService> {
    pub fn new(config: EnhancerConfig) -> Result<Self> {
        let service = HttpElevationService::new()?;
        Enhancer::with_service(config, service)
    }
}

impl<S: ElevationService> Enhancer<S> {
    pub fn with_service(config: EnhancerConfig, service: S) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| Error::InvalidEndpoint {
            url: config.endpoint.clone(),
            reason: e.to_string(),
        })?;
        Ok(Enhancer {
            config,
            endpoint,
            service,
            document: None,
            coordinates: CoordinateSet::new(),
        })
    }

    pub fn config(&self) -> &EnhancerConfig {
        &self.config
    }

    pub fn coordinates(&self) -> &CoordinateSet {
        &self.coordinates
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Loads the input and collects its unique coordinates.
    pub fn parse(&mut self) -> Result<()> {
        let format = match self.config.format {
            Some(format) => format,
            None => Format::guess(&self.config.input)?,
        };
        let mut document = Document::open(format, &self.config.input)?;
        self.coordinates = document.get_coordinates(self.config.max_points).clone();
        info!(
            trackpoints = document.trackpoint_count(),
            coordinates = self.coordinates.len(),
            "collected unique coordinates"
        );
        self.document = Some(document);
        Ok(())
    }

    /// One lookup URL per chunk of at most `chunk_size` coordinates, in
    /// coordinate order.
    pub fn request_urls(&self) -> Result<Vec<Url>> {
        let keys: Vec<_> = self.coordinates.keys().copied().collect();
        chunked(&keys, self.config.chunk_size)
            .map(|chunk| lookup::request_url(&self.endpoint, &self.config.api_key, chunk))
            .collect()
    }

    /// Looks up every coordinate, checks how many stayed unresolved and
    /// writes the heights into the document.
    ///
    /// Failed chunks are logged and skipped. Returns the unresolved share.
    pub fn get_altitudes(&mut self) -> Result<f64> {
        if self.document.is_none() {
            return Err(Error::NotParsed);
        }

        let urls = self.request_urls()?;
        for (chunk, url) in urls.iter().enumerate() {
            debug!(chunk, total = urls.len(), "requesting elevations");
            match self.fetch(url) {
                Ok(body) => self.absorb(chunk, &body),
                Err(e) => warn!(chunk, error = %e, "elevation lookup failed"),
            }
            thread::sleep(self.config.request_delay);
        }

        let fraction = self.check_thresholds()?;
        if let Some(document) = self.document.as_mut() {
            document.append_altitudes(&self.coordinates);
        }
        Ok(fraction)
    }

    /// Runs one request, retrying once right away when rate limited.
    fn fetch(&self, url: &Url) -> Result<String> {
        let mut reply = self.service.get(url)?;
        if reply.status == StatusCode::TOO_MANY_REQUESTS {
            info!("rate limited, retrying once");
            reply = self.service.get(url)?;
        }

        match reply.status {
            StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimited),
            status if status.is_success() => Ok(reply.body),
            status => Err(Error::LookupStatus(status)),
        }
    }

    fn absorb(&mut self, chunk: usize, body: &str) {
        let pairs = match lookup::parse_response(body) {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!(chunk, error = %e, "ignoring elevation reply");
                return;
            }
        };

        for (coordinate, height) in &pairs {
            if !self.coordinates.set_height(coordinate, *height) {
                debug!(chunk, %coordinate, "ignoring coordinate that was not requested");
            }
        }
    }

    /// Share of coordinates still without elevation. Errors when it is
    /// above the error threshold, logs a warning above the warning threshold.
    pub fn check_thresholds(&self) -> Result<f64> {
        let total = self.coordinates.len();
        let unresolved = self.coordinates.unresolved_count();
        let fraction = self.coordinates.empty_fraction();

        if fraction > self.config.error_threshold {
            error!(
                unresolved,
                total,
                fraction,
                threshold = self.config.error_threshold,
                "too many coordinates without elevation"
            );
            return Err(Error::ThresholdExceeded {
                unresolved,
                total,
                fraction,
                threshold: self.config.error_threshold,
            });
        }
        if fraction > self.config.warning_threshold {
            warn!(
                unresolved,
                total,
                fraction,
                threshold = self.config.warning_threshold,
                "some coordinates have no elevation"
            );
        }
        Ok(fraction)
    }

    pub fn write(&self) -> Result<()> {
        let document = self.document.as_ref().ok_or(Error::NotParsed)?;
        document.save(&self.config.output)
    }

    pub fn run(&mut self) -> Result<()> {
        self.parse()?;
        self.get_altitudes()?;
        self.write()
    }

    #[cfg(test)]
    fn set_coordinates(&mut self, coordinates: CoordinateSet) {
        self.coordinates = coordinates;
    }
}
