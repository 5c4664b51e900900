//! HTTP reader issuing one range request per read.

use std::io::{self, Read};
use std::time::Duration;

use cadence_core::{Error, HttpError, Result};
use tracing::{debug, trace};
use ureq::Agent;

use super::Reader;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpReader {
    url: String,
    agent: Agent,
    position: u64,
    length: Option<u64>,
}

impl HttpReader {
    pub fn new(url: &str) -> Result<Self> {
        url::Url::parse(url).map_err(|e| HttpError::InvalidUrl(format!("{url}: {e}")))?;

        let agent = Agent::new_with_config(
            Agent::config_builder()
                .timeout_global(Some(REQUEST_TIMEOUT))
                .build(),
        );

        Ok(Self {
            url: url.to_string(),
            agent,
            position: 0,
            length: None,
        })
    }

    fn map_error(&self, error: ureq::Error) -> Error {
        match error {
            ureq::Error::StatusCode(status) => HttpError::StatusError {
                status,
                message: self.url.clone(),
            }
            .into(),
            ureq::Error::Timeout(_) => HttpError::Timeout.into(),
            ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
                HttpError::ConnectionFailed(error.to_string()).into()
            }
            ureq::Error::BadUri(message) => HttpError::InvalidUrl(message).into(),
            ureq::Error::Io(e) => Error::Io(e),
            other => Error::Network(other.to_string()),
        }
    }
}

impl Reader for HttpReader {
    fn uri(&self) -> &str {
        &self.url
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let length = self.content_length()?;
        if buf.is_empty() || self.position >= length {
            return Ok(0);
        }

        let last = (self.position + buf.len() as u64 - 1).min(length - 1);
        trace!("GET {} bytes={}-{last}", self.url, self.position);

        let response = self
            .agent
            .get(&self.url)
            .header("Range", &format!("bytes={}-{last}", self.position))
            .call()
            .map_err(|e| self.map_error(e))?;

        let ranged = response.status().as_u16() == 206;
        let mut body = response.into_body().into_reader();
        if !ranged {
            // Server ignored the range and sent everything.
            io::copy(&mut (&mut body).take(self.position), &mut io::sink())?;
        }

        let wanted = (last + 1 - self.position) as usize;
        let mut filled = 0;
        while filled < wanted {
            match body.read(&mut buf[filled..wanted]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.position += filled as u64;
        Ok(filled)
    }

    fn seek_absolute(&mut self, position: u64) -> Result<()> {
        self.position = position;
        Ok(())
    }

    fn current_position(&self) -> u64 {
        self.position
    }

    fn content_length(&mut self) -> Result<u64> {
        if let Some(length) = self.length {
            return Ok(length);
        }

        let response = self
            .agent
            .head(&self.url)
            .call()
            .map_err(|e| self.map_error(e))?;

        let length = response
            .headers()
            .get("content-length")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| Error::Network(format!("{} reports no content length", self.url)))?;

        debug!("{} is {length} bytes", self.url);
        self.length = Some(length);
        Ok(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_rejected() {
        assert!(matches!(
            HttpReader::new("http://"),
            Err(Error::Http(HttpError::InvalidUrl(_)))
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_seek_is_local() {
        let mut reader = HttpReader::new("http://localhost:9/track.mp3").unwrap();
        reader.seek_absolute(1234).unwrap();
        assert_eq!(reader.current_position(), 1234);
        assert_eq!(reader.uri(), "http://localhost:9/track.mp3");
    }
}
