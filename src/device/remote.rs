use tracing::{debug, warn};

use crate::client::{ClientError, HttpRequest, Progress, RequestState};
use crate::device::{Reading, Sensor};
use crate::transport::Dial;

/// A sensor whose readings are served by another node.
///
/// Each [`Sensor::get`] drives the request one step. While the request is in
/// flight `get` returns `None`. A finished request yields the parsed reading
/// and the client is reset for the next one. Failures and unexpected
/// responses yield [`Reading::ZERO`] so the slot visibly drops out.
pub struct RemoteSensor<D: Dial> {
    client: HttpRequest<D>,
}

impl<D: Dial> RemoteSensor<D> {
    pub fn new(dialer: D, host: &str, path: &str, port: u16) -> Result<Self, ClientError> {
        let mut client = HttpRequest::new(dialer);
        client.configure(host, path, port)?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &HttpRequest<D> {
        &self.client
    }

    fn restart(&mut self) {
        if let Err(e) = self.client.reset() {
            warn!(error = %e, "Failed to reset remote sensor client");
        }
    }
}

impl<D: Dial> Sensor for RemoteSensor<D> {
    fn get(&mut self) -> Option<Reading> {
        let (progress, state) = self.client.request();

        if let Progress::Failed(e) = &progress {
            warn!(error = %e, code = e.code(), "Remote sensor request failed");
            self.restart();
            return Some(Reading::ZERO);
        }

        if state != RequestState::Done {
            return None;
        }

        let response = self.client.response();
        self.restart();

        if response.status.code != 200 {
            debug!(status = response.status.code, "Remote sensor returned non-200");
            return Some(Reading::ZERO);
        }

        match Reading::parse_line(&response.text()) {
            Some((_, reading)) => Some(reading),
            None => {
                debug!(body = %response.text(), "Remote sensor returned malformed body");
                Some(Reading::ZERO)
            }
        }
    }
}
