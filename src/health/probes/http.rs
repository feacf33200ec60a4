use std::time::Duration;

use crate::health::HealthCheckerError;

/// `GET {url}`; success is any 2xx status within `timeout` (spec §4.3).
///
/// This crate is fully synchronous/thread-based, so the blocking `ureq`
/// client is used here rather than an async HTTP stack.
pub fn check(url: &str, timeout: Duration) -> Result<(), HealthCheckerError> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout(timeout)
        .build();

    match agent.get(url).call() {
        Ok(response) if (200..300).contains(&response.status()) => Ok(()),
        Ok(response) => Err(HealthCheckerError::Failed(format!(
            "{url} returned status {}",
            response.status()
        ))),
        Err(ureq::Error::Status(code, _)) => Err(HealthCheckerError::Failed(format!(
            "{url} returned status {code}"
        ))),
        Err(ureq::Error::Transport(transport)) => {
            Err(HealthCheckerError::Failed(format!("{url}: {transport}")))
        }
    }
}
