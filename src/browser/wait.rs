//! Bounded waits
//!
//! Poll a single-shot check until it yields a value or the timeout elapses.
//! The check always runs at least once, even with a zero timeout.

use super::session::{ElementHandle, Session};
use crate::config::Selector;
use crate::error::{BrowserError, Result};
use std::future::Future;
use std::time::{Duration, Instant};

/// Delay between two checks
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Run `check` until it returns `Some`, an error, or `timeout` elapses
pub async fn poll_until<T, F, Fut>(what: &str, timeout: Duration, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(BrowserError::Timeout {
                what: what.to_string(),
                waited: elapsed,
            });
        }

        tokio::time::sleep(POLL_INTERVAL.min(timeout - elapsed)).await;
    }
}

/// Wait until an element matching `selector` is present
pub async fn wait_for_presence<S: Session + ?Sized>(
    session: &S,
    selector: &Selector,
    timeout: Duration,
) -> Result<ElementHandle> {
    poll_until(&format!("presence of {selector}"), timeout, move || {
        session.find_element(selector)
    })
    .await
}

/// Wait until the frame matching `selector` can be switched into, and switch
pub async fn wait_for_frame_and_switch<S: Session + ?Sized>(
    session: &S,
    selector: &Selector,
    timeout: Duration,
) -> Result<()> {
    poll_until(&format!("frame {selector}"), timeout, move || async move {
        let switched = session.switch_to_frame_when_available(selector).await?;
        Ok(switched.then_some(()))
    })
    .await
}

/// Wait until an element matching `selector` is present, visible and enabled
pub async fn wait_for_clickable<S: Session + ?Sized>(
    session: &S,
    selector: &Selector,
    timeout: Duration,
) -> Result<ElementHandle> {
    poll_until(&format!("{selector} to be clickable"), timeout, move || async move {
        match session.find_element(selector).await? {
            Some(element) if session.is_clickable(&element).await? => Ok(Some(element)),
            _ => Ok(None),
        }
    })
    .await
}
