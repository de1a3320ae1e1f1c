//! Session handle capability
//!
//! Everything the capture workflow and the login flow need from a live
//! browser, expressed against the *current document context* (the top-level
//! document, or the frame most recently switched into).

use crate::config::Selector;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Reference to an element located in the current document context
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// A cookie ready to be replayed into a session.
///
/// Has no `sameSite` field. Stored exports carry values the DevTools
/// endpoint rejects, so it is dropped on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    /// Seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

/// One live, remote-controlled browser instance.
///
/// Probing methods (`find_element`, `switch_to_frame_when_available`) make a
/// single attempt; bounded waiting lives in [`crate::browser::wait`].
/// A session is not meant to be shared between concurrent page captures:
/// the frame context is global to the session.
#[async_trait]
pub trait Session: Send + Sync {
    /// Load `url` in the top-level document. Resets any frame context.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Locate the first element matching `selector`, if present right now
    async fn find_element(&self, selector: &Selector) -> Result<Option<ElementHandle>>;

    /// Switch into the frame matching `selector` if it exists and its document
    /// is available. Returns `false` when the frame is not there yet.
    async fn switch_to_frame_when_available(&self, selector: &Selector) -> Result<bool>;

    /// Switch into a frame element that was already located
    async fn switch_to_frame(&self, frame: &ElementHandle) -> Result<()>;

    /// Leave every entered frame
    async fn switch_to_default_content(&self) -> Result<()>;

    /// Markup of the current document
    async fn page_source(&self) -> Result<String>;

    /// Scroll so the element is centered vertically and horizontally
    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<()>;

    /// Draw a visible outline around the element
    async fn highlight(&self, element: &ElementHandle) -> Result<()>;

    /// PNG bytes of exactly the element's rendered box
    async fn screenshot_element(&self, element: &ElementHandle) -> Result<Vec<u8>>;

    /// Visible and enabled
    async fn is_clickable(&self, element: &ElementHandle) -> Result<bool>;

    /// Clear the element's value and type `text` into it
    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<()>;

    async fn click(&self, element: &ElementHandle) -> Result<()>;

    async fn add_cookie(&self, cookie: &Cookie) -> Result<()>;
}
