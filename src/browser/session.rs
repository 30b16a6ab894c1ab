//! The narrow set of page actions the portal lookups need. Lookups drive a
//! `PortalSession` and read HTML snapshots back; everything that decides
//! *which* element to act on happens on those snapshots.

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

#[async_trait]
pub trait PortalSession: Send + Sync {
    /// Navigates and waits for the page body to settle.
    async fn open(&mut self, url: &str) -> Result<()>;

    /// Serialized DOM of the current page.
    async fn html(&self) -> Result<String>;

    /// Clears the element at `selector` and types `text` into it.
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Sends Enter to the element at `selector`.
    async fn press_enter(&self, selector: &str) -> Result<()>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// Tears the session down. Must be called on every path out of a lookup.
    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn PortalSession>>;
}
