//! Browser driver seam
//!
//! [`Browser`] hands out fresh [`Page`]s; a page can navigate, report what a
//! [`Locator`] currently matches, and capture screenshots. Retrying and
//! timeouts live above this layer, in [`crate::expect`].

use std::path::Path;

use async_trait::async_trait;

use crate::error::E2eResult;
use crate::locator::{ElementState, Locator};

/// One browser tab
#[async_trait]
pub trait Page: Send {
    /// Navigate and wait for the load event
    async fn goto(&mut self, url: &str) -> E2eResult<()>;

    /// Single, non-retrying query of the current DOM
    async fn probe(&mut self, locator: &Locator) -> E2eResult<ElementState>;

    async fn screenshot(&mut self, path: &Path) -> E2eResult<()>;

    async fn close(&mut self) -> E2eResult<()>;
}

/// Source of pages, one per test
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> E2eResult<Box<dyn Page>>;

    async fn close(&self) -> E2eResult<()> {
        Ok(())
    }
}
