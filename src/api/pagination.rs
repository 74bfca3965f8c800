//! Pagination over list endpoints
//!
//! The first request carries `limit`; every following request uses the absolute
//! `nextPageLink` returned by the previous page, which already encodes the cursor.
//!
//! Includes safety mechanisms:
//! - Maximum iteration limit to prevent infinite loops
//! - Detection of a next-page link that points back at the current page

use serde_json::Value;
use std::future::Future;
use tracing::debug;

use super::model::Page;
use crate::concurrency::config::PAGE_SIZE;
use crate::error::{Error, Result};

/// Maximum number of pages fetched for one listing
const MAX_ITERATIONS: usize = 10_000;

/// A single page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Absolute URL
    pub url: String,
    /// Query parameters to add (empty when following a next-page link)
    pub query: Vec<(&'static str, String)>,
}

impl PageRequest {
    /// First page of `url`, asking for the maximum page size
    pub fn first(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: vec![("limit", PAGE_SIZE.to_string())],
        }
    }

    /// Follow-up page at an absolute next-page link
    pub fn next(link: impl Into<String>) -> Self {
        Self {
            url: link.into(),
            query: Vec::new(),
        }
    }
}

/// Pagination helper for list endpoints
pub struct PaginationHelper;

impl PaginationHelper {
    /// Fetch every page starting at `first`, concatenating the items in order.
    ///
    /// # Errors
    /// Returns the first page failure, or `MalformedResponse` if the listing does not
    /// terminate.
    pub async fn collect_all<F, Fut>(first: PageRequest, mut fetch_page: F) -> Result<Vec<Value>>
    where
        F: FnMut(PageRequest) -> Fut,
        Fut: Future<Output = Result<Page>>,
    {
        let listing = first.url.clone();
        let mut items = Vec::new();
        let mut request = first;
        let mut iteration = 0;

        loop {
            if iteration >= MAX_ITERATIONS {
                return Err(Error::MalformedResponse(format!(
                    "Max iterations ({MAX_ITERATIONS}) exceeded listing {listing} - possible infinite loop"
                )));
            }

            let current_url = request.url.clone();
            let page = fetch_page(request).await?;
            iteration += 1;
            debug!(
                "Received {} items in page {} of {}",
                page.items.len(),
                iteration,
                listing
            );
            items.extend(page.items);

            match page.next_page_link {
                Some(link) if link == current_url => {
                    return Err(Error::MalformedResponse(format!(
                        "next page link of {listing} points at the current page"
                    )));
                }
                Some(link) => request = PageRequest::next(link),
                None => break,
            }
        }

        debug!(
            "Pagination completed after {} pages. Total items: {}",
            iteration,
            items.len()
        );
        Ok(items)
    }
}
