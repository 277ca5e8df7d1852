use std::collections::VecDeque;

use async_trait::async_trait;

use super::dto::GraphPage;
use crate::error::CleanerResult;

/// A page of items plus the cursor for the page after it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_link: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_link: Option<String>) -> Self {
        Self { items, next_link }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_link: None,
        }
    }
}

impl<T> From<GraphPage<T>> for Page<T> {
    fn from(page: GraphPage<T>) -> Self {
        Self {
            items: page.value,
            next_link: page.next_link,
        }
    }
}

/// Something that can turn a continuation cursor into the next page.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    async fn fetch_page(&self, next_link: &str) -> CleanerResult<Page<T>>;
}

/// Lazy, one-shot iterator over every item of a paged collection.
///
/// Pages are fetched only when the items already buffered run out, so a
/// consumer that stops early never triggers the remaining requests.
pub struct PageIterator<'a, T, F: ?Sized> {
    buffer: VecDeque<T>,
    next_link: Option<String>,
    fetcher: &'a F,
    pages_fetched: usize,
}

impl<'a, T, F> PageIterator<'a, T, F>
where
    T: Send,
    F: PageFetcher<T> + ?Sized,
{
    pub fn new(first_page: Page<T>, fetcher: &'a F) -> Self {
        Self {
            buffer: first_page.items.into(),
            next_link: first_page.next_link,
            fetcher,
            pages_fetched: 0,
        }
    }

    /// Number of pages requested through the fetcher so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub async fn next(&mut self) -> CleanerResult<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }

            let Some(next_link) = self.next_link.take() else {
                return Ok(None);
            };

            log::debug!("Fetching next page: {}", next_link);
            let page = self.fetcher.fetch_page(&next_link).await?;
            self.pages_fetched += 1;
            self.buffer.extend(page.items);
            self.next_link = page.next_link;
        }
    }

    /// Feeds items to `callback` until it returns `false` or the collection
    /// is exhausted.
    pub async fn iterate<C>(&mut self, mut callback: C) -> CleanerResult<()>
    where
        C: FnMut(T) -> bool,
    {
        while let Some(item) = self.next().await? {
            if !callback(item) {
                break;
            }
        }
        Ok(())
    }

    pub async fn collect_all(mut self) -> CleanerResult<Vec<T>> {
        let mut items = Vec::new();
        self.iterate(|item| {
            items.push(item);
            true
        })
        .await?;
        Ok(items)
    }
}
