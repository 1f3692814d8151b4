use tracing::warn;

use crate::api::Page;

/// Offset pagination state for one query.
///
/// After every applied page `offset` is the number of loaded items and
/// `has_more()` is `offset < total_count`. Pages only ever append.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCursor<T> {
    offset: usize,
    page_size: usize,
    total_count: usize,
    items: Vec<T>,
}

impl<T> PageCursor<T> {
    pub fn new(page_size: usize) -> Self {
        Self {
            offset: 0,
            page_size,
            total_count: 0,
            items: Vec::new(),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.offset < self.total_count
    }

    /// Replace everything with a first page.
    pub fn replace(&mut self, page: Page<T>) {
        self.items = page.items;
        self.offset = self.items.len();
        self.total_count = page.total_count;
        self.settle_empty_page(self.items.is_empty());
    }

    /// Append the next page. Returns the number of items added.
    pub fn append(&mut self, page: Page<T>) -> usize {
        let returned = page.items.len();
        self.items.extend(page.items);
        self.offset += returned;
        self.total_count = page.total_count;
        self.settle_empty_page(returned == 0);
        returned
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.offset = 0;
        self.total_count = 0;
    }

    // A page with no items while the server still reports more would make
    // "load more" spin forever; trust what was actually returned.
    fn settle_empty_page(&mut self, was_empty: bool) {
        if was_empty && self.offset < self.total_count {
            warn!(
                "server reported {} items but returned none at offset {}",
                self.total_count, self.offset
            );
            self.total_count = self.offset;
        }
    }
}
