// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::PAGE_SIZE;

const WINDOW_RADIUS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub offset: usize,
    pub limit: usize,
}

impl PageRange {
    /// Inclusive zero-based `(start, end)` offsets.
    pub fn end_inclusive(self) -> (usize, usize) {
        (self.offset, self.offset + self.limit.saturating_sub(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLink {
    Page(usize),
    Ellipsis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageState {
    current_page: usize,
    page_size: usize,
    total_rows: usize,
}

impl Default for PageState {
    fn default() -> Self {
        Self::new(PAGE_SIZE)
    }
}

impl PageState {
    pub fn new(page_size: usize) -> Self {
        Self {
            current_page: 1,
            page_size: page_size.max(1),
            total_rows: 0,
        }
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn total_pages(&self) -> usize {
        self.total_rows.div_ceil(self.page_size)
    }

    pub fn row_range(&self) -> PageRange {
        PageRange {
            offset: (self.current_page - 1) * self.page_size,
            limit: self.page_size,
        }
    }

    /// Moves to `page` when it exists; anything else is a no-op.
    pub fn go_to(&mut self, page: usize) -> bool {
        if page == 0 || page > self.total_pages() || page == self.current_page {
            return false;
        }
        self.current_page = page;
        true
    }

    pub fn next(&mut self) -> bool {
        self.go_to(self.current_page + 1)
    }

    pub fn prev(&mut self) -> bool {
        self.go_to(self.current_page.saturating_sub(1))
    }

    pub fn last(&mut self) -> bool {
        self.go_to(self.total_pages())
    }

    pub fn reset(&mut self) {
        self.current_page = 1;
    }

    /// The current page is kept even if it now lies past the end.
    pub fn set_total(&mut self, total_rows: usize) {
        self.total_rows = total_rows;
    }

    pub fn window(&self) -> Vec<PageLink> {
        let total = self.total_pages();
        if total == 0 {
            return Vec::new();
        }
        let current = self.current_page.min(total);
        let start = current.saturating_sub(WINDOW_RADIUS).max(1);
        let end = (current + WINDOW_RADIUS).min(total);

        let mut links = Vec::new();
        if start > 1 {
            links.push(PageLink::Page(1));
            if start > 2 {
                links.push(PageLink::Ellipsis);
            }
        }
        links.extend((start..=end).map(PageLink::Page));
        if end < total {
            if end < total - 1 {
                links.push(PageLink::Ellipsis);
            }
            links.push(PageLink::Page(total));
        }
        links
    }

    pub fn summary(&self) -> String {
        if self.total_rows == 0 {
            return "Showing 0 to 0 of 0 entries".to_owned();
        }
        let range = self.row_range();
        let first = (range.offset + 1).min(self.total_rows);
        let last = (range.offset + range.limit).min(self.total_rows);
        format!("Showing {first} to {last} of {} entries", self.total_rows)
    }

    /// One-based position of a visible row across all pages.
    pub fn serial_number(&self, index: usize) -> usize {
        self.row_range().offset + index + 1
    }
}

#[cfg(test)]
mod tests {
    use super::{PageLink, PageRange, PageState};

    fn with_total(total: usize) -> PageState {
        let mut page = PageState::default();
        page.set_total(total);
        page
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(with_total(0).total_pages(), 0);
        assert_eq!(with_total(1).total_pages(), 1);
        assert_eq!(with_total(50).total_pages(), 1);
        assert_eq!(with_total(51).total_pages(), 2);
        assert_eq!(with_total(120).total_pages(), 3);
    }

    #[test]
    fn row_range_tracks_current_page() {
        let mut page = with_total(120);
        assert_eq!(page.row_range(), PageRange { offset: 0, limit: 50 });
        assert!(page.go_to(3));
        assert_eq!(page.row_range().end_inclusive(), (100, 149));
    }

    #[test]
    fn out_of_range_pages_are_noops() {
        let mut page = with_total(120);
        assert!(!page.go_to(0));
        assert!(!page.go_to(4));
        assert!(!page.prev());
        assert_eq!(page.current_page(), 1);

        assert!(page.last());
        assert!(!page.next());
        assert_eq!(page.current_page(), 3);
    }

    #[test]
    fn empty_result_has_no_pages_to_visit() {
        let mut page = with_total(0);
        assert!(!page.next());
        assert!(!page.go_to(1));
        assert!(page.window().is_empty());
        assert_eq!(page.summary(), "Showing 0 to 0 of 0 entries");
    }

    #[test]
    fn window_adds_edges_and_ellipses() {
        let mut page = with_total(50 * 10);
        assert_eq!(
            page.window(),
            vec![
                PageLink::Page(1),
                PageLink::Page(2),
                PageLink::Page(3),
                PageLink::Ellipsis,
                PageLink::Page(10),
            ]
        );

        page.go_to(5);
        assert_eq!(
            page.window(),
            vec![
                PageLink::Page(1),
                PageLink::Ellipsis,
                PageLink::Page(3),
                PageLink::Page(4),
                PageLink::Page(5),
                PageLink::Page(6),
                PageLink::Page(7),
                PageLink::Ellipsis,
                PageLink::Page(10),
            ]
        );

        page.go_to(4);
        assert_eq!(page.window()[..3], [
            PageLink::Page(1),
            PageLink::Page(2),
            PageLink::Page(3),
        ]);
    }

    #[test]
    fn summary_and_serial_numbers_use_page_offset() {
        let mut page = with_total(73);
        assert!(page.next());
        assert_eq!(page.summary(), "Showing 51 to 73 of 73 entries");
        assert_eq!(page.serial_number(0), 51);
        assert_eq!(page.serial_number(22), 73);
    }
}
