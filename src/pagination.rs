//! Page arithmetic for list views.

use crate::catalog::models::Paginated;
use serde::Serialize;
use std::fmt;

/// One slot of a rendered page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "page")]
pub enum PageItem {
    Page(u32),
    Ellipsis,
}

/// Page numbers to show around `current`.
///
/// Always contains the first and last page and `current ± spread` clipped to
/// the pages in between. A single ellipsis stands in for every gap between
/// consecutive numbers. Empty when there is at most one page.
pub fn compute_window(current: u32, total: u32, spread: u32) -> Vec<PageItem> {
    if total <= 1 {
        return Vec::new();
    }
    let current = current.clamp(1, total);
    let low = current.saturating_sub(spread).max(2);
    let high = current.saturating_add(spread).min(total - 1);

    let mut pages = Vec::with_capacity(((high.saturating_sub(low)) + 3) as usize);
    pages.push(1);
    if low <= high {
        pages.extend(low..=high);
    }
    pages.push(total);

    let mut items = Vec::with_capacity(pages.len() + 2);
    let mut previous: Option<u32> = None;
    for page in pages {
        if let Some(prev) = previous
            && page - prev > 1
        {
            items.push(PageItem::Ellipsis);
        }
        items.push(PageItem::Page(page));
        previous = Some(page);
    }
    items
}

/// Number of pages needed for `count` items, at least zero.
pub fn total_pages(count: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    let pages = count.div_ceil(u64::from(page_size));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Everything a pager needs to render for one page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub current: u32,
    pub total_pages: u32,
    pub count: u64,
    pub page_size: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PageInfo {
    /// Derive paging state from a list response. Next/previous availability
    /// follows the response links rather than arithmetic.
    pub fn from_page<T>(page: &Paginated<T>, current: u32, page_size: u32) -> Self {
        Self {
            current: current.max(1),
            total_pages: total_pages(page.count, page_size),
            count: page.count,
            page_size,
            has_next: page.has_next(),
            has_previous: page.has_previous(),
        }
    }

    /// A pager is pointless for a single page of results.
    pub fn should_render(&self) -> bool {
        self.total_pages > 1 && self.count > u64::from(self.page_size)
    }

    pub fn window(&self, spread: u32) -> PageWindow {
        PageWindow {
            current: self.current.clamp(1, self.total_pages.max(1)),
            items: compute_window(self.current, self.total_pages, spread),
        }
    }

    pub fn next_page(&self) -> Option<u32> {
        self.has_next.then(|| self.current + 1)
    }

    pub fn previous_page(&self) -> Option<u32> {
        (self.has_previous && self.current > 1).then(|| self.current - 1)
    }
}

/// A computed window together with the page it was computed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub current: u32,
    pub items: Vec<PageItem>,
}

impl fmt::Display for PageWindow {
    /// Renders as `1 … 8 9 [10] 11 12 … 20`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match item {
                PageItem::Page(n) if *n == self.current => write!(f, "[{n}]")?,
                PageItem::Page(n) => write!(f, "{n}")?,
                PageItem::Ellipsis => f.write_str("…")?,
            }
        }
        Ok(())
    }
}

/// The page sizes a user may pick from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSizeOptions {
    options: Vec<u32>,
    default: u32,
}

impl PageSizeOptions {
    /// `default` must be one of `options`; returns `None` otherwise.
    pub fn new(options: Vec<u32>, default: u32) -> Option<Self> {
        if options.is_empty() || !options.contains(&default) || options.contains(&0) {
            return None;
        }
        Some(Self { options, default })
    }

    pub fn options(&self) -> &[u32] {
        &self.options
    }

    pub fn default_size(&self) -> u32 {
        self.default
    }

    /// The requested size if it is allowed, the default otherwise.
    pub fn resolve(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(size) if self.options.contains(&size) => size,
            _ => self.default,
        }
    }
}
