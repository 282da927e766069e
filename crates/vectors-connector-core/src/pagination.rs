//! Pagination state machine.
//!
//! Backends page through an index in one of two idioms:
//!
//! - **Offset + link** (Azure AI Search, pgvector, in-memory): requests
//!   carry an offset window of `page_size` records; inside a window the
//!   backend may hand back opaque next-links. The stream ends only when a
//!   page is short *and* carries no link.
//! - **Cursor only** (Qdrant scroll offsets, OpenSearch scroll ids): every
//!   page returns the cursor for the next one; no cursor means done.
//!
//! [`Pager`] turns both into one explicit sequence of states:
//!
//! ```text
//!                 page with link
//!   AwaitingPage ───────────────▶ FollowingLink ◀─┐
//!        ▲  │                          │  │  link │
//!        │  │ full page, no link       │  └───────┘
//!        │  ▼                          │
//!   AdvancingOffset ◀──────────────────┤ full page, no link
//!                                      │
//!   short page, no link / no cursor    ▼
//!   ─────────────────────────────▶   Done        (any failure ▶ Failed)
//! ```

/// Pagination idiom of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMode {
    OffsetAndLink,
    CursorOnly,
}

/// Backend-specific position in a page stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// First page of a cursor-only stream.
    Start,
    /// Record offset of an offset window.
    Offset(usize),
    /// Opaque next-page link (e.g. `@odata.nextLink`).
    Link(String),
    /// Opaque cursor (scroll id, serialised scroll offset).
    Cursor(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    AwaitingPage(Continuation),
    FollowingLink(Continuation),
    AdvancingOffset,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Pager {
    mode: PaginationMode,
    page_size: usize,
    offset: usize,
    state: PageState,
    last: Option<Continuation>,
    requests: usize,
}

impl Pager {
    pub fn new(mode: PaginationMode, page_size: usize) -> Self {
        let first = match mode {
            PaginationMode::OffsetAndLink => Continuation::Offset(0),
            PaginationMode::CursorOnly => Continuation::Start,
        };
        Self {
            mode,
            page_size,
            offset: 0,
            state: PageState::AwaitingPage(first),
            last: None,
            requests: 0,
        }
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    /// Number of requests handed out so far.
    pub fn requests(&self) -> usize {
        self.requests
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, PageState::Done | PageState::Failed)
    }

    /// The continuation to fetch next, or `None` once the stream is over.
    pub fn next_request(&mut self) -> Option<Continuation> {
        if self.state == PageState::AdvancingOffset {
            self.offset += self.page_size;
            self.state = PageState::AwaitingPage(Continuation::Offset(self.offset));
        }
        let next = match &self.state {
            PageState::AwaitingPage(c) | PageState::FollowingLink(c) => c.clone(),
            _ => return None,
        };
        self.requests += 1;
        self.last = Some(next.clone());
        Some(next)
    }

    /// Record a successfully fetched page of `len` records.
    pub fn on_page(&mut self, len: usize, next: Option<Continuation>) {
        if self.is_finished() {
            return;
        }
        // A backend repeating the continuation it was just given would loop forever.
        let next = next.filter(|n| self.last.as_ref() != Some(n));

        self.state = match (self.mode, next) {
            (PaginationMode::CursorOnly, Some(_)) if len == 0 => PageState::Done,
            (_, Some(link)) => PageState::FollowingLink(link),
            (PaginationMode::CursorOnly, None) => PageState::Done,
            (PaginationMode::OffsetAndLink, None) if len < self.page_size => PageState::Done,
            (PaginationMode::OffsetAndLink, None) => PageState::AdvancingOffset,
        };
    }

    pub fn fail(&mut self) {
        self.state = PageState::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_mode_stops_on_short_page() {
        let mut pager = Pager::new(PaginationMode::OffsetAndLink, 2);
        assert_eq!(pager.next_request(), Some(Continuation::Offset(0)));
        pager.on_page(2, None);
        assert_eq!(pager.state(), &PageState::AdvancingOffset);
        assert_eq!(pager.next_request(), Some(Continuation::Offset(2)));
        pager.on_page(1, None);
        assert_eq!(pager.state(), &PageState::Done);
        assert_eq!(pager.next_request(), None);
        assert_eq!(pager.requests(), 2);
    }

    #[test]
    fn test_short_page_with_link_keeps_going() {
        let mut pager = Pager::new(PaginationMode::OffsetAndLink, 10);
        pager.next_request();
        pager.on_page(3, Some(Continuation::Link("next-1".into())));
        assert_eq!(
            pager.next_request(),
            Some(Continuation::Link("next-1".into()))
        );
        // Full link page without a further link: advance the offset window.
        pager.on_page(10, None);
        assert_eq!(pager.next_request(), Some(Continuation::Offset(10)));
        pager.on_page(0, None);
        assert!(pager.is_finished());
    }

    #[test]
    fn test_full_page_without_link_advances() {
        let mut pager = Pager::new(PaginationMode::OffsetAndLink, 5);
        for expected in [0, 5, 10] {
            assert_eq!(pager.next_request(), Some(Continuation::Offset(expected)));
            pager.on_page(5, None);
        }
        assert_eq!(pager.state(), &PageState::AdvancingOffset);
    }

    #[test]
    fn test_cursor_mode() {
        let mut pager = Pager::new(PaginationMode::CursorOnly, 100);
        assert_eq!(pager.next_request(), Some(Continuation::Start));
        // A short page with a cursor is not the end in cursor mode.
        pager.on_page(3, Some(Continuation::Cursor("c1".into())));
        assert_eq!(pager.next_request(), Some(Continuation::Cursor("c1".into())));
        pager.on_page(100, None);
        assert_eq!(pager.state(), &PageState::Done);
    }

    #[test]
    fn test_cursor_mode_empty_page_ends() {
        let mut pager = Pager::new(PaginationMode::CursorOnly, 100);
        pager.next_request();
        pager.on_page(0, Some(Continuation::Cursor("scroll-id".into())));
        assert!(pager.is_finished());
    }

    #[test]
    fn test_repeated_continuation_terminates() {
        let mut pager = Pager::new(PaginationMode::CursorOnly, 1);
        pager.next_request();
        pager.on_page(1, Some(Continuation::Cursor("same".into())));
        pager.next_request();
        pager.on_page(1, Some(Continuation::Cursor("same".into())));
        assert_eq!(pager.state(), &PageState::Done);
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut pager = Pager::new(PaginationMode::OffsetAndLink, 5);
        pager.next_request();
        pager.fail();
        assert_eq!(pager.state(), &PageState::Failed);
        pager.on_page(5, None);
        assert_eq!(pager.state(), &PageState::Failed);
        assert_eq!(pager.next_request(), None);
    }
}
