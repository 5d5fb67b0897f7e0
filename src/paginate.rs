//! Cross-chapter pagination
//!
//! Blocks from every chapter are fed in reading order into a [`Paginator`], which closes a
//! page when the next block would push it over the budget and the page already meets the
//! minimum size. A block is never split.

use crate::config::PaginationConfig;
use crate::node::PageBlock;

/// A page closed by the paginator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageDraft {
    /// Blocks in reading order
    pub blocks: Vec<PageBlock>,
    /// Sum of the blocks' estimated lengths
    pub estimated_len: usize,
    /// 1-based position in the book
    pub sequence: u32,
    /// Whether this is the final page of the book
    pub is_last: bool,
}

/// Streaming page accumulator
#[derive(Debug)]
pub struct Paginator {
    budget: usize,
    min_len: usize,
    buffer: Vec<PageBlock>,
    running_len: usize,
    next_sequence: u32,
}

impl Paginator {
    /// Create a paginator with the configured budget and minimum page size
    pub fn new(config: &PaginationConfig) -> Self {
        Self {
            budget: config.chars_per_page,
            min_len: config.min_page_chars,
            buffer: Vec::new(),
            running_len: 0,
            next_sequence: 1,
        }
    }

    /// Add a block; returns the page it closed, if any
    pub fn push(&mut self, block: PageBlock) -> Option<PageDraft> {
        let len = block.estimated_len();
        let closed = if !self.buffer.is_empty()
            && self.running_len + len > self.budget
            && self.running_len >= self.min_len
        {
            Some(self.close(false))
        } else {
            None
        };

        self.running_len += len;
        self.buffer.push(block);
        closed
    }

    /// Close the remaining buffer as the last page
    pub fn finish(mut self) -> Option<PageDraft> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.close(true))
    }

    /// Length of the page being accumulated
    pub fn pending_len(&self) -> usize {
        self.running_len
    }

    /// Number of pages closed so far
    pub fn closed_pages(&self) -> u32 {
        self.next_sequence - 1
    }

    fn close(&mut self, is_last: bool) -> PageDraft {
        let draft = PageDraft {
            blocks: std::mem::take(&mut self.buffer),
            estimated_len: self.running_len,
            sequence: self.next_sequence,
            is_last,
        };
        self.running_len = 0;
        self.next_sequence += 1;
        draft
    }
}

/// Paginate a complete block sequence
pub fn paginate(
    blocks: impl IntoIterator<Item = PageBlock>,
    config: &PaginationConfig,
) -> Vec<PageDraft> {
    let mut paginator = Paginator::new(config);
    let mut pages: Vec<PageDraft> = blocks
        .into_iter()
        .filter_map(|block| paginator.push(block))
        .collect();
    pages.extend(paginator.finish());
    pages
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Element, Node};

    fn block(len: usize) -> PageBlock {
        Element::new("p", vec![Node::Text("x".repeat(len))])
    }

    fn config(budget: usize, min: usize) -> PaginationConfig {
        PaginationConfig {
            chars_per_page: budget,
            min_page_chars: min,
        }
    }

    fn lengths(pages: &[PageDraft]) -> Vec<Vec<usize>> {
        pages
            .iter()
            .map(|p| p.blocks.iter().map(|b| b.estimated_len()).collect())
            .collect()
    }

    #[test]
    fn closes_before_overflow_once_minimum_is_met() {
        let pages = paginate([block(50), block(40), block(30)], &config(100, 80));

        assert_eq!(lengths(&pages), vec![vec![50, 40], vec![30]]);
        assert_eq!(pages[0].estimated_len, 90);
        assert_eq!(pages[0].sequence, 1);
        assert!(!pages[0].is_last);
        assert_eq!(pages[1].sequence, 2);
        assert!(pages[1].is_last);
    }

    #[test]
    fn keeps_filling_below_minimum() {
        let pages = paginate([block(50), block(70), block(10)], &config(100, 80));
        // 50 is below the minimum, so the overflowing 70 joins it
        assert_eq!(lengths(&pages), vec![vec![50, 70], vec![10]]);
    }

    #[test]
    fn oversized_block_is_never_split() {
        let pages = paginate([block(90), block(250), block(90)], &config(100, 80));
        assert_eq!(lengths(&pages), vec![vec![90], vec![250], vec![90]]);
    }

    #[test]
    fn pagination_is_deterministic() {
        let input: Vec<_> = (1..60).map(|i| block((i * 37) % 400 + 1)).collect();
        let cfg = config(1000, 300);
        assert_eq!(paginate(input.clone(), &cfg), paginate(input, &cfg));
    }

    #[test]
    fn every_page_but_the_last_meets_minimum() {
        let input: Vec<_> = (1..200).map(|i| block((i * 53) % 700 + 1)).collect();
        let pages = paginate(input, &config(3000, 800));

        assert!(pages.len() > 1);
        for page in &pages[..pages.len() - 1] {
            assert!(page.estimated_len >= 800, "page {} too short", page.sequence);
        }
        assert!(pages.last().unwrap().is_last);
    }

    #[test]
    fn empty_and_text_free_blocks() {
        assert!(paginate(Vec::new(), &config(100, 80)).is_empty());

        let rule = Element::new("hr", Vec::new());
        let pages = paginate([rule], &config(100, 80));
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].estimated_len, crate::node::EMPTY_NODE_LEN);
    }

    #[test]
    fn streaming_push_reports_closed_pages() {
        let mut paginator = Paginator::new(&config(100, 80));
        assert!(paginator.push(block(60)).is_none());
        assert!(paginator.push(block(30)).is_none());
        let closed = paginator.push(block(20)).unwrap();
        assert_eq!(closed.estimated_len, 90);
        assert_eq!(paginator.pending_len(), 20);
        assert_eq!(paginator.closed_pages(), 1);

        let last = paginator.finish().unwrap();
        assert!(last.is_last);
        assert_eq!(last.sequence, 2);
    }
}
