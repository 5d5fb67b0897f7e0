//! Helpers for inspecting published pages and service events

use std::time::Duration;

use epub_publish::{BookEvent, Node, PageBlock, UserId};
use tokio::sync::broadcast;

/// All text of a page, blocks joined by newlines
pub fn page_text(content: &[PageBlock]) -> String {
    content
        .iter()
        .map(|block| block.text())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Walk every node of a page in document order
fn walk<'a>(content: &'a [PageBlock], mut visit: impl FnMut(&'a Node)) {
    let mut stack: Vec<&Node> = Vec::new();
    for block in content {
        stack.extend(block.children.iter().rev());
        while let Some(node) = stack.pop() {
            visit(node);
            if let Node::Element(el) = node {
                stack.extend(el.children.iter().rev());
            }
        }
    }
}

/// Every link target in a page, in document order
pub fn links(content: &[PageBlock]) -> Vec<String> {
    let mut found = Vec::new();
    walk(content, |node| {
        if let Node::Element(el) = node
            && el.tag == "a"
            && let Some(href) = el.attrs.get("href")
        {
            found.push(href.clone());
        }
    });
    found
}

/// Image sources in a page, in document order
pub fn image_sources(content: &[PageBlock]) -> Vec<String> {
    let mut found = Vec::new();
    walk(content, |node| {
        if let Node::Image(src) = node {
            found.push(src.clone());
        }
    });
    found
}

/// Wait for the terminal event of a user's book
pub async fn wait_for_terminal(
    events: &mut broadcast::Receiver<BookEvent>,
    user: UserId,
    timeout: Duration,
) -> Option<BookEvent> {
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(
                    event @ (BookEvent::Completed { .. }
                    | BookEvent::Failed { .. }
                    | BookEvent::Cancelled { .. }),
                ) if event.user() == user => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}
