//! Navigation footers
//!
//! Once the page after a published page exists, the earlier page is edited to end with a
//! footer: a rule, a link to the next page and a bookmark link. The final page gets an
//! end marker in place of the next link.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bookmarks::BookmarkRegistrar;
use crate::config::LinkerConfig;
use crate::error::EditError;
use crate::node::{Element, Node, PageBlock};
use crate::publisher::{PublishedPage, PublisherClient};

/// A published page awaiting its footer
#[derive(Clone, Debug)]
pub struct LinkedPage {
    /// The page as published
    pub page: PublishedPage,
    /// Bookmark token issued for the page, if issuance succeeded
    pub token: Option<String>,
}

/// Issues bookmark tokens and back-patches footers
pub struct PageLinker {
    publisher: Arc<PublisherClient>,
    registrar: Arc<dyn BookmarkRegistrar>,
    config: LinkerConfig,
}

impl PageLinker {
    /// Create a linker
    pub fn new(
        publisher: Arc<PublisherClient>,
        registrar: Arc<dyn BookmarkRegistrar>,
        config: LinkerConfig,
    ) -> Self {
        Self {
            publisher,
            registrar,
            config,
        }
    }

    /// Issue the bookmark token for a freshly published page
    pub async fn register(&self, book_name: &str, page: PublishedPage) -> LinkedPage {
        let token = match self
            .registrar
            .issue_token(book_name, &page.title, &page.url)
            .await
        {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(url = %page.url, error = %e, "bookmark token not issued");
                None
            }
        };
        LinkedPage { page, token }
    }

    /// Append the footer to `linked`, pointing at `next_url` or marking the end of the book
    pub async fn link(
        &self,
        linked: &LinkedPage,
        next_url: Option<&str>,
    ) -> Result<(), EditError> {
        let page = &linked.page;
        let mut content = page.content.clone();
        content.extend(self.footer(next_url, linked.token.as_deref()));

        let result = self
            .publisher
            .edit_page(&page.path, &page.title, &content, &page.credential)
            .await;
        match &result {
            Ok(()) => debug!(url = %page.url, last = next_url.is_none(), "footer added"),
            Err(e) => warn!(url = %page.url, error = %e, "footer not added"),
        }
        result
    }

    /// Footer blocks for a page
    pub fn footer(&self, next_url: Option<&str>, token: Option<&str>) -> Vec<PageBlock> {
        let mut items = vec![match next_url {
            Some(url) => Node::Element(
                Element::new("a", vec![Node::Text(self.config.next_label.clone())])
                    .with_attr("href", url),
            ),
            None => Node::Text(self.config.end_label.clone()),
        }];

        if let Some(token) = token {
            items.push(Node::Text(self.config.separator.clone()));
            items.push(Node::Element(
                Element::new("a", vec![Node::Text(self.config.bookmark_label.clone())])
                    .with_attr("href", format!("{}{}", self.config.bookmark_link_prefix, token)),
            ));
        }

        vec![Element::new("hr", Vec::new()), Element::new("p", items)]
    }
}
