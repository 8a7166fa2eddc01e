//! Options for committing a container to a new image.

use super::container::ContainerSpec;
use super::image::split_reference;
use crate::transport::Query;

/// How a container's filesystem becomes an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOptions {
    /// `repository[:tag]` of the new image.
    pub reference: Option<String>,
    pub comment: Option<String>,
    pub author: Option<String>,
    /// Dockerfile instructions applied to the image, e.g. `CMD ["sh"]`.
    pub changes: Vec<String>,
    /// Pauses the container while committing. Defaults to true.
    pub pause: bool,
    /// Overrides for the new image's container config.
    pub config: Option<ContainerSpec>,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            reference: None,
            comment: None,
            author: None,
            changes: Vec::new(),
            pause: true,
            config: None,
        }
    }
}

impl CommitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_changes<I, S>(mut self, changes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changes.extend(changes.into_iter().map(Into::into));
        self
    }

    pub fn with_pause(mut self, pause: bool) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_config(mut self, config: ContainerSpec) -> Self {
        self.config = Some(config);
        self
    }

    pub(crate) fn query(&self, container: &str) -> Query {
        let mut query = Query::new();
        query.push("container", container);
        if let Some(reference) = self.reference.as_deref() {
            let (repo, tag) = split_reference(reference);
            query.push("repo", repo);
            query.push_opt("tag", tag);
        }
        query.push_opt("comment", self.comment.as_deref());
        query.push_opt("author", self.author.as_deref());
        for change in &self.changes {
            query.push("changes", change);
        }
        query.push("pause", if self.pause { "1" } else { "0" });
        query
    }
}
