//! The immutable procedure tree and its builder.
//!
//! A [`Router`] maps path segments to procedures or nested routers. It is
//! built once at startup by [`RouterBuilder`] and shared read-only by every
//! concurrent request; no runtime mutation path exists. Declared names may
//! themselves contain the `.` separator, so entries are normalized by
//! segment-splitting at build time, and two declarations that normalize to
//! the same segment sequence are rejected there rather than surfacing as a
//! request-time surprise.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::error::ProcedureError;
use crate::procedure::{Procedure, ProcedureKind};

/// Tracing target for routing operations.
pub(crate) const ROUTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::router");

/// Errors surfaced while assembling a router tree.
#[derive(Debug, Error)]
pub enum RouterBuildError {
    /// Two declarations normalized to the same segment sequence.
    #[error("duplicate key: {path}")]
    DuplicateKey {
        /// The colliding path, joined with the `.` separator.
        path: String,
    },
}

/// One node of the router tree.
#[derive(Debug)]
pub enum RouterNode<C> {
    /// A terminal, executable procedure.
    Procedure(Procedure<C>),
    /// A nested subtree.
    Subtree(Router<C>),
}

/// The immutable mapping of path segments to procedures and subtrees.
#[derive(Debug)]
pub struct Router<C> {
    entries: BTreeMap<String, RouterNode<C>>,
}

impl<C> Router<C> {
    /// Starts building a router.
    #[must_use]
    pub fn builder() -> RouterBuilder<C> {
        RouterBuilder {
            entries: BTreeMap::new(),
        }
    }

    /// Looks up the procedure at an exact path, ignoring its kind.
    ///
    /// Returns `None` when any segment has no matching child, when the
    /// terminal node is a subtree rather than a procedure, or when segments
    /// remain after reaching a procedure. No partial matches.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Procedure<C>> {
        let mut current = &self.entries;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            match current.get(segment)? {
                RouterNode::Procedure(procedure) => {
                    if segments.next().is_some() {
                        return None;
                    }
                    return Some(procedure);
                }
                RouterNode::Subtree(router) => {
                    segments.peek()?;
                    current = &router.entries;
                }
            }
        }
        None
    }

    /// Resolves the procedure of the requested kind at an exact path.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error when the path does not resolve or when
    /// the resolved procedure is of a different kind.
    pub fn resolve(&self, path: &str, kind: ProcedureKind) -> Result<&Procedure<C>, ProcedureError> {
        debug!(target: ROUTER_TARGET, path, %kind, "resolving procedure");
        match self.lookup(path) {
            Some(procedure) if procedure.kind() == kind => Ok(procedure),
            _ => Err(ProcedureError::no_procedure(kind, path)),
        }
    }
}

/// Builder assembling a [`Router`] with build-time duplicate detection.
#[derive(Debug)]
pub struct RouterBuilder<C> {
    entries: BTreeMap<String, RouterNode<C>>,
}

impl<C> RouterBuilder<C> {
    /// Registers a procedure under `name`.
    ///
    /// The name may contain `.` separators; it is split into segments and
    /// inserted as a nested entry.
    ///
    /// # Errors
    ///
    /// Returns [`RouterBuildError::DuplicateKey`] when the normalized path
    /// collides with an existing entry.
    pub fn procedure(
        mut self,
        name: &str,
        procedure: Procedure<C>,
    ) -> Result<Self, RouterBuildError> {
        self.insert(name, RouterNode::Procedure(procedure))?;
        Ok(self)
    }

    /// Nests a previously built router under `name`.
    ///
    /// Sibling subtrees that normalize to overlapping segment sequences are
    /// merged; colliding leaves are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`RouterBuildError::DuplicateKey`] when the normalized path
    /// of any nested entry collides with an existing one.
    pub fn nest(mut self, name: &str, router: Router<C>) -> Result<Self, RouterBuildError> {
        self.insert(name, RouterNode::Subtree(router))?;
        Ok(self)
    }

    /// Finishes the build.
    #[must_use]
    pub fn build(self) -> Router<C> {
        Router {
            entries: self.entries,
        }
    }

    fn insert(&mut self, name: &str, node: RouterNode<C>) -> Result<(), RouterBuildError> {
        let mut wrapped = node;
        let mut leaf_segment = String::new();
        for (position, segment) in name.split('.').rev().enumerate() {
            if position == 0 {
                leaf_segment = segment.to_owned();
                continue;
            }
            let mut entries = BTreeMap::new();
            entries.insert(leaf_segment, wrapped);
            wrapped = RouterNode::Subtree(Router { entries });
            leaf_segment = segment.to_owned();
        }
        let mut incoming = BTreeMap::new();
        incoming.insert(leaf_segment, wrapped);
        let mut trail = Vec::new();
        merge_entries(&mut self.entries, incoming, &mut trail)
    }
}

/// Merges `incoming` into `target`, recursing into overlapping subtrees.
fn merge_entries<C>(
    target: &mut BTreeMap<String, RouterNode<C>>,
    incoming: BTreeMap<String, RouterNode<C>>,
    trail: &mut Vec<String>,
) -> Result<(), RouterBuildError> {
    for (segment, node) in incoming {
        trail.push(segment.clone());
        if let Some(existing) = target.get_mut(&segment) {
            match (existing, node) {
                (RouterNode::Subtree(present), RouterNode::Subtree(added)) => {
                    merge_entries(&mut present.entries, added.entries, trail)?;
                }
                _ => {
                    return Err(RouterBuildError::DuplicateKey {
                        path: trail.join("."),
                    });
                }
            }
        } else {
            target.insert(segment, node);
        }
        trail.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::error::ErrorKind;

    use super::*;

    fn constant(value: &'static str) -> Procedure<()> {
        Procedure::query(move |_, _| Ok(json!(value)))
    }

    fn sample_router() -> Router<()> {
        Router::builder()
            .procedure("ping", constant("pong"))
            .expect("insert ping")
            .procedure("user.get", constant("user"))
            .expect("insert user.get")
            .nest(
                "post",
                Router::builder()
                    .procedure("list", constant("posts"))
                    .expect("insert list")
                    .procedure("create", Procedure::mutation(|_, _| Ok(json!("created"))))
                    .expect("insert create")
                    .build(),
            )
            .expect("nest post")
            .build()
    }

    #[test]
    fn resolves_top_level_and_nested_paths() {
        let router = sample_router();
        assert!(router.resolve("ping", ProcedureKind::Query).is_ok());
        assert!(router.resolve("user.get", ProcedureKind::Query).is_ok());
        assert!(router.resolve("post.list", ProcedureKind::Query).is_ok());
        assert!(router.resolve("post.create", ProcedureKind::Mutation).is_ok());
    }

    #[test]
    fn rejects_unknown_segment() {
        let router = sample_router();
        let error = router
            .resolve("post.delete", ProcedureKind::Query)
            .expect_err("unknown path");
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(
            error.message(),
            "no \"query\"-procedure on path \"post.delete\""
        );
    }

    #[test]
    fn rejects_subtree_terminal() {
        let router = sample_router();
        assert!(router.resolve("post", ProcedureKind::Query).is_err());
    }

    #[test]
    fn rejects_segments_past_a_procedure() {
        let router = sample_router();
        assert!(router.resolve("ping.extra", ProcedureKind::Query).is_err());
    }

    #[test]
    fn rejects_kind_mismatch() {
        let router = sample_router();
        let error = router
            .resolve("post.create", ProcedureKind::Query)
            .expect_err("kind mismatch");
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn rejects_empty_path() {
        let router = sample_router();
        assert!(router.resolve("", ProcedureKind::Query).is_err());
    }

    #[test]
    fn duplicate_keys_fail_at_build_time() {
        // `foo` containing `.bar` and `foo.` containing `bar` both
        // normalize to the segments ["foo", "", "bar"].
        let first = Router::builder()
            .procedure(".bar", constant("one"))
            .expect("insert .bar")
            .build();
        let second = Router::builder()
            .procedure("bar", constant("two"))
            .expect("insert bar")
            .build();
        let error = Router::<()>::builder()
            .nest("foo", first)
            .expect("nest foo")
            .nest("foo.", second)
            .expect_err("colliding nests");
        assert!(matches!(
            error,
            RouterBuildError::DuplicateKey { ref path } if path == "foo..bar"
        ));
    }

    #[test]
    fn duplicate_leaf_fails_at_build_time() {
        let error = Router::<()>::builder()
            .procedure("ping", constant("one"))
            .expect("insert ping")
            .procedure("ping", constant("two"))
            .expect_err("duplicate leaf");
        assert!(matches!(
            error,
            RouterBuildError::DuplicateKey { ref path } if path == "ping"
        ));
    }

    #[test]
    fn overlapping_subtrees_merge() {
        let router = Router::<()>::builder()
            .procedure("user.get", constant("get"))
            .expect("insert user.get")
            .procedure("user.list", constant("list"))
            .expect("insert user.list")
            .build();
        assert!(router.resolve("user.get", ProcedureKind::Query).is_ok());
        assert!(router.resolve("user.list", ProcedureKind::Query).is_ok());
    }
}
