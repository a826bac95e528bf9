//! `reconcile apply` - make persisted state match the manifest

use super::Deployment;
use crate::Context;
use crate::cli::DeployArgs;
use crate::manifest::ResourceDecl;
use crate::progress::{self, ConsoleProgress};
use crate::ui;
use anyhow::{Context as _, Result, bail};
use declarative::{ApplyOptions, Phase, Scope};
use std::sync::Arc;

pub fn run(ctx: &Context, args: &DeployArgs) -> Result<()> {
    let deployment = Deployment::load_for_deploy(ctx, args)?;
    let progress = Arc::new(ConsoleProgress::new(ctx.verbose > 0));
    let root = deployment.root(Phase::Up, progress.clone())?;

    if !ctx.quiet {
        ui::header(&format!("Applying {}", root.path()));
    }

    let tree = ScopeTree::build(&deployment.manifest.resources);
    let concluded = conclude(&root, tree.declare(&root));
    // Prunes orphans on success; only logs when the run failed or stopped
    let finalized = root.finalize();

    let summary = progress.summary();
    let stopped = concluded?;
    finalized.context("Failed to finish the run")?;

    if let Some(signal) = stopped {
        ui::warn(&format!("Apply stopped early: {}", signal));
    }
    if !ctx.quiet {
        ui::success(&progress::describe(&summary));
    }
    if !summary.is_success() {
        bail!("{} resources failed", summary.failed);
    }
    Ok(())
}

/// Settle the root scope after declaring the manifest
///
/// A resource destroying itself stops the run without failing it: the root is
/// interrupted and the signal handed back. Any other error marks the root as
/// failed.
fn conclude(
    root: &Scope,
    declared: declarative::Result<()>,
) -> Result<Option<declarative::Error>> {
    match declared {
        Ok(()) => Ok(None),
        Err(err) if err.is_signal() => {
            log::info!("Run stopped: {}", err);
            root.interrupt();
            Ok(Some(err))
        }
        Err(err) => {
            root.fail();
            Err(err).context("Apply failed")
        }
    }
}

/// Manifest resources grouped by the child scope that declares them
#[derive(Debug, Default)]
pub(crate) struct ScopeTree<'a> {
    resources: Vec<&'a ResourceDecl>,
    children: Vec<(&'a str, ScopeTree<'a>)>,
}

impl<'a> ScopeTree<'a> {
    pub(crate) fn build(resources: &'a [ResourceDecl]) -> Self {
        let mut tree = Self::default();
        for resource in resources {
            tree.insert(&resource.scope_segments(), resource);
        }
        tree
    }

    fn insert(&mut self, segments: &[&'a str], resource: &'a ResourceDecl) {
        let Some((first, rest)) = segments.split_first() else {
            self.resources.push(resource);
            return;
        };

        let index = match self.children.iter().position(|(name, _)| name == first) {
            Some(index) => index,
            None => {
                self.children.push((*first, Self::default()));
                self.children.len() - 1
            }
        };
        self.children[index].1.insert(rest, resource);
    }

    /// Apply this level's resources, then run each child scope
    pub(crate) fn declare(&self, scope: &Scope) -> declarative::Result<()> {
        for resource in &self.resources {
            scope.apply_value(
                &resource.kind,
                &resource.id,
                resource.props.clone(),
                ApplyOptions::default(),
            )?;
        }
        for (name, child) in &self.children {
            scope.run(name, |child_scope| child.declare(child_scope))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use crate::providers;
    use declarative::{MemoryStateStore, Registry, RootOptions, ScopePath, StateStore};

    const MANIFEST: &str = r#"
app = "site"

[[resource]]
kind = "fs::Folder"
id = "public"
scope = "web"

[[resource]]
kind = "fs::File"
id = "index"
scope = "web/pages"

[[resource]]
kind = "fs::File"
id = "robots"
scope = "web"
"#;

    #[test]
    fn test_tree_groups_by_scope_in_order() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let tree = ScopeTree::build(&manifest.resources);

        assert!(tree.resources.is_empty());
        assert_eq!(tree.children.len(), 1);
        let (name, web) = &tree.children[0];
        assert_eq!(*name, "web");
        let ids: Vec<&str> = web.resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["public", "robots"]);
        assert_eq!(web.children[0].0, "pages");
        assert_eq!(web.children[0].1.resources[0].id, "index");
    }

    fn memory_root() -> Scope {
        let registry = Arc::new(Registry::new());
        providers::register_builtin(&registry).unwrap();
        Scope::root(
            RootOptions::new("dev").app("site"),
            Arc::new(MemoryStateStore::new()),
            registry,
        )
        .unwrap()
    }

    #[test]
    fn test_conclude_stops_without_failing_on_destroy() {
        let root = memory_root();
        let signal = declarative::Error::ScopeDestroyed {
            scope: "site/dev/web".into(),
            fqn: "site/dev/web/page".into(),
        };

        let stopped = conclude(&root, Err(signal)).unwrap();
        assert!(stopped.is_some_and(|e| e.is_signal()));
        assert!(root.is_interrupted());
        assert!(!root.is_errored());
        root.finalize().unwrap();
    }

    #[test]
    fn test_conclude_fails_the_root_on_errors() {
        let root = memory_root();
        let err = conclude(&root, Err(declarative::Error::SamePassword)).unwrap_err();

        assert!(err.to_string().contains("Apply failed"));
        assert!(root.is_errored());
        assert!(!root.is_interrupted());
    }

    #[test]
    fn test_conclude_passes_success_through() {
        let root = memory_root();
        assert!(conclude(&root, Ok(())).unwrap().is_none());
        assert!(!root.is_errored());
    }

    #[test]
    fn test_declare_applies_into_child_scopes() {
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| dir.path().join(name).to_string_lossy().to_string();
        let manifest = Manifest::parse(&format!(
            r#"
app = "site"

[[resource]]
kind = "fs::Folder"
id = "public"
props = {{ path = "{public}" }}

[[resource]]
kind = "fs::File"
id = "index"
scope = "pages"
props = {{ path = "{index}", content = "hi" }}
"#,
            public = path("public"),
            index = path("public/index.html"),
        ))
        .unwrap();

        let store = Arc::new(MemoryStateStore::new());
        let registry = Arc::new(Registry::new());
        providers::register_builtin(&registry).unwrap();
        let root = Scope::root(
            RootOptions::new("dev").app("site"),
            store.clone(),
            registry,
        )
        .unwrap();

        ScopeTree::build(&manifest.resources)
            .declare(&root)
            .unwrap();
        root.finalize().unwrap();

        let stage = ScopePath::root(Some("site"), "dev");
        assert!(store.get(&stage, "public").unwrap().is_some());
        assert!(store.get(&stage.child("pages"), "index").unwrap().is_some());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("public/index.html")).unwrap(),
            "hi"
        );
    }
}
