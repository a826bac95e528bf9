//! Orphan pruning and teardown

mod common;

use common::{Harness, Item, ItemProps, ParallelItem, Parent, ParentProps};
use declarative::{Error, ErrorCategory, Phase, RootOptions, State, StateStore, Status};
use serde_json::json;

fn destroy_options() -> RootOptions {
    RootOptions::new("dev").app("test").phase(Phase::Destroy)
}

#[test]
fn test_undeclared_resources_are_pruned() {
    let h = Harness::new();
    let root = h.dev();
    root.apply::<Item>("a", &ItemProps::new("alpha")).unwrap();
    root.apply::<Item>("b", &ItemProps::new("beta")).unwrap();
    root.finalize().unwrap();
    h.calls.clear();

    let root = h.dev();
    root.apply::<Item>("a", &ItemProps::new("alpha")).unwrap();
    root.finalize().unwrap();

    assert_eq!(h.calls.all(), vec!["delete:b"]);
    let remaining = h.store.all(&h.dev_path()).unwrap();
    assert_eq!(remaining.keys().collect::<Vec<_>>(), vec!["a"]);
}

#[test]
fn test_pruning_can_be_disabled() {
    let h = Harness::new();
    let root = h.dev();
    root.apply::<Item>("a", &ItemProps::new("alpha")).unwrap();
    root.finalize().unwrap();
    h.calls.clear();

    let root = h.root(RootOptions::new("dev").app("test").destroy_orphans(false));
    root.finalize().unwrap();

    assert!(h.calls.all().is_empty());
    assert!(h.store.get(&h.dev_path(), "a").unwrap().is_some());
}

#[test]
fn test_child_scope_not_entered_is_pruned() {
    let h = Harness::new();
    let root = h.dev();
    root.run("web", |scope| scope.apply::<Item>("a", &ItemProps::new("alpha")))
        .unwrap();
    root.run("api", |scope| scope.apply::<Item>("b", &ItemProps::new("beta")))
        .unwrap();
    root.finalize().unwrap();
    assert_eq!(h.store.children(&h.dev_path()).unwrap(), vec!["api", "web"]);
    h.calls.clear();

    let root = h.dev();
    root.run("web", |scope| scope.apply::<Item>("a", &ItemProps::new("alpha")))
        .unwrap();
    root.finalize().unwrap();

    assert_eq!(h.calls.all(), vec!["delete:b"]);
    assert_eq!(h.store.children(&h.dev_path()).unwrap(), vec!["web"]);
}

#[test]
fn test_destroy_runs_in_reverse_creation_order() {
    let h = Harness::new();
    let root = h.dev();
    for id in ["first", "second", "third"] {
        root.apply::<Item>(id, &ItemProps::new(id)).unwrap();
    }
    root.finalize().unwrap();
    h.calls.clear();

    let root = h.root(destroy_options());
    root.finalize().unwrap();

    assert_eq!(
        h.calls.all(),
        vec!["delete:third", "delete:second", "delete:first"]
    );
    assert!(h.store.all(&h.dev_path()).unwrap().is_empty());
}

#[test]
fn test_parallel_destroy_overlaps_deletes() {
    let h = Harness::new();
    let root = h.dev();
    for id in ["p1", "p2", "p3", "p4"] {
        root.apply::<ParallelItem>(id, &ItemProps::new(id).slow_delete(100))
            .unwrap();
    }
    root.finalize().unwrap();
    h.calls.clear();

    let root = h.root(destroy_options().destroy_jobs(4));
    root.finalize().unwrap();

    let mut calls = h.calls.all();
    calls.sort();
    assert_eq!(
        calls,
        vec!["delete:p1", "delete:p2", "delete:p3", "delete:p4"]
    );
    assert!(h.calls.peak() > 1, "peak concurrency was {}", h.calls.peak());
    assert!(h.store.all(&h.dev_path()).unwrap().is_empty());
}

#[test]
fn test_sequential_resource_splits_parallel_batches() {
    let h = Harness::new();
    let root = h.dev();
    root.apply::<ParallelItem>("p1", &ItemProps::new("p1")).unwrap();
    root.apply::<Item>("s", &ItemProps::new("s")).unwrap();
    root.apply::<ParallelItem>("p2", &ItemProps::new("p2")).unwrap();
    root.finalize().unwrap();
    h.calls.clear();

    h.root(destroy_options()).finalize().unwrap();
    assert_eq!(h.calls.all(), vec!["delete:p2", "delete:s", "delete:p1"]);
}

#[test]
fn test_destroy_phase_tears_down_the_whole_tree() {
    let h = Harness::new();
    let root = h.dev();
    root.apply::<Parent>(
        "p",
        &ParentProps {
            children: vec!["x".into(), "y".into()],
        },
    )
    .unwrap();
    root.run("web", |scope| scope.apply::<Item>("a", &ItemProps::new("alpha")))
        .unwrap();
    root.finalize().unwrap();
    h.calls.clear();

    let root = h.root(destroy_options());
    // Applies return stored outputs while destroying
    let output = root
        .run("web", |scope| scope.apply::<Item>("a", &ItemProps::new("alpha")))
        .unwrap();
    assert_eq!(output.name, "alpha");
    assert!(h.calls.all().is_empty());

    root.finalize().unwrap();
    assert_eq!(
        h.calls.all(),
        vec!["delete:y", "delete:x", "delete:p", "delete:a"]
    );
    assert!(h.store.all(&h.dev_path()).unwrap().is_empty());
    assert!(h.store.children(&h.dev_path()).unwrap().is_empty());
}

#[test]
fn test_destroy_signal_tears_down_the_run_scope() {
    let h = Harness::new();
    let root = h.dev();
    let err = root
        .run("web", |scope| {
            scope.apply::<Item>("a", &ItemProps::new("alpha"))?;
            scope.apply::<Item>("b", &ItemProps::new("beta").self_destructing())
        })
        .unwrap_err();

    assert!(matches!(&err, Error::ScopeDestroyed { scope, .. } if scope == "test/dev/web"));
    assert!(!err.is_destroyed());
    assert!(err.is_signal());
    assert_eq!(err.category(), ErrorCategory::Signal);
    assert_eq!(err.fqn(), Some("test/dev/web/b"));
    assert_eq!(
        h.calls.all(),
        vec!["create:a", "create:b", "delete:b", "delete:a"]
    );
    assert!(h.store.all(&h.dev_path().child("web")).unwrap().is_empty());

    root.finalize().unwrap();
    assert!(h.store.children(&h.dev_path()).unwrap().is_empty());
}

#[test]
fn test_destroy_signal_stays_in_the_innermost_run() {
    let h = Harness::new();
    let root = h.dev();
    root.run("outer", |scope| {
        scope.apply::<Item>("keep", &ItemProps::new("kept"))?;
        scope.apply::<Item>("after", &ItemProps::new("later"))
    })
    .unwrap();
    root.finalize().unwrap();
    h.calls.clear();

    let root = h.dev();
    let err = root
        .run("outer", |scope| {
            scope.apply::<Item>("keep", &ItemProps::new("kept"))?;
            scope.run("inner", |inner| {
                inner.apply::<Item>("boom", &ItemProps::new("gone").self_destructing())
            })?;
            scope.apply::<Item>("after", &ItemProps::new("later"))
        })
        .unwrap_err();

    assert!(err.is_signal());
    assert!(!err.is_destroyed());
    assert_eq!(err.fqn(), Some("test/dev/outer/inner/boom"));
    assert_eq!(h.calls.all(), vec!["create:boom", "delete:boom"]);

    let outer = h.dev_path().child("outer");
    let kept = h.store.all(&outer).unwrap();
    assert_eq!(kept.keys().collect::<Vec<_>>(), vec!["after", "keep"]);
    assert!(h.store.children(&outer).unwrap().is_empty());

    root.finalize().unwrap();
    assert!(!root.is_errored());
    assert_eq!(h.calls.all(), vec!["create:boom", "delete:boom"]);
    assert_eq!(h.store.all(&outer).unwrap().len(), 2);
}

#[test]
fn test_pruned_parent_deletes_nested_resources_first() {
    let h = Harness::new();
    let root = h.dev();
    root.apply::<Parent>(
        "p",
        &ParentProps {
            children: vec!["x".into()],
        },
    )
    .unwrap();
    root.finalize().unwrap();
    h.calls.clear();

    h.dev().finalize().unwrap();

    assert_eq!(h.calls.all(), vec!["delete:x", "delete:p"]);
    assert!(h.store.all(&h.dev_path().child("p")).unwrap().is_empty());
    assert!(h.store.children(&h.dev_path()).unwrap().is_empty());
}

#[test]
fn test_destroy_deletes_retired_resources_too() {
    let h = Harness::new();
    h.dev().apply::<Item>("a", &ItemProps::new("alpha")).unwrap();
    // Replaced but never finalized, so the old resource is still retired
    h.dev().apply::<Item>("a", &ItemProps::new("omega")).unwrap();
    h.calls.clear();

    h.root(destroy_options()).finalize().unwrap();

    assert_eq!(h.calls.all(), vec!["delete:a", "delete:a"]);
    assert!(h.store.get(&h.dev_path(), "a").unwrap().is_none());
}

#[test]
fn test_missing_provider_fails_before_any_delete() {
    let h = Harness::new();
    let root = h.dev();
    root.apply::<Item>("a", &ItemProps::new("alpha")).unwrap();
    root.finalize().unwrap();

    let path = h.dev_path();
    let mut gone = State::new("test::Gone", "gone", path.fqn("gone"), 0, json!({}));
    gone.status = Status::Created;
    h.store.set(&path, "gone", &gone).unwrap();
    h.calls.clear();

    let err = h.dev().finalize().unwrap_err();
    assert!(matches!(err, Error::ProviderNotRegistered { ref kind } if kind == "test::Gone"));
    assert!(h.calls.all().is_empty());
    assert_eq!(h.store.all(&path).unwrap().len(), 2);
}

#[test]
fn test_explicit_destroy_of_a_child_scope() {
    let h = Harness::new();
    let root = h.dev();
    let web = root.child("web", Default::default()).unwrap();
    web.apply::<Item>("a", &ItemProps::new("alpha")).unwrap();
    web.apply::<Item>("b", &ItemProps::new("beta")).unwrap();

    web.destroy().unwrap();
    assert_eq!(h.calls.all(), vec!["create:a", "create:b", "delete:b", "delete:a"]);
    assert!(web.states().unwrap().is_empty());

    // Destroyed scopes are already finished
    web.finalize().unwrap();
    assert_eq!(h.calls.all().len(), 4);
}
