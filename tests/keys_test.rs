use heimdall::{CacheKind, KeyArgs, KeyHasher, ResultCache};

fn query_args(question: &str, doc_id: Option<&str>, k: usize) -> KeyArgs {
    KeyArgs::new()
        .arg(question)
        .named("doc_id", doc_id)
        .named("k", k)
}

#[test]
fn same_arguments_same_key() {
    let a = KeyHasher::derive("embedding", &KeyArgs::new().arg("hello").named("model_name", "m"));
    let b = KeyHasher::derive("embedding", &KeyArgs::new().arg("hello").named("model_name", "m"));
    assert_eq!(a, b);
}

#[test]
fn known_digest_is_stable() {
    // sha256("hello")[..8]
    let key = KeyHasher::derive("embedding", &KeyArgs::new().arg("hello"));
    assert_eq!(key, "embedding:2cf24dba5fb0a30e");
}

#[test]
fn named_argument_order_does_not_matter() {
    let a = KeyArgs::new().arg("q").named("k", 4).named("doc_id", "d");
    let b = KeyArgs::new().arg("q").named("doc_id", "d").named("k", 4);
    assert_eq!(KeyHasher::derive("query", &a), KeyHasher::derive("query", &b));
}

#[test]
fn positional_order_matters() {
    let a = KeyArgs::new().arg("x").arg("y");
    let b = KeyArgs::new().arg("y").arg("x");
    assert_ne!(KeyHasher::derive("query", &a), KeyHasher::derive("query", &b));
}

#[test]
fn any_argument_change_changes_the_key() {
    let base = KeyHasher::derive("query", &query_args("what is rust?", Some("doc-1"), 4));
    for other in [
        query_args("what is go?", Some("doc-1"), 4),
        query_args("what is rust?", Some("doc-2"), 4),
        query_args("what is rust?", None, 4),
        query_args("what is rust?", Some("doc-1"), 5),
    ] {
        assert_ne!(base, KeyHasher::derive("query", &other));
    }
}

#[test]
fn kind_separates_namespaces() {
    let args = query_args("q", None, 4);
    assert_ne!(
        KeyHasher::derive("query", &args),
        KeyHasher::derive("similarity", &args)
    );
}

#[test]
fn absent_optional_renders_as_null() {
    let args = query_args("q", None, 4);
    assert_eq!(args.canonical(), "q|doc_id=null|k=4");
}

#[test]
fn result_cache_keys_are_document_scoped() {
    let key = ResultCache::key_for(CacheKind::Query, &query_args("q", Some("doc-9"), 4));
    assert!(key.starts_with(&KeyHasher::scope_prefix("query", "doc=doc-9")));
}
