//! Flattening tests: compound inlining, tunnel rewriting, overload
//! selection, idempotence.

use click::errors::{BufferSink, ErrorSink};
use click::graph::{Port, Router, flatten};
use click::lang::parse_string;

fn parse(input: &str) -> Router {
    let mut errh = BufferSink::new();
    let router = parse_string(input, "t.click", &mut errh);
    assert_eq!(errh.nerrors(), 0, "parse failed:\n{}", errh.take_text());
    router
}

fn flattened(input: &str) -> Router {
    let mut router = parse(input);
    let mut errh = BufferSink::new();
    flatten(&mut router, &mut errh);
    assert_eq!(errh.nerrors(), 0, "flatten failed:\n{}", errh.take_text());
    router
}

fn conn(router: &Router, from: &str, fp: u32, to: &str, tp: u32) -> bool {
    let f = router.eindex(from).expect(from);
    let t = router.eindex(to).expect(to);
    router
        .connections()
        .iter()
        .any(|c| c.from == Port::new(f, fp) && c.to == Port::new(t, tp))
}

#[test]
fn test_compound_with_formal_expansion() {
    let r = flattened(
        "elementclass Doubled { $n | input -> Strip($n) -> output; }\n\
         src :: InfiniteSource;\n\
         src -> Doubled(3) -> Discard;\n",
    );
    // tunnels vanish; the inner element is path-prefixed and its
    // configuration carries the bound formal
    assert_eq!(r.nelements(), 3);
    assert_eq!(r.nconnections(), 2);
    let inner = r.element_by_name("Doubled@2/Strip@1").expect("inlined");
    assert_eq!(inner.config, "3");
    assert!(conn(&r, "src", 0, "Doubled@2/Strip@1", 0));
    assert!(conn(&r, "Doubled@2/Strip@1", 0, "Discard@3", 0));
}

#[test]
fn test_keyword_formal_binding() {
    let r = flattened(
        "elementclass K { LENGTH $len | input -> Strip($len) -> output; }\n\
         src :: InfiniteSource; src -> K(LENGTH 9) -> Discard;\n",
    );
    let (_, inner) = r
        .elements()
        .find(|(_, e)| e.class.name() == "Strip")
        .unwrap();
    assert_eq!(inner.config, "9");
}

#[test]
fn test_nested_compounds() {
    let r = flattened(
        "elementclass Inner { input -> Counter -> output; }\n\
         elementclass Outer { input -> Inner -> output; }\n\
         src :: InfiniteSource; src -> Outer -> Discard;\n",
    );
    assert_eq!(r.nelements(), 3);
    let (_, counter) = r
        .elements()
        .find(|(_, e)| e.class.name() == "Counter")
        .expect("inner Counter survives");
    // the name is the nested path
    assert!(counter.name.contains('/'), "name: {}", counter.name);
    assert_eq!(counter.name.matches('/').count(), 2);
}

#[test]
fn test_pass_through_compound() {
    // input wired straight to output: the compound disappears
    let r = flattened(
        "elementclass Wire { input -> output; }\n\
         src :: InfiniteSource; src -> Wire -> Discard;\n",
    );
    assert_eq!(r.nelements(), 2);
    assert_eq!(r.nconnections(), 1);
    assert!(conn(&r, "src", 0, "Discard@3", 0));
}

#[test]
fn test_overload_selected_by_port_count() {
    let r = flattened(
        "elementclass Multi {\n\
           input -> Counter -> output;\n\
         ||\n\
           input [0,1] => [0,1] output;\n\
         }\n\
         src :: InfiniteSource; src -> Multi -> Discard;\n",
    );
    // the 1-in/1-out alternative wins
    assert!(
        r.elements().any(|(_, e)| e.class.name() == "Counter"),
        "first alternative chosen"
    );
}

#[test]
fn test_overload_fallback_to_primitive() {
    let r = flattened(
        "elementclass F { input [0,1] => [0,1] output; ... Counter }\n\
         src :: InfiniteSource; src -> F -> Discard;\n",
    );
    // one-in/one-out doesn't match the compound (2/2): falls back
    let (_, e) = r
        .elements()
        .find(|(_, e)| e.name.starts_with("F@"))
        .expect("fallback element");
    assert_eq!(e.class.name(), "Counter");
}

#[test]
fn test_no_matching_overload_is_error() {
    let mut router = parse(
        "elementclass G { input [0,1] => [0,1] output; }\n\
         src :: InfiniteSource; src -> G -> Discard;\n",
    );
    let mut errh = BufferSink::new();
    flatten(&mut router, &mut errh);
    assert!(errh.nerrors() > 0);
}

#[test]
fn test_flatten_idempotent() {
    let once = flattened(
        "elementclass D { input -> Counter -> output; }\n\
         src :: InfiniteSource; src -> D -> Discard;\n",
    );
    let mut twice = once.clone();
    let mut errh = BufferSink::new();
    flatten(&mut twice, &mut errh);
    assert_eq!(errh.nerrors(), 0);
    assert_eq!(once.unparse(), twice.unparse());
}

#[test]
fn test_flatten_drops_declared_classes() {
    let r = flattened("elementclass Unused { input -> output; } c :: Counter;");
    assert!(r.declared_types().is_empty());
}

#[test]
fn test_group_flattens_like_compound() {
    let r = flattened(
        "src :: InfiniteSource; src -> (input -> Counter -> output) -> Discard;",
    );
    assert_eq!(r.nelements(), 3);
    assert!(r.elements().any(|(_, e)| e.class.name() == "Counter"));
}

#[test]
fn test_scope_variable_reaches_inner_config() {
    let r = flattened(
        "define($len 5);\n\
         elementclass S { input -> Strip($len) -> output; }\n\
         src :: InfiniteSource; src -> S -> Discard;\n",
    );
    let (_, inner) = r
        .elements()
        .find(|(_, e)| e.class.name() == "Strip")
        .unwrap();
    assert_eq!(inner.config, "5");
}
