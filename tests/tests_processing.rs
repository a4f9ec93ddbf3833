//! Processing-inference tests: discipline propagation, validation,
//! and port counts.

use rstest::rstest;

use click::errors::{BufferSink, ErrorSink};
use click::graph::{Port, Router};
use click::lang::parse_string;
use click::registry::ElementMap;
use click::semantic::{AGNOSTIC, PULL, PUSH, Processing};

fn emap() -> ElementMap {
    click::runtime::default_elementmap()
}

fn parse(input: &str) -> Router {
    let mut errh = BufferSink::new();
    let router = parse_string(input, "t.click", &mut errh);
    assert_eq!(errh.nerrors(), 0, "parse failed:\n{}", errh.take_text());
    router
}

fn infer(router: &Router) -> (Processing<'_>, BufferSink) {
    let mut errh = BufferSink::new();
    let emap = emap();
    let proc = Processing::new(router, &emap, &mut errh);
    (proc, errh)
}

fn code(input: &str, element: &str) -> String {
    let router = parse(input);
    let (proc, errh) = infer(&router);
    assert_eq!(errh.nerrors(), 0, "inference failed:\n{:#?}", errh.diagnostics());
    proc.processing_code(router.eindex(element).unwrap())
}

// ============================================================================
// Discipline propagation
// ============================================================================

#[test]
fn test_push_chain_all_push() {
    let input = "src :: InfiniteSource(LIMIT 1); src -> Counter -> Discard;";
    assert_eq!(code(input, "src"), "/h");
    assert_eq!(code(input, "Counter@2"), "h/h");
    assert_eq!(code(input, "Discard@3"), "h/");
}

#[test]
fn test_agnostic_resolves_pull_downstream() {
    // Counter sits in a pull context between Queue and Unqueue
    let input = "src :: InfiniteSource; src -> Queue -> Counter -> Unqueue -> Discard;";
    assert_eq!(code(input, "Counter@3"), "l/l");
}

#[test]
fn test_agnostic_chain_propagates_through_flow() {
    // two agnostic elements in a row both adopt push
    let input = "src :: InfiniteSource; src -> Counter -> Paint(2) -> Discard;";
    assert_eq!(code(input, "Counter@2"), "h/h");
    assert_eq!(code(input, "Paint@3"), "h/h");
}

#[test]
fn test_residual_agnostic_becomes_push() {
    // Idle's flow code (x/y) decouples its ports, so nothing definite
    // ever reaches them: residual agnostic resolves to push
    let input = "src :: InfiniteSource; src -> Idle -> Counter -> Discard;";
    let router = parse(input);
    let (proc, _) = infer(&router);
    let idle = router.eindex("Idle@2").unwrap();
    let p = proc.output_processing(Port::new(idle, 0));
    assert_eq!(p & 7, AGNOSTIC | PUSH);
    assert_eq!(code(input, "Counter@3"), "h/h");
}

#[test]
fn test_queue_sides() {
    let input = "src :: InfiniteSource; src -> Queue -> Unqueue -> Discard;";
    let router = parse(input);
    let (proc, errh) = infer(&router);
    assert!(errh.is_empty(), "{:?}", errh.diagnostics());
    let q = router.eindex("Queue@2").unwrap();
    assert_eq!(proc.input_processing(Port::new(q, 0)) & 7, PUSH);
    assert_eq!(proc.output_processing(Port::new(q, 0)) & 7, PULL);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_push_pull_mismatch() {
    // Queue output is pull; a second Queue input is push
    let input = "src :: InfiniteSource; src -> Queue -> Counter -> Queue -> Unqueue -> Discard;";
    let router = parse(input);
    let (_, errh) = infer(&router);
    assert!(errh.nerrors() > 0);
    let text: String = errh
        .diagnostics()
        .iter()
        .map(|d| d.message.clone())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(
        text.contains("output") && text.contains("input"),
        "unexpected diagnostics: {text}"
    );
}

#[test]
fn test_push_output_reuse() {
    let input = "src :: InfiniteSource; c :: Counter; src -> c; src -> [0] Discard;";
    let router = parse(input);
    let (_, errh) = infer(&router);
    let text: String = errh
        .diagnostics()
        .iter()
        .map(|d| d.message.clone())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(text.contains("illegal reuse"), "{text}");
}

#[test]
fn test_unconnected_port_reported() {
    // output 1 of the switch is left out of the gap
    let input = "src :: InfiniteSource; ps :: PaintSwitch; src -> ps; \
                 ps [0] -> Discard; ps [2] -> Discard;";
    let router = parse(input);
    let (_, errh) = infer(&router);
    let text: String = errh
        .diagnostics()
        .iter()
        .map(|d| d.message.clone())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(text.contains("not connected"), "{text}");
}

#[rstest]
#[case("src :: InfiniteSource; x :: Counter; src -> x; src -> [1] x;", "too many")]
#[case("q :: Queue; Unqueue -> Discard;", "too few")]
fn test_port_count_violations(#[case] input: &str, #[case] needle: &str) {
    let router = parse(input);
    let (_, errh) = infer(&router);
    let text: String = errh
        .diagnostics()
        .iter()
        .map(|d| format!("{}\n", d.message))
        .collect();
    assert!(text.contains(needle), "wanted '{needle}' in: {text}");
}

// ============================================================================
// Derived codes
// ============================================================================

#[test]
fn test_compound_processing_code() {
    let input = "elementclass P { input -> Queue -> output; } p :: P;";
    let router = parse(input);
    let class = router.declared_type("P").unwrap();
    let body = &class.compound().unwrap().body;
    let mut errh = BufferSink::new();
    let emap = emap();
    let proc = Processing::new_compound(body, &emap, "", &mut errh);
    assert_eq!(proc.compound_processing_code(), "h/l");
    assert_eq!(proc.compound_port_count_code(), "1/1");
}

#[test]
fn test_decorated_code_marks_resolution() {
    let input = "src :: InfiniteSource; src -> Counter -> Discard;";
    let router = parse(input);
    let (proc, _) = infer(&router);
    let counter = router.eindex("Counter@2").unwrap();
    assert_eq!(proc.decorated_processing_code(counter), "H/H");
}
