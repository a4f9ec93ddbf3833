//! Flow-code and reachability tests, including derived compound flow
//! codes.

use click::errors::{BufferSink, ErrorSink};
use click::graph::{Port, Router};
use click::lang::parse_string;
use click::semantic::{FlowCode, Processing};

fn parse(input: &str) -> Router {
    let mut errh = BufferSink::new();
    let router = parse_string(input, "t.click", &mut errh);
    assert_eq!(errh.nerrors(), 0, "parse failed:\n{}", errh.take_text());
    router
}

#[test]
fn test_forward_reachability_follows_connections() {
    let router = parse("src :: InfiniteSource; src -> Counter -> Paint(1) -> Discard;");
    let emap = click::runtime::default_elementmap();
    let mut errh = BufferSink::new();
    let proc = Processing::new(&router, &emap, &mut errh);

    let src = router.eindex("src").unwrap();
    let discard = router.eindex("Discard@4").unwrap();

    let mut ports = vec![false; proc.npidx(true)];
    ports[proc.output_pidx(Port::new(src, 0))] = true;
    // forward from src's output: cross into inputs first
    let mut inputs = vec![false; proc.npidx(false)];
    proc.follow_connections(&ports, true, &mut inputs);
    proc.follow_reachable(&mut inputs, false, true);
    assert!(inputs[proc.input_pidx(Port::new(discard, 0))]);
}

#[test]
fn test_reachability_stops_at_disjoint_flow() {
    // Idle's x/y flow code blocks propagation
    let router = parse("src :: InfiniteSource; src -> Idle -> Counter -> Discard;");
    let emap = click::runtime::default_elementmap();
    let mut errh = BufferSink::new();
    let proc = Processing::new(&router, &emap, &mut errh);

    let src = router.eindex("src").unwrap();
    let counter = router.eindex("Counter@3").unwrap();

    let mut ports = vec![false; proc.npidx(true)];
    ports[proc.output_pidx(Port::new(src, 0))] = true;
    let mut inputs = vec![false; proc.npidx(false)];
    proc.follow_connections(&ports, true, &mut inputs);
    proc.follow_reachable(&mut inputs, false, true);
    assert!(!inputs[proc.input_pidx(Port::new(counter, 0))]);
}

#[test]
fn test_compound_flow_code_full() {
    let router = parse("elementclass P { input -> Counter -> output; } p :: P;");
    let declared = router.declared_type("P").unwrap();
    let body = &declared.compound().unwrap().body;
    let emap = click::runtime::default_elementmap();
    let mut errh = BufferSink::new();
    let proc = Processing::new_compound(body, &emap, "", &mut errh);
    // single input reaching the single output
    assert_eq!(proc.compound_flow_code(), "x/x");
}

#[test]
fn test_compound_flow_code_disjoint_paths() {
    // two independent lanes through the compound
    let router = parse(
        "elementclass Lanes {\n\
           input [0] -> Counter -> [0] output;\n\
           input [1] -> Counter -> [1] output;\n\
         } l :: Lanes;",
    );
    let declared = router.declared_type("Lanes").unwrap();
    let body = &declared.compound().unwrap().body;
    let emap = click::runtime::default_elementmap();
    let mut errh = BufferSink::new();
    let proc = Processing::new_compound(body, &emap, "", &mut errh);
    assert_eq!(proc.compound_flow_code(), "xy/xy");
}

#[test]
fn test_compound_flow_code_no_paths() {
    let router = parse(
        "elementclass Dead { input -> Discard; Idle -> output; } d :: Dead;",
    );
    let declared = router.declared_type("Dead").unwrap();
    let body = &declared.compound().unwrap().body;
    let emap = click::runtime::default_elementmap();
    let mut errh = BufferSink::new();
    let proc = Processing::new_compound(body, &emap, "", &mut errh);
    let code = proc.compound_flow_code();
    // input does not reach output
    let fc = FlowCode::parse(&code).unwrap().expect("non-trivial code");
    assert!(!fc.port_bits(0, false).intersects(&fc.port_bits(0, true)));
}

#[test]
fn test_bad_flow_code_warns_and_allows_all() {
    use click::base::Landmark;
    let mut errh = BufferSink::new();
    let fc = FlowCode::parse_lenient("x[/y", "Bogus", &Landmark::unknown(), &mut errh);
    assert!(fc.is_none(), "degrades to full connectivity");
    assert_eq!(errh.nerrors(), 0, "only a warning");
    assert_eq!(errh.diagnostics().len(), 1);
}
