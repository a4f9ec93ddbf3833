//! End-to-end runtime tests: load a configuration, run the
//! scheduler, observe through handlers.

use click::driver::{LoadOptions, LoadedRouter, load};
use click::errors::{BufferSink, ErrorSink};

fn load_ok(config: &str) -> LoadedRouter {
    let mut errh = BufferSink::new();
    let loaded = load(config, &LoadOptions::default(), &mut errh);
    match loaded {
        Ok(l) => {
            assert_eq!(errh.nerrors(), 0, "{}", errh.take_text());
            l
        }
        Err(()) => panic!("load failed:\n{}", errh.take_text()),
    }
}

fn load_errors(config: &str) -> String {
    let mut errh = BufferSink::new();
    match load(config, &LoadOptions::default(), &mut errh) {
        Ok(_) => panic!("load unexpectedly succeeded"),
        Err(()) => errh.take_text(),
    }
}

fn read(l: &LoadedRouter, path: &str, handler: &str) -> String {
    l.read_handler(path, handler)
        .unwrap_or_else(|| panic!("no handler {path}.{handler}"))
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_single_push_chain() {
    // three elements, two connections, all ports push; the source
    // emits one packet and the counter sees it
    let mut l = load_ok(
        "src :: InfiniteSource(DATA \\<00 01 02>, LIMIT 1);\n\
         src -> Counter -> Discard;\n",
    );
    assert_eq!(l.element_names().len(), 3);
    assert_eq!(l.processing_code("Counter@2"), Some("H/H"));
    l.run();
    assert_eq!(read(&l, "Counter@2", "count"), "1\n");
    assert_eq!(read(&l, "Discard@3", "count"), "1\n");
    l.shutdown();
}

#[test]
fn test_push_pull_mismatch_aborts() {
    let text = load_errors(
        "src :: InfiniteSource;\n\
         src -> Queue -> Counter -> Queue -> Unqueue -> Discard;\n",
    );
    assert!(
        text.contains("output") && text.contains("input"),
        "diagnostics:\n{text}"
    );
}

#[test]
fn test_unknown_class_aborts() {
    let text = load_errors("x :: FluxCapacitor; Idle -> x;");
    assert!(text.contains("unknown element class"), "{text}");
}

#[test]
fn test_configure_error_aborts() {
    let text = load_errors("q :: Queue(0); Idle -> q -> Unqueue -> Discard;");
    assert!(text.contains("CAPACITY"), "{text}");
    assert!(text.contains("While configuring"), "{text}");
}

#[test]
fn test_compound_runs_after_flatten() {
    let mut l = load_ok(
        "elementclass Pipe { input -> Counter -> output; }\n\
         src :: InfiniteSource(LIMIT 3, BURST 3);\n\
         src -> Pipe -> Discard;\n",
    );
    l.run();
    // the inner element is addressable by its flattened path
    assert_eq!(read(&l, "Pipe@2/Counter@1", "count"), "3\n");
}

// ============================================================================
// Elements in graphs
// ============================================================================

#[test]
fn test_queue_pipeline_drains() {
    let mut l = load_ok(
        "src :: InfiniteSource(LIMIT 5, BURST 2);\n\
         src -> Queue -> Unqueue -> Counter -> Discard;\n",
    );
    l.run();
    assert_eq!(read(&l, "Counter@4", "count"), "5\n");
    assert_eq!(read(&l, "Queue@2", "length"), "0\n");
    assert_eq!(read(&l, "Queue@2", "drops"), "0\n");
}

#[test]
fn test_queue_drops_when_full() {
    let mut l = load_ok(
        "src :: InfiniteSource(LIMIT 10, BURST 10);\n\
         q :: Queue(4);\n\
         src -> q -> Unqueue -> Discard;\n",
    );
    l.run();
    let drops: u64 = read(&l, "q", "drops").trim().parse().unwrap();
    let counted: u64 = read(&l, "Discard@4", "count").trim().parse().unwrap();
    assert_eq!(drops + counted, 10);
    assert!(drops > 0, "burst of 10 into a 4-queue must drop");
}

#[test]
fn test_tee_duplicates() {
    let mut l = load_ok(
        "src :: InfiniteSource(LIMIT 2);\n\
         t :: Tee;\n\
         a :: Counter; b :: Counter;\n\
         src -> t;\n\
         t [0] -> a -> Discard;\n\
         t [1] -> b -> Discard;\n",
    );
    l.run();
    assert_eq!(read(&l, "a", "count"), "2\n");
    assert_eq!(read(&l, "b", "count"), "2\n");
}

#[test]
fn test_paint_switch_routes() {
    let mut l = load_ok(
        "src :: InfiniteSource(LIMIT 4);\n\
         ps :: PaintSwitch;\n\
         red :: Counter; blue :: Counter;\n\
         src -> Paint(1) -> ps;\n\
         ps [0] -> red -> Discard;\n\
         ps [1] -> blue -> Discard;\n",
    );
    l.run();
    assert_eq!(read(&l, "red", "count"), "0\n");
    assert_eq!(read(&l, "blue", "count"), "4\n");
}

#[test]
fn test_strip_shortens_packets() {
    let mut l = load_ok(
        "src :: InfiniteSource(DATA \\<aa bb cc>, LIMIT 2, BURST 2);\n\
         src -> Strip(1) -> AverageCounter -> Discard;\n",
    );
    l.run();
    assert_eq!(read(&l, "AverageCounter@3", "count"), "2\n");
    assert_eq!(read(&l, "AverageCounter@3", "byte_count"), "4\n");
}

// ============================================================================
// Timers and virtual time
// ============================================================================

#[test]
fn test_timed_source_advances_virtual_time() {
    let mut l = load_ok(
        "src :: TimedSource(0.010);\n\
         src -> Counter -> Discard;\n",
    );
    let fired = l.run_limited(5);
    assert_eq!(fired, 5);
    assert_eq!(read(&l, "Counter@2", "count"), "5\n");
    // five 10ms deadlines in virtual time
    assert_eq!(l.now().as_msec(), 50);
    l.shutdown();
}

#[test]
fn test_timers_fire_in_deadline_order() {
    let mut l = load_ok(
        "fast :: TimedSource(0.001); slow :: TimedSource(0.100);\n\
         fast -> a :: Counter -> Discard;\n\
         slow -> b :: Counter -> Discard;\n",
    );
    l.run_limited(50);
    let fast: u64 = read(&l, "a", "count").trim().parse().unwrap();
    let slow: u64 = read(&l, "b", "count").trim().parse().unwrap();
    assert!(fast > slow * 10, "fast {fast} vs slow {slow}");
    l.shutdown();
}

// ============================================================================
// Handlers
// ============================================================================

#[test]
fn test_global_handlers() {
    let l = load_ok("src :: InfiniteSource(LIMIT 1); src -> Counter -> Discard;");
    assert!(read(&l, "", "version").starts_with(env!("CARGO_PKG_VERSION")));
    let list = read(&l, "", "list");
    assert!(list.starts_with("3\n"));
    assert!(list.contains("src\n"));
    assert!(read(&l, "", "config").contains("src :: InfiniteSource"));
}

#[test]
fn test_builtin_element_handlers() {
    let l = load_ok("src :: InfiniteSource(LIMIT 1); src -> Counter -> Discard;");
    assert_eq!(read(&l, "src", "class"), "InfiniteSource\n");
    assert_eq!(read(&l, "src", "config"), "LIMIT 1\n");
    assert_eq!(read(&l, "src", "name"), "src\n");
}

#[test]
fn test_write_handler_resets() {
    let mut l = load_ok("src :: InfiniteSource(LIMIT 3, BURST 3); src -> Counter -> Discard;");
    l.run();
    assert_eq!(read(&l, "Counter@2", "count"), "3\n");
    l.write_handler_captured("Counter@2", "reset", "").unwrap();
    assert_eq!(read(&l, "Counter@2", "count"), "0\n");
}

#[test]
fn test_unknown_write_handler_fails() {
    let mut l = load_ok("src :: InfiniteSource(LIMIT 1); src -> Counter -> Discard;");
    assert!(l.write_handler_captured("Counter@2", "bogus", "x").is_err());
    assert!(l.write_handler_captured("nobody", "reset", "").is_err());
}

#[test]
fn test_handler_listing() {
    let l = load_ok("src :: InfiniteSource(LIMIT 1); src -> Counter -> Discard;");
    let handlers = l.handlers("Counter@2").unwrap();
    let names: Vec<&str> = handlers.iter().map(|h| h.name).collect();
    assert!(names.contains(&"count"));
    assert!(names.contains(&"reset"));
    assert!(names.contains(&"class"));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_shutdown_is_idempotent() {
    let mut l = load_ok("src :: TimedSource(0.010); src -> Counter -> Discard;");
    l.run_limited(2);
    l.shutdown();
    l.shutdown();
    // after shutdown the scheduler has nothing to run
    assert_eq!(l.run_limited(10), 0);
}

#[test]
fn test_output_unparse_flattened() {
    let l = load_ok(
        "elementclass P { input -> Counter -> output; }\n\
         src :: InfiniteSource(LIMIT 1); src -> P -> Discard;\n",
    );
    let plain = l.unparse(false);
    let flat = l.unparse(true);
    assert!(plain.contains("elementclass P"));
    assert!(!flat.contains("elementclass"));
    assert!(flat.contains("P@2/Counter@1"));
}

// ============================================================================
// Check-only analysis
// ============================================================================

#[test]
fn test_check_accepts_clean_configuration() {
    let mut errh = BufferSink::new();
    let result = click::driver::check(
        "elementclass Pipe { input -> Counter -> output; }\n\
         src :: InfiniteSource(LIMIT 1); src -> Pipe -> Discard;\n",
        &LoadOptions::default(),
        &mut errh,
    );
    assert!(result.is_ok(), "{}", errh.take_text());
}

#[test]
fn test_check_reports_broken_uninstantiated_compound() {
    // the declared class is never used, so load() drops it at
    // flatten and starts cleanly; check() walks its body anyway
    let config = "elementclass Bad { input -> Queue -> Queue -> output; }\n\
                  src :: InfiniteSource(LIMIT 1); src -> Counter -> Discard;\n";

    let mut errh = BufferSink::new();
    assert!(load(config, &LoadOptions::default(), &mut errh).is_ok());
    assert_eq!(errh.nerrors(), 0);

    let mut errh = BufferSink::new();
    let result = click::driver::check(config, &LoadOptions::default(), &mut errh);
    assert!(result.is_err());
    let text = errh.take_text();
    assert!(
        text.contains("output") && text.contains("input"),
        "diagnostics:\n{text}"
    );
}

// ============================================================================
// Driver compatibility
// ============================================================================

#[test]
fn test_driver_incompatible_class() {
    use click::registry::Driver;
    let dir = tempfile::tempdir().unwrap();
    let emap = dir.path().join("extra.xml");
    std::fs::write(
        &emap,
        "<elementmap>\n\
         <entry name=\"KernelCounter\" portcount=\"1/1\" processing=\"a/a\" \
          requires=\"linuxmodule\" />\n\
         </elementmap>\n",
    )
    .unwrap();

    let options = LoadOptions {
        driver: Driver::Userlevel,
        elementmap_files: vec![emap],
        ..LoadOptions::default()
    };
    let mut errh = BufferSink::new();
    let result = load(
        "Idle -> KernelCounter -> Discard;",
        &options,
        &mut errh,
    );
    assert!(result.is_err());
    let text = errh.take_text();
    assert!(text.contains("not compatible") || text.contains("unknown element class"), "{text}");
}
