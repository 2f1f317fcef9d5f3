#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use nova_flow::{analyze_class, FlowConfig};
use tokio_util::sync::CancellationToken;

mod utils;

fn runner() -> &'static utils::Runner {
    static RUNNER: OnceLock<utils::Runner> = OnceLock::new();
    RUNNER.get_or_init(|| {
        utils::Runner::spawn("fuzz_flow", |input| {
            let Ok(class) = nova_classfile::ClassFile::parse(input) else {
                return;
            };
            let config = FlowConfig {
                max_frame_updates: 10_000,
                ..FlowConfig::default()
            };
            for report in analyze_class(&class, &config, &CancellationToken::new()) {
                let Some(analysis) = report.analysis() else {
                    continue;
                };
                let leaks = &analysis.leaks;
                assert_eq!(leaks.not_null.len(), leaks.nullable.len());
                for (not_null, nullable) in leaks.not_null.iter().zip(&leaks.nullable) {
                    assert!(!not_null || *nullable, "not_null without nullable");
                }
                let graph = &analysis.flow.graph;
                for edge in graph.edges() {
                    assert!(edge.from < graph.node_count() && edge.to < graph.node_count());
                }
            }
        })
    })
}

fuzz_target!(|data: &[u8]| {
    runner().run("fuzz_flow", data);
});
