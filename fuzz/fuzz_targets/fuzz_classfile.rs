#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;

mod utils;

fn runner() -> &'static utils::Runner {
    static RUNNER: OnceLock<utils::Runner> = OnceLock::new();
    RUNNER.get_or_init(|| {
        utils::Runner::spawn("fuzz_classfile", |input| {
            if let Ok(class) = nova_classfile::ClassFile::parse(input) {
                for method in &class.methods {
                    let _ = method.method_descriptor();
                }
            }
        })
    })
}

fuzz_target!(|data: &[u8]| {
    runner().run("fuzz_classfile", data);
});
