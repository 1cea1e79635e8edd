#![no_main]
use libfuzzer_sys::fuzz_target;
use weigh_core::protocol::{DeviceLine, parse};
use weigh_core::quantize::compute;
use weigh_core::{DisplayCfg, NegativePolicy, ScaleFactor};

fuzz_target!(|data: &str| {
    // Arbitrary device output must classify without panicking, and every
    // weight it yields must format as a finite two-decimal value.
    if let DeviceLine::WeightSample(r) = parse(data) {
        assert!(r.value.is_finite());
        for policy in [NegativePolicy::Clamp, NegativePolicy::Preserve] {
            let cfg = DisplayCfg::default().with_policy(policy);
            let w = compute(r, ScaleFactor::DEFAULT, &cfg);
            assert!(w.kg.is_finite());
            assert!(w.text.ends_with(" kg"));
        }
    }
});
