#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are both fine; panics are not.
    if let Ok(cfg) = weigh_config::load_toml(data)
        && cfg.validate().is_ok()
    {
        // A validated config must convert into a buildable runtime config.
        let core: weigh_core::ControllerCfg = (&cfg).into();
        assert!(core.display.step_kg > 0.0);
        assert!(cfg.device.tare_byte().is_some());
    }
});
