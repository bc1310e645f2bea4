#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary JSON documents fed through every payload decoder
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let _ = inverter_monitor::monitor::StatusSample::from_data(value.clone());
    let _ = inverter_monitor::monitor::RatedInfo::from_data(value.clone());
    let _ = inverter_monitor::monitor::sample::allowed_currents_from_data(value);
});
