#![no_main]

use libfuzzer_sys::fuzz_target;
use pae_net::message::ethernet_to_event;

fuzz_target!(|data: &[u8]| {
    // Only panics matter here; decode errors are expected.
    let _ = ethernet_to_event(data);
});
