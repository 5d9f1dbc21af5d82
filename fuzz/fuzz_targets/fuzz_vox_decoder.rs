#![no_main]

use libfuzzer_sys::fuzz_target;
use sdvx_model::{Diagnostics, VoxDecoder};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let mut diag = Diagnostics::new();
        let _ = VoxDecoder::decode_str(text, &mut diag);
    }
});
