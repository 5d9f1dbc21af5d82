#![no_main]

use libfuzzer_sys::fuzz_target;
use sdvx_model::{ConvertConfig, Diagnostics, KshDecoder, VoxEncoder};

fuzz_target!(|data: &[u8]| {
    let mut diag = Diagnostics::new();
    if let Ok(song) = KshDecoder::decode_bytes(data, &mut diag) {
        // Anything the reader accepts must analyze and encode
        let chart = &song.chart_info;
        let _ = chart.note_counts();
        let radar = chart.radar();
        assert!(radar.notes <= 200 && radar.tricky <= 200);
        let config = ConvertConfig::default();
        let _ = VoxEncoder::new(&config).encode_to_string(chart);
    }
});
