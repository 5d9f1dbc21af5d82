//! KSH -> VOX -> VOX reader round trips.

use std::path::Path;

use sdvx_model::{
    ChartInfo, ConvertConfig, Diagnostics, KshDecoder, VoxDecoder, VoxEncoder, time,
};

fn to_vox(chart: &ChartInfo) -> String {
    let config = ConvertConfig {
        include_timestamp: false,
        ..ConvertConfig::default()
    };
    VoxEncoder::new(&config).encode_to_string(chart).unwrap()
}

fn assert_same_events(source: &ChartInfo, decoded: &ChartInfo) {
    assert_eq!(decoded.note_data.bt, source.note_data.bt);
    assert_eq!(decoded.note_data.fx, source.note_data.fx);
    for (lane, (a, b)) in source.note_data.vol.iter().zip(&decoded.note_data.vol).enumerate() {
        assert_eq!(
            a.keys().collect::<Vec<_>>(),
            b.keys().collect::<Vec<_>>(),
            "laser {lane} point times"
        );
        for (pa, pb) in a.values().zip(b.values()) {
            let start = time::rational_to_f64(pa.start()) - time::rational_to_f64(pb.start());
            let end = time::rational_to_f64(pa.end()) - time::rational_to_f64(pb.end());
            assert!(start.abs() < 1e-6 && end.abs() < 1e-6);
            assert_eq!(pa.point_type, pb.point_type);
            assert_eq!(pa.interpolated, pb.interpolated);
        }
    }
}

fn round_trip(ksh: &str) {
    let mut diag = Diagnostics::new();
    let song = KshDecoder::decode_str(ksh, &mut diag).unwrap();
    let vox = to_vox(&song.chart_info);

    let mut vox_diag = Diagnostics::new();
    let decoded = VoxDecoder::decode_str(&vox, &mut vox_diag).unwrap();
    assert!(vox_diag.is_empty(), "{:?}", vox_diag.warnings());

    assert_same_events(&song.chart_info, &decoded);
    assert_eq!(decoded.note_counts(), song.chart_info.note_counts());
    assert_eq!(decoded.bpms, song.chart_info.bpms);
    assert_eq!(decoded.timesigs, song.chart_info.timesigs);

    // Writing the decoded chart again gives the same document
    assert_eq!(to_vox(&decoded), vox);
}

#[test]
fn test_holds_lasers_and_effects() {
    let ksh = "title=Round Trip\nartist=tester\nt=140\nver=171\n--\n\
        1000|00|0-\n0200|10|:-\n0200|10|:-\n0000|00|o-\n--\n\
        beat=3/4\n0010|02|-o\n0001|02|-:\n0000|00|-0\n--\n\
        t=200\n2000|00|--\n2000|00|--\n0000|00|--\n--\n";
    round_trip(ksh);
}

#[test]
fn test_curved_laser_keeps_interpolated_points() {
    let ksh = "title=Curve\nartist=tester\nt=120\nver=171\n--\n\
        //curveBeginL=4\n0000|00|0-\n0000|00|:-\n0000|00|:-\n0000|00|o-\n--\n\
        0000|00|--\n--\n";
    let mut diag = Diagnostics::new();
    let song = KshDecoder::decode_str(ksh, &mut diag).unwrap();
    let lane = &song.chart_info.note_data.vol[0];
    assert!(lane.values().any(|p| p.interpolated));
    round_trip(ksh);
}

#[test]
fn test_sample_chart() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test-ksh/basic.ksh");
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap();
        round_trip(&content);
    }
}

#[test]
fn test_shift_jis_files() {
    let dir = tempfile::tempdir().unwrap();
    let ksh_path = dir.path().join("chart.ksh");
    let text = "title=テスト曲\nartist=tester\nt=120\nver=171\n--\n1000|00|--\n0000|02|--\n--\n";
    let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode(text);
    std::fs::write(&ksh_path, &encoded).unwrap();

    let mut diag = Diagnostics::new();
    let song = KshDecoder::decode(&ksh_path, &mut diag).unwrap();
    assert_eq!(song.song_info.title, "テスト曲");

    let vox_path = dir.path().join("chart.vox");
    std::fs::write(&vox_path, to_vox(&song.chart_info)).unwrap();
    let decoded = VoxDecoder::decode(&vox_path, &mut diag).unwrap();
    assert_same_events(&song.chart_info, &decoded);
}
