//! End-to-end conversion scenarios: KSH text in, counts and VOX lines out.

use sdvx_model::{
    ConvertConfig, Diagnostics, KshDecoder, SongChart, SpinType, VoxEncoder, WarningKind,
};

const HEADER: &str =
    "title=Scenario\nartist=tester\neffect=someone\ndifficulty=extended\nlevel=1\nt=120\nver=171\n";

fn decode(body: &str) -> (SongChart, Diagnostics) {
    let mut diag = Diagnostics::new();
    let content = format!("{HEADER}--\n{body}");
    let song = KshDecoder::decode_str(&content, &mut diag).unwrap();
    (song, diag)
}

/// Sixteen-line measure with the given lines on top and empty rows below.
fn measure(lines: &[&str]) -> String {
    let mut body = String::new();
    for i in 0..16 {
        body.push_str(lines.get(i).copied().unwrap_or("0000|00|--"));
        body.push('\n');
    }
    body.push_str("--\n");
    body
}

fn encode(song: &SongChart) -> String {
    let config = ConvertConfig {
        include_timestamp: false,
        ..ConvertConfig::default()
    };
    VoxEncoder::new(&config).encode_to_string(&song.chart_info).unwrap()
}

fn section<'a>(vox: &'a str, name: &str) -> Vec<&'a str> {
    vox.lines()
        .skip_while(|l| *l != name)
        .skip(1)
        .take_while(|l| *l != "#END")
        .collect()
}

#[test]
fn test_single_chip() {
    let (song, diag) = decode(&measure(&["1000|00|--"]));
    let chart = &song.chart_info;
    assert_eq!(chart.chip_notecount(), 1);
    assert_eq!(chart.long_notecount(), 0);
    assert_eq!(chart.vol_notecount(), 0);
    assert_eq!(chart.max_chain(), 1);
    assert_eq!(chart.max_ex_score(), 5);
    assert!(diag.is_empty());
}

#[test]
fn test_one_sixteenth_laser_is_one_tick() {
    let (song, diag) = decode(&measure(&["0000|00|0-", "0000|00|o-"]));
    let lane = &song.chart_info.note_data.vol[0];
    assert_eq!(lane.len(), 2);
    assert!(lane.values().all(|p| !p.is_slam()));
    assert_eq!(song.chart_info.vol_notecount(), 1);
    assert!(!diag.contains(WarningKind::UnmatchedSpin));
}

#[test]
fn test_slam_with_spin_is_written() {
    // 32 rows per measure puts the two points 1/32 apart
    let mut body = String::from("0000|00|0-@)192\n0000|00|o-\n");
    for _ in 0..30 {
        body.push_str("0000|00|--\n");
    }
    body.push_str("--\n");
    let (song, diag) = decode(&body);
    assert!(!diag.contains(WarningKind::UnmatchedSpin));

    let slam = song.chart_info.note_data.vol[0].values().next().unwrap();
    assert!(slam.is_slam());
    assert_eq!(slam.spin_type, SpinType::SingleSpin);

    let vox = encode(&song);
    let lines = section(&vox, "#TRACK1");
    assert_eq!(lines.len(), 2);
    let fields: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!(fields[0], "001,01,00");
    assert_eq!(fields[1], "0.000000");
    assert_eq!(fields[3], "1");
    assert!(fields[8].parse::<u32>().unwrap() > 0);
    let end: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(end[1], "1.000000");
}

#[test]
fn test_hold_leniency_through_decoder() {
    // Six 1/16 ticks, then seven
    let (song, _) = decode(&measure(&[
        "2000|00|--", "2000|00|--", "2000|00|--", "2000|00|--", "2000|00|--", "2000|00|--",
    ]));
    assert_eq!(song.chart_info.long_notecount(), 5);

    let (song, _) = decode(&measure(&[
        "2000|00|--", "2000|00|--", "2000|00|--", "2000|00|--", "2000|00|--", "2000|00|--",
        "2000|00|--",
    ]));
    assert_eq!(song.chart_info.long_notecount(), 5);
}

#[test]
fn test_one_tick_hold() {
    let (song, _) = decode(&measure(&["2000|00|--"]));
    assert_eq!(song.chart_info.long_notecount(), 1);
}

#[test]
fn test_radar_of_empty_chart_is_zero() {
    let (song, _) = decode(&measure(&[]));
    let radar = song.chart_info.radar();
    assert_eq!(radar.notes, 0);
    assert_eq!(radar.peak, 0);
}

#[test]
fn test_radar_clamped_for_dense_chart() {
    let mut body = String::from("t=999\n");
    for _ in 0..64 {
        body.push_str(&measure(&["1111|22|--"; 16]));
    }
    let (song, _) = decode(&body);
    let radar = song.chart_info.radar();
    for value in [
        radar.notes,
        radar.peak,
        radar.tsumami,
        radar.onehand,
        radar.handtrip,
        radar.tricky,
    ] {
        assert!(value <= 200);
    }
    assert_eq!(radar.notes, 200);
}

#[test]
fn test_hold_after_many_empty_measures() {
    let hold = "2000|00|--\n2000|00|--\n--\n";
    let (near, _) = decode(hold);

    let mut body = "0000|00|--\n--\n".repeat(60_000);
    body.push_str(hold);
    let (far, _) = decode(&body);

    let chart = &far.chart_info;
    assert!(chart.long_notecount() > 0);
    assert_eq!(chart.long_notecount(), near.chart_info.long_notecount());
}
