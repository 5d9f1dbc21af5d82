use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use anyhow::Result;

use crate::chart::ChartInfo;
use crate::config::ConvertConfig;
use crate::enums::{Lane, SegmentFlag, TiltType};
use crate::note::{SpControllerInfo, VolInfo};
use crate::time::{TimePoint, duration_to_ticks, rational_to_f64};

const SEPARATOR: &str = "//====================================";

const SPCONTROLLER_PREAMBLE: &str = "001,01,00\tRealize\t3\t0\t36.12\t60.12\t110.12\t0.00\n\
001,01,00\tRealize\t4\t0\t0.62\t0.72\t1.03\t0.00\n\
001,01,00\tAIRL_ScaX\t1\t0\t0.00\t1.00\t0.00\t0.00\n\
001,01,00\tAIRR_ScaX\t1\t0\t0.00\t2.00\t0.00\t0.00\n";

/// VOX chart encoder.
pub struct VoxEncoder<'a> {
    config: &'a ConvertConfig,
}

impl<'a> VoxEncoder<'a> {
    pub fn new(config: &'a ConvertConfig) -> Self {
        Self { config }
    }

    pub fn encode_to_string(&self, chart: &ChartInfo) -> Result<String> {
        let mut buf = Vec::new();
        self.encode(chart, &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    pub fn encode<W: Write>(&self, chart: &ChartInfo, out: &mut W) -> Result<()> {
        self.write_header(out)?;
        write_timing(chart, out)?;
        write_tables(chart, out)?;

        writeln!(out, "{SEPARATOR}\n// TRACK INFO\n{SEPARATOR}\n")?;
        for lane in Lane::TRACK_ORDER {
            writeln!(out, "#TRACK{}", lane.track_number())?;
            write_track(chart, lane, out)?;
            writeln!(out, "#END\n")?;
            writeln!(out, "{SEPARATOR}\n")?;
        }

        writeln!(out, "#TRACK AUTO TAB")?;
        for (time, info) in &chart.autotab_infos {
            writeln!(
                out,
                "{}\t{}\t{}",
                chart.timepoint_to_vox(*time),
                duration_to_ticks(info.duration),
                info.which + 2
            )?;
        }
        writeln!(out, "#END\n")?;
        writeln!(out, "{SEPARATOR}\n")?;

        for (name, lane) in [("L", 0), ("R", 1)] {
            writeln!(out, "#TRACK ORIGINAL {name}")?;
            write_vol(chart, &chart.note_data.vol[lane], false, out)?;
            writeln!(out, "#END\n")?;
        }

        writeln!(out, "{SEPARATOR}\n// SPCONTROLER INFO\n{SEPARATOR}\n")?;
        write_spcontroller(chart, out)?;
        writeln!(out, "#END\n")?;
        writeln!(out, "{SEPARATOR}")?;

        if self.config.write_scripts && !chart.script_ids.is_empty() {
            write_scripts(chart, out)?;
        }
        Ok(())
    }

    fn write_header<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "{SEPARATOR}")?;
        writeln!(out, "// SOUND VOLTEX OUTPUT TEXT FILE")?;
        if self.config.include_timestamp {
            let now = chrono::Local::now();
            writeln!(out, "// Converted at {}", now.format("%Y.%m.%d %H:%M:%S"))?;
        }
        writeln!(out, "{SEPARATOR}\n")?;
        writeln!(out, "#FORMAT VERSION\n{}\n#END\n", self.config.format_version)?;
        Ok(())
    }
}

fn write_timing<W: Write>(chart: &ChartInfo, out: &mut W) -> Result<()> {
    writeln!(out, "#BEAT INFO")?;
    for (time, timesig) in &chart.timesigs {
        writeln!(
            out,
            "{}\t{}\t{}",
            chart.timepoint_to_vox(*time),
            timesig.upper(),
            timesig.lower()
        )?;
    }
    writeln!(out, "#END\n")?;

    // Stops share the BPM timeline; a trailing `-` marks the BPM as stopped
    writeln!(out, "#BPM INFO")?;
    let times: BTreeSet<TimePoint> = chart.bpms.keys().chain(chart.stops.keys()).copied().collect();
    let mut bpm = 120.0;
    let mut stopped = false;
    for time in times {
        if let Some(b) = chart.bpms.get(&time) {
            bpm = *b;
        }
        if let Some(s) = chart.stops.get(&time) {
            stopped = *s;
        }
        let marker = if stopped { "-" } else { "" };
        writeln!(out, "{}\t{bpm:.2}\t4{marker}", chart.timepoint_to_vox(time))?;
    }
    writeln!(out, "#END\n")?;

    writeln!(out, "#TILT MODE INFO")?;
    let mut previous: Option<TiltType> = None;
    for (time, tilt) in &chart.tilt_type {
        if previous != Some(*tilt) {
            writeln!(out, "{}\t{}", chart.timepoint_to_vox(*time), tilt.value())?;
        }
        previous = Some(*tilt);
    }
    writeln!(out, "#END\n")?;

    writeln!(out, "#LYRIC INFO\n#END\n")?;
    writeln!(out, "#END POSITION\n{:03},01,00\n#END\n", chart.end_measure)?;
    Ok(())
}

fn write_tables<W: Write>(chart: &ChartInfo, out: &mut W) -> Result<()> {
    writeln!(out, "#TAB EFFECT INFO")?;
    for filter in &chart.filter_list {
        writeln!(out, "{}", filter.to_vox_string())?;
    }
    writeln!(out, "#END\n")?;

    writeln!(out, "#FXBUTTON EFFECT INFO")?;
    for entry in &chart.effect_list {
        writeln!(out, "{}", entry.to_vox_string())?;
    }
    writeln!(out, "#END\n")?;

    writeln!(out, "#TAB PARAM ASSIGN INFO")?;
    for entry in &chart.autotab_list {
        write!(out, "{}", entry.to_vox_string())?;
    }
    writeln!(out, "#END\n")?;

    writeln!(out, "#REVERB EFFECT PARAM\n#END\n")?;
    Ok(())
}

fn write_track<W: Write>(chart: &ChartInfo, lane: Lane, out: &mut W) -> Result<()> {
    let notes = &chart.note_data;
    match lane {
        Lane::BtA | Lane::BtB | Lane::BtC | Lane::BtD => {
            let index = lane.track_number() as usize - 3;
            for (time, bt) in &notes.bt[index] {
                writeln!(out, "{}\t{}\t0", chart.timepoint_to_vox(*time), bt.duration_as_ticks())?;
            }
        }
        Lane::FxL | Lane::FxR => {
            let index = usize::from(lane == Lane::FxR);
            for (time, fx) in &notes.fx[index] {
                let ticks = fx.duration_as_ticks();
                // Holds store the effect slot offset by two, chips the sound effect as is
                let special = if ticks == 0 { fx.special } else { fx.special + 2 };
                writeln!(out, "{}\t{ticks}\t{special}", chart.timepoint_to_vox(*time))?;
            }
        }
        Lane::VolL | Lane::VolR => {
            let index = usize::from(lane == Lane::VolR);
            write_vol(chart, &notes.vol[index], true, out)?;
        }
    }
    Ok(())
}

fn write_vol<W: Write>(
    chart: &ChartInfo,
    points: &BTreeMap<TimePoint, VolInfo>,
    include_interpolated: bool,
    out: &mut W,
) -> Result<()> {
    for (time, vol) in points {
        if !include_interpolated && vol.interpolated {
            continue;
        }
        let when = chart.timepoint_to_vox(*time);
        let wide = if vol.wide_laser { 2 } else { 1 };
        let filter = vol.filter_index.value();
        let ease = vol.ease_type.value();

        if !vol.is_slam() {
            writeln!(
                out,
                "{when}\t{:.6}\t{}\t{}\t{filter}\t{wide}\t0\t{ease}\t{}",
                rational_to_f64(vol.start()),
                vol.point_type.bits(),
                vol.spin_type.value(),
                vol.spin_duration
            )?;
            continue;
        }

        // Slams are a start line followed by an end line at the same time
        let start_flag = if vol.point_type.contains(SegmentFlag::START) { 1 } else { 0 };
        let end_flag = if vol.point_type.contains(SegmentFlag::END) { 2 } else { 0 };
        writeln!(
            out,
            "{when}\t{:.6}\t{start_flag}\t{}\t{filter}\t{wide}\t0\t{ease}\t{}",
            rational_to_f64(vol.start()),
            vol.spin_type.value(),
            vol.spin_duration
        )?;
        writeln!(
            out,
            "{when}\t{:.6}\t{end_flag}\t0\t{filter}\t{wide}\t0\t{ease}\t0",
            rational_to_f64(vol.end())
        )?;
    }
    Ok(())
}

fn write_spcontroller<W: Write>(chart: &ChartInfo, out: &mut W) -> Result<()> {
    let sp = &chart.spcontroller_data;
    writeln!(out, "#SPCONTROLER")?;
    write!(out, "{SPCONTROLLER_PREAMBLE}")?;

    for (points, keyword) in [(&sp.zoom_top, "CAM_RotX"), (&sp.zoom_bottom, "CAM_Radi")] {
        for ((ti, zi), (tf, zf)) in pairs(points) {
            let when = chart.timepoint_to_vox(ti);
            if zi.is_snap() {
                writeln!(
                    out,
                    "{when}\t{keyword}\t2\t0\t{:.2}\t{:.2}\t0.00\t0.00",
                    zi.start, zi.end
                )?;
            }
            let ticks = duration_to_ticks(chart.distance(ti, tf));
            writeln!(
                out,
                "{when}\t{keyword}\t2\t{ticks}\t{:.2}\t{:.2}\t0.00\t0.00",
                zi.end, zf.start
            )?;
        }
    }

    for (points, keyword) in [(&sp.tilt, "Tilt"), (&sp.lane_split, "Morphing2")] {
        for ((ti, pi), (tf, pf)) in pairs(points) {
            let when = chart.timepoint_to_vox(ti);
            if pi.is_snap() {
                let flag = snap_flag(pi.point_type);
                writeln!(
                    out,
                    "{when}\t{keyword}\t2\t0\t{:.2}\t{:.2}\t{flag:.2}\t0.00",
                    pi.start, pi.end
                )?;
            }
            // The tail of a segment has no line of its own
            if pi.point_type.contains(SegmentFlag::END) {
                continue;
            }
            let flag = segment_flag(pi, pf);
            let ticks = duration_to_ticks(chart.distance(ti, tf));
            writeln!(
                out,
                "{when}\t{keyword}\t2\t{ticks}\t{:.2}\t{:.2}\t{flag:.2}\t0.00",
                pi.end, pf.start
            )?;
        }
    }

    let mut hidden = false;
    for (time, hide) in &sp.hidden_bars {
        if *hide != hidden {
            let state = if *hide { "ON" } else { "OFF" };
            writeln!(
                out,
                "{}\tBAROFF\t0\t0\t{state}\t0.00\t0.00\t0.00",
                chart.timepoint_to_vox(*time)
            )?;
            hidden = *hide;
        }
    }
    Ok(())
}

fn pairs(
    points: &BTreeMap<TimePoint, SpControllerInfo>,
) -> impl Iterator<Item = ((TimePoint, &SpControllerInfo), (TimePoint, &SpControllerInfo))> {
    points
        .iter()
        .zip(points.iter().skip(1))
        .map(|((ti, pi), (tf, pf))| ((*ti, pi), (*tf, pf)))
}

fn snap_flag(flag: SegmentFlag) -> f64 {
    if flag == SegmentFlag::POINT {
        1.0
    } else if flag.contains(SegmentFlag::START) {
        2.0
    } else if flag.contains(SegmentFlag::END) {
        3.0
    } else {
        0.0
    }
}

fn segment_flag(pi: &SpControllerInfo, pf: &SpControllerInfo) -> f64 {
    let starts = pi.point_type.contains(SegmentFlag::START);
    let ends = pf.point_type.contains(SegmentFlag::END);
    if starts && ends && !pf.is_snap() {
        1.0
    } else if starts && (pf.is_snap() || !ends) {
        2.0
    } else if pi.point_type == SegmentFlag::MIDDLE && !pf.is_snap() && ends {
        3.0
    } else {
        0.0
    }
}

fn write_scripts<W: Write>(chart: &ChartInfo, out: &mut W) -> Result<()> {
    writeln!(out, "\n#SCRIPT_DEFINE\n\n// Define your scripts here!")?;
    let ids: BTreeSet<u32> = chart
        .script_ids
        .values()
        .flat_map(|segments| segments.values().flatten().copied())
        .collect();
    for id in ids {
        writeln!(out, "@SCRIPTSTART {id}\n\n@SCRIPTEND\n")?;
    }
    writeln!(out, "#END\n")?;

    for lane in Lane::TRACK_ORDER {
        let Some(segments) = chart.script_ids.get(&lane) else {
            continue;
        };
        writeln!(out, "#SCRIPTED_TRACK{}", lane.track_number())?;
        let starts: Vec<(&TimePoint, &Vec<u32>)> = segments.iter().collect();
        for pair in starts.windows(2) {
            let ((ti, ids), (tf, _)) = (pair[0], pair[1]);
            // Laser scripts are not written
            if ids.is_empty() || lane.is_vol() {
                continue;
            }
            let ids = ids.iter().map(u32::to_string).collect::<Vec<_>>().join(" ");
            for time in chart.note_data.button_times(lane) {
                if *ti <= time && time < *tf {
                    writeln!(out, "{} {ids}", chart.timepoint_to_vox(time))?;
                }
            }
        }
        writeln!(out, "#END\n")?;
    }
    writeln!(out, "{SEPARATOR}")?;
    Ok(())
}
