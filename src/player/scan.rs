// Song duration scan

use format::tfmx::TfmxData;
use player::state::TrackPointer;
use player::tracks::{do_track, speed_cia, tempo_timing, time_share_cia};
use ::*;

// Iteration bounds for broken songs
const MAX_STEPS: usize = 0x10000;
const MAX_ROWS : usize = 0x4000;

// CIA period units to microseconds
const CIA_TO_US: f32 = 1.3968255;


/// Replay parameters at the start of a song position.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScanPos {
    pub speed: u16,   // ticks per row minus one
    pub cia  : u16,   // CIA timer period
    pub time : u32,   // milliseconds since start of replay
}

/// Duration of a sub-song and its position table.
#[derive(Clone, Debug, Default)]
pub struct ScanData {
    pub duration: u32,
    pub pos     : Vec<ScanPos>,
}

impl ScanData {
    pub fn position(&self, pos: usize) -> Option<&ScanPos> {
        self.pos.get(pos)
    }
}


/// Walk the track steps of a sub-song running the patterns in simulation
/// mode, adding up the time taken by each row.
pub fn scan_song(data: &TfmxData, song: usize) -> ScanData {
    let sub = match data.sub_song(song) {
        Some(s) => s,
        None    => return ScanData::default(),
    };

    let (mut cia, mut speed) = tempo_timing(sub.tempo);
    let start = sub.start as i64;
    let end = sub.end as i64;

    let mut tracks = [TrackPointer::default(); NUM_TRACKS];
    let mut track_loop: i16 = -1;
    let mut total = 0.0_f32;
    let mut pos = Vec::new();

    let mut j = start;
    let mut steps = 0;
    let mut record = true;

    while j <= end {
        steps += 1;
        if steps > MAX_STEPS {
            warn!("song {}: scan doesn't finish, giving up at position {}", song, j);
            break
        }

        if record {
            let p = ScanPos { speed, cia, time: total as u32 };
            while j - start >= pos.len() as i64 {
                pos.push(p);
            }
        }
        record = true;

        let step = match data.track_step(j as u16) {
            Some(s) => s,
            None    => break,
        };

        if step.is_command() {
            match step.command() {
                0 => {  // stop
                    break
                }
                1 => {  // loop
                    let count = track_loop;
                    track_loop = count.wrapping_sub(1);
                    if count == 0 {
                        track_loop = -1;
                        j += 1;
                        continue
                    }

                    if track_loop < 0 {
                        track_loop = step.arg(1) as i16;
                        if track_loop == 0 || track_loop > 1000 {
                            break
                        }
                    }

                    // jumping back with the loop done: the song is over
                    let target = step.arg(0) as i64;
                    if target < j && track_loop < 0 {
                        break
                    }

                    j = target;
                    record = false;
                    continue
                }
                2 => {  // speed
                    speed = step.arg(0);
                    if let Some(c) = speed_cia(step.arg(1)) {
                        cia = c;
                    }
                }
                3 => {  // time share
                    if let Some(c) = time_share_cia(step.arg(1)) {
                        cia = c;
                    }
                }
                _ => (),
            }
            j += 1;
            continue
        }

        for (k, p) in tracks.iter_mut().enumerate() {
            p.num = (step.0[k] >> 8) as u8;
            if p.num < 0x80 {
                p.step = 0;
                p.wait = 0;
                p.loops = 0xffff;
                p.looped = false;
                p.addr = match data.pattern(p.num) {
                    Some(addr) => addr,
                    None       => {
                        p.num = 0xff;
                        0
                    }
                };
            }
        }

        let row_time = (cia as f32 * CIA_TO_US / 1000.0) * (speed as f32 + 1.0);

        for _ in 0..MAX_ROWS {
            let mut end_patt = false;
            for k in 0..NUM_TRACKS {
                if do_track(&mut tracks, k, data, None) {
                    end_patt = true;
                }
            }

            if end_patt {
                break
            }

            total += row_time;

            if tracks.iter().all(|p| p.stopped()) {
                break
            }
        }

        j += 1;
    }

    debug!("song {}: {} positions, {} ms", song, pos.len(), total as u32);

    ScanData {
        duration: total as u32,
        pos,
    }
}

/// Scan all sub-songs of the module.
pub fn scan(data: &TfmxData) -> Vec<ScanData> {
    (0..data.sub_songs()).map(|song| scan_song(data, song)).collect()
}
