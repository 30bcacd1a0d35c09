// Track step sequencer and pattern interpreter

use std::cmp;
use format::tfmx::TfmxData;
use player::InfoEvent;
use player::state::{Machine, Mdb, State, TrackPointer};
use ::*;

// Pattern instructions run for one track in one row before it's considered stuck
const MAX_PATTERN_STEPS: usize = 0x4000;

// Track step commands followed in one call before giving up
const MAX_TRACK_STEPS: usize = 0x1000;

// Pattern end restarts in one row
const MAX_RESTARTS: usize = 0x400;

pub fn bpm(cia: u16) -> u32 {
    if cia == 0 { 0 } else { CIA_BPM / cia as u32 }
}

// CIA period and prescale for a sub-song tempo value
pub fn tempo_timing(tempo: u16) -> (u16, u16) {
    if tempo >= 0x10 {
        ((CIA_BPM / tempo as u32) as u16, 5)
    } else {
        (CIA_DEFAULT, tempo)
    }
}

// CIA period set by the speed command, if its tempo argument is usable
pub fn speed_cia(arg: u16) -> Option<u16> {
    let x = (arg & 0x1ff) as u32;
    if arg & 0xf200 == 0 && x > 0xf {
        Some((CIA_BPM / x) as u16)
    } else {
        None
    }
}

// CIA period set by the time share command
pub fn time_share_cia(arg: u16) -> Option<u16> {
    if arg & 0x8000 != 0 {
        return None
    }
    let xx = cmp::max(arg as u8 as i8, -0x20) as i32;
    Some(((CIA_DEFAULT as i32 * (xx + 100)) / 100) as u16)
}


impl Mdb {
    pub fn do_fade(&mut self, speed: i8, dest: i8) {
        self.fade_dest = dest;
        self.fade_time = speed;
        self.fade_reset = speed;

        if speed == 0 || self.master_vol == speed {
            self.master_vol = dest;
            self.fade_slope = 0;
            return
        }

        self.fade_slope = if self.master_vol > self.fade_dest { -1 } else { 1 };
    }
}


/// Run one row of the pattern stream of track `idx`. Without a machine the
/// track is only simulated: notes, effects and cues are skipped and the song
/// position is left alone.
///
/// Returns true if the track reached the end of its pattern. When simulating
/// it also returns true once every track is stopped or looping forever.
pub fn do_track(tracks: &mut [TrackPointer; NUM_TRACKS], idx: usize, data: &TfmxData, mut machine: Option<&mut Machine>) -> bool {
    {
        let p = &mut tracks[idx];

        if p.num == 0xfe {
            p.num = 0xff;
            if let Some(m) = machine {
                m.channel_off(p.xpose as u8 as usize);
            }
            return false
        }

        if p.addr == 0 || p.stopped() {
            return false
        }

        let wait = p.wait;
        p.wait = wait.wrapping_sub(1);
        if wait != 0 {
            return false
        }
    }

    for _ in 0..MAX_PATTERN_STEPS {
        let mut x = match data.word(tracks[idx].addr, tracks[idx].step) {
            Some(w) => w,
            None    => {
                debug!("track {}: pattern runs past the music data", idx);
                tracks[idx].num = 0xff;
                return false
            }
        };
        tracks[idx].step = tracks[idx].step.wrapping_add(1);

        let t = x.b0();

        if t < 0xf0 {
            let wait_note = t & 0xc0 == 0x80;
            if wait_note {
                tracks[idx].wait = x.b3();
                x.set_b3(0);
            }

            let mut note = t.wrapping_add(tracks[idx].xpose as u8) & 0x3f;
            if t & 0xc0 == 0xc0 {
                note |= 0xc0;
            }
            x.set_b0(note);

            if let Some(ref mut m) = machine {
                m.note_port(data, x);
            }

            if wait_note {
                return false
            }
            continue
        }

        match t & 0x0f {
            0x0 => {  // end
                tracks[idx].num = 0xff;
                return true
            }
            0x1 => {  // loop
                let p = &mut tracks[idx];
                if p.loops == 0 {
                    p.loops = 0xffff;
                    continue
                }
                if p.loops == 0xffff {
                    p.loops = x.b1() as u16;
                }

                p.loops = p.loops.wrapping_sub(1);
                p.step = x.w1();

                if p.loops != 0xffff {
                    p.looped = false;
                    continue
                }

                // looping forever: the song ends once no other track plays
                p.looped = true;
                if tracks.iter().all(|p| p.stopped() || p.looped) {
                    match machine {
                        Some(ref mut m) => m.end_reached(),
                        None            => return true,
                    }
                }
            }
            0x8 | 0x2 => {  // gosub / continue
                let p = &mut tracks[idx];
                if t & 0x0f == 0x8 {
                    p.ro_addr = p.addr;
                    p.ro_step = p.step;
                }

                match data.pattern(x.b1()) {
                    Some(addr) => {
                        p.addr = addr;
                        p.step = x.w1();
                    }
                    None => p.num = 0xff,
                }
            }
            0x3 => {  // wait
                tracks[idx].wait = x.b1();
                return false
            }
            0xe | 0x4 => {  // stop custom / stop
                if t & 0x0f == 0xe {
                    if let Some(ref mut m) = machine {
                        m.mdb.play_patt_flag = false;
                    }
                }
                tracks[idx].num = 0xff;
                return false
            }
            0x5 | 0x6 | 0x7 | 0xc => {  // key up, vibrato, envelope, lock
                if let Some(ref mut m) = machine {
                    m.note_port(data, x);
                }
            }
            0x9 => {  // return
                let p = &mut tracks[idx];
                p.addr = p.ro_addr;
                p.step = p.ro_step;
            }
            0xa => {  // fade
                if let Some(ref mut m) = machine {
                    m.mdb.do_fade(x.b1() as i8, x.b3() as i8);
                }
            }
            0xd => {  // cue
                if let Some(ref mut m) = machine {
                    m.cue[(x.b1() & 0x03) as usize] = x.w1();
                }
            }
            0xb => {  // play pattern on another track
                let p = &mut tracks[(x.b2() & 0x07) as usize];
                match data.pattern(x.b1()) {
                    Some(addr) => {
                        p.num = x.b1();
                        p.addr = addr;
                        p.xpose = x.b3() as i8;
                        p.step = 0;
                        p.wait = 0;
                        p.loops = 0xffff;
                    }
                    None => p.num = 0xff,
                }
            }
            _ => (),  // NOP
        }
    }

    warn!("track {}: pattern doesn't yield, stopping it", idx);
    tracks[idx].num = 0xff;
    false
}


impl State {

    /// Reset all voices and tracks.
    pub fn init(&mut self) {
        self.machine.all_off();

        for x in 0..NUM_TRACKS {
            self.pdb.p[x].num = 0xff;
            self.pdb.p[x].addr = 0;
            self.machine.channel_off(x);
        }
    }

    pub fn start_song(&mut self, data: &TfmxData, song: usize) {
        {
            let mdb = &mut self.machine.mdb;
            mdb.player_enable = false;
            mdb.master_vol = 0x40;
            mdb.fade_slope = 0;
            mdb.track_loop = -1;
            mdb.play_patt_flag = false;
            mdb.cia_save = CIA_DEFAULT;
        }

        if let Some(sub) = data.sub_song(song) {
            self.pdb.curr_pos = sub.start;
            self.pdb.first_pos = sub.start;
            self.pdb.last_pos = sub.end;

            let (cia, prescale) = tempo_timing(sub.tempo);
            self.machine.mdb.cia_save = cia;
            self.pdb.prescale = prescale;
            self.machine.notify(InfoEvent::Speed(prescale));
        }

        let cia = self.machine.mdb.cia_save;
        self.machine.notify(InfoEvent::Tempo(bpm(cia)));
        self.e_clocks = cia as u32;

        for p in self.pdb.p.iter_mut() {
            p.addr = 0;
            p.num = 0xff;
            p.xpose = 0;
            p.step = 0;
        }

        self.get_track_step(data);

        let mdb = &mut self.machine.mdb;
        mdb.speed_cnt = 0;
        mdb.end_flag = false;
        mdb.player_enable = true;
        self.song = song as i32;
    }

    fn next_position(&mut self) {
        self.pdb.curr_pos = self.pdb.curr_pos.wrapping_add(1);
        let pos = self.pdb.curr_pos.wrapping_sub(self.pdb.first_pos);
        self.machine.notify(InfoEvent::Position(pos));
    }

    /// Read track steps from the current position, running commands until a
    /// step that assigns patterns to the tracks.
    pub fn get_track_step(&mut self, data: &TfmxData) {
        for _ in 0..MAX_TRACK_STEPS {
            if self.pdb.curr_pos == self.pdb.first_pos {
                if self.first_time {
                    self.first_time = false;
                } else {
                    self.machine.end_reached();
                }
            }

            self.jiffies = 0;

            let step = match data.track_step(self.pdb.curr_pos) {
                Some(s) => s,
                None    => {
                    debug!("track step {} out of range", self.pdb.curr_pos);
                    self.machine.end_reached();
                    return
                }
            };

            if !step.is_command() {
                for (x, p) in self.pdb.p.iter_mut().enumerate() {
                    let v = step.0[x];
                    p.xpose = v as u8 as i8;
                    p.num = (v >> 8) as u8;

                    if p.num < 0x80 {
                        p.step = 0;
                        p.wait = 0;
                        p.loops = 0xffff;
                        p.looped = false;
                        match data.pattern(p.num) {
                            Some(addr) => p.addr = addr,
                            None       => {
                                debug!("track {}: invalid pattern {}", x, p.num);
                                p.num = 0xff;
                                p.addr = 0;
                            }
                        }
                    }
                }
                return
            }

            match step.command() {
                0 => {  // stop
                    self.machine.end_reached();
                    return
                }
                1 => {  // loop
                    let count = self.machine.mdb.track_loop;
                    self.machine.mdb.track_loop = count.wrapping_sub(1);
                    if count == 0 {
                        self.machine.mdb.track_loop = -1;
                        self.next_position();
                        continue
                    }

                    if self.machine.mdb.track_loop < 0 {
                        let count = step.arg(1) as i16;
                        self.machine.mdb.track_loop = count;
                        if count == 0 || count > 1000 {
                            self.machine.end_reached();
                        }
                    }

                    let target = cmp::max(step.arg(0), self.pdb.first_pos);

                    // jumping back with the loop done means the song is over
                    if target < self.pdb.curr_pos && self.machine.mdb.track_loop < 0 {
                        self.machine.end_reached();
                    }

                    self.pdb.curr_pos = target;
                    let pos = target.wrapping_sub(self.pdb.first_pos);
                    self.machine.notify(InfoEvent::Position(pos));
                }
                2 => {  // set speed
                    self.pdb.prescale = step.arg(0);
                    self.machine.mdb.speed_cnt = step.arg(0);
                    self.machine.notify(InfoEvent::Speed(step.arg(0)));

                    if let Some(cia) = speed_cia(step.arg(1)) {
                        self.machine.mdb.cia_save = cia;
                        self.e_clocks = cia as u32;
                        self.machine.notify(InfoEvent::Tempo(bpm(cia)));
                    }
                    self.next_position();
                }
                3 => {  // time share
                    if let Some(cia) = time_share_cia(step.arg(1)) {
                        self.machine.mdb.cia_save = cia;
                        self.e_clocks = cia as u32;
                        self.machine.multi_mode = true;
                        self.machine.notify(InfoEvent::Tempo(bpm(cia)));
                    }
                    self.next_position();
                }
                4 => {  // fade
                    let speed = step.arg(0) as u8 as i8;
                    let dest = step.arg(1) as u8 as i8;
                    self.machine.mdb.do_fade(speed, dest);
                    self.next_position();
                }
                _ => {
                    self.next_position();
                }
            }
        }

        warn!("track step commands don't settle at position {}", self.pdb.curr_pos);
        self.machine.end_reached();
    }

    // All patterns of the current position are done
    fn end_of_step(&mut self, data: &TfmxData) {
        if self.pdb.curr_pos == self.pdb.last_pos {
            self.pdb.curr_pos = self.pdb.first_pos;
            self.machine.notify(InfoEvent::Position(0));
            self.machine.end_reached();
        } else {
            self.next_position();
        }

        self.get_track_step(data);
    }

    /// Advance the sequencer by one tick.
    pub fn do_tracks(&mut self, data: &TfmxData) {
        self.jiffies = self.jiffies.wrapping_add(1);

        let cnt = self.machine.mdb.speed_cnt;
        self.machine.mdb.speed_cnt = cnt.wrapping_sub(1);
        if cnt != 0 {
            return
        }
        self.machine.mdb.speed_cnt = self.pdb.prescale;

        let mut x = 0;
        let mut restarts = 0;
        while x < NUM_TRACKS {
            if do_track(&mut self.pdb.p, x, data, Some(&mut self.machine)) {
                self.end_of_step(data);

                restarts += 1;
                if restarts > MAX_RESTARTS {
                    warn!("patterns end without playing at position {}", self.pdb.curr_pos);
                    break
                }
                x = 0;
            } else {
                x += 1;
            }
        }

        if self.pdb.p.iter().all(|p| p.stopped()) {
            self.end_of_step(data);
        }
    }
}
