use std::collections::VecDeque;
use mixer::HardwareVoice;
use player::InfoEvent;
use ::*;

const MAX_EVENTS: usize = 64;

// Half the CIA clock, paired with half the output rate
const CIA_FRAME_DIV: u64 = 357955;


/// Module-wide replay state.
#[derive(Clone, Debug, Default)]
pub struct Mdb {
    pub player_enable : bool,
    pub end_flag      : bool,
    pub master_vol    : i8,
    pub fade_dest     : i8,
    pub fade_time     : i8,
    pub fade_reset    : i8,
    pub fade_slope    : i8,
    pub track_loop    : i16,
    pub speed_cnt     : u16,
    pub cia_save      : u16,
    pub play_patt_flag: bool,
}

/// One of the eight sequencer tracks, each running its own pattern stream.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackPointer {
    pub addr   : u32,
    pub num    : u8,
    pub xpose  : i8,
    pub step   : u16,
    pub wait   : u8,
    pub loops  : u16,
    pub looped : bool,
    pub ro_addr: u32,
    pub ro_step: u16,
}

impl TrackPointer {
    pub fn stopped(&self) -> bool {
        self.num >= 0x90
    }
}

/// Song position and track pointers.
#[derive(Clone, Debug, Default)]
pub struct Pdb {
    pub curr_pos : u16,
    pub first_pos: u16,
    pub last_pos : u16,
    pub prescale : u16,
    pub p        : [TrackPointer; NUM_TRACKS],
}

/// Channel control block: macro interpreter registers and effect state of
/// one voice.
#[derive(Clone, Debug, Default)]
pub struct ChannelControl {
    pub macro_ptr      : u32,
    pub macro_step     : u16,
    pub macro_wait     : u16,
    pub macro_num      : u16,
    pub macro_run      : i8,
    pub new_style_macro: u8,
    pub really_wait    : u8,
    pub efx_run        : i8,

    pub curr_note      : u8,
    pub prev_note      : u8,
    pub fine_tune      : u8,
    pub velocity       : u8,
    pub cur_period     : u16,
    pub dest_period    : u16,

    pub porta_per      : u16,
    pub porta_rate     : i16,
    pub porta_time     : u8,
    pub porta_reset    : u8,

    pub vib_reset      : u8,
    pub vib_time       : u8,
    pub vib_width      : i8,
    pub vib_offset     : i16,
    pub vib_flag       : bool,

    pub env_rate       : u8,
    pub env_reset      : u8,
    pub env_time       : u8,
    pub env_end_vol    : i8,
    pub cur_vol        : i8,

    pub add_begin      : i32,
    pub add_begin_time : u8,
    pub add_begin_reset: u8,
    pub cur_addr       : u32,
    pub save_addr      : u32,
    pub save_len       : u16,
    pub curr_length    : u16,

    pub sfx_flag       : u8,
    pub sfx_priority   : u32,
    pub sfx_code       : u32,
    pub sfx_lock_time  : i16,

    pub key_up         : bool,
    pub loop_cnt       : i16,
    pub return_ptr     : u16,
    pub return_step    : u16,
}

/// The voice side of the engine: channel control blocks paired by index
/// with the hardware voices they drive.
#[derive(Clone, Debug, Default)]
pub struct Machine {
    pub mdb       : Mdb,
    pub cdb       : [ChannelControl; NUM_VOICES],
    pub hdb       : [HardwareVoice; NUM_VOICES],
    pub cue       : [u16; 4],
    pub multi_mode: bool,
    pub end_count : u32,
    events        : VecDeque<InfoEvent>,
}

impl Machine {
    pub fn new(multi_mode: bool) -> Self {
        Machine {
            multi_mode,
            ..Default::default()
        }
    }

    /// Queue a notification for the host, dropping the oldest one when
    /// nobody drains the queue.
    pub fn notify(&mut self, ev: InfoEvent) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(ev);
    }

    /// Flag the end of the song. Only the first call counts until the
    /// flag is cleared for the next tick.
    pub fn end_reached(&mut self) {
        if self.mdb.end_flag {
            return
        }
        self.mdb.end_flag = true;
        self.end_count = self.end_count.wrapping_add(1);
        self.notify(InfoEvent::EndReached);
    }

    pub fn drain_events(&mut self) -> Vec<InfoEvent> {
        self.events.drain(..).collect()
    }

    /// Number of voices scanned by the macro interpreter.
    pub fn channel_mask(&self) -> u8 {
        if self.multi_mode { 7 } else { 3 }
    }
}

/// Complete replay state. Cloning it gives a snapshot that can be restored
/// later without touching the module data.
#[derive(Clone, Debug)]
pub struct State {
    pub pdb       : Pdb,
    pub machine   : Machine,
    pub song      : i32,
    pub first_time: bool,
    pub jiffies   : u32,
    pub e_clocks  : u32,
    pub e_rem     : u64,
}

impl State {
    pub fn new(multi_mode: bool) -> Self {
        State {
            pdb       : Pdb::default(),
            machine   : Machine::new(multi_mode),
            song      : -1,
            first_time: true,
            jiffies   : 0,
            e_clocks  : CIA_DEFAULT as u32,
            e_rem     : 0,
        }
    }

    /// Output frames for the next tick at `rate`, carrying the remainder
    /// over to later ticks.
    pub fn tick_frames(&mut self, rate: u32) -> usize {
        let mut n = self.e_clocks as u64 * (rate >> 1) as u64;
        self.e_rem += n % CIA_FRAME_DIV;
        n /= CIA_FRAME_DIV;
        if self.e_rem > CIA_FRAME_DIV {
            n += 1;
            self.e_rem -= CIA_FRAME_DIV;
        }
        n as usize
    }
}
