use std::cmp;
use format::{Format, FormatInfo};
use format::tfmx::*;
use format::tfmx::fingerprint::Fingerprint;
use module::{Module, Sample};
use util::BinaryRead;
use ::*;

// Default table bases, relative to the music data
const TRACK_BASE   : usize = 0x600;
const PATTERN_BASE : usize = 0x200;
const MACRO_BASE   : usize = 0x400;

const SONG_START_OFS: usize = 0x100;
const SONG_END_OFS  : usize = 0x140;
const TEMPO_OFS     : usize = 0x180;
const BASES_OFS     : usize = 0x1d0;


/// Identify a TFMX music header at `start`.
pub fn probe_music(b: &[u8], start: usize) -> Result<Format, Error> {
    let mark1 = b.read32b(start)?;
    let mark2 = b.read32b(start + 4)?;
    let mark3 = b.read8(start + 8)?;

    // TFMX without SONG is the old format
    if mark1 == magic4!('T','F','M','X') && (mark2 & 0x00ffffff) != magic4!(0,'S','O','N') && mark3 != b'G' {
        return Ok(Format::Tfmx15)
    }

    // TFMX-SONG / TFMX_SONG / tfmxsong
    let song = (mark1 == magic4!('T','F','M','X') && (mark2 == magic4!('-','S','O','N') || mark2 == magic4!('_','S','O','N')) && mark3 == b'G')
        || (mark1 == magic4!('t','f','m','x') && mark2 == magic4!('s','o','n','g'));

    if !song {
        return Err(Error::Format("bad magic".to_owned()))
    }

    // Professional or 7 voices: look for time share in the sub-song starts
    if has_time_share(b, start) {
        Ok(Format::Tfmx7V)
    } else {
        Ok(Format::TfmxPro)
    }
}

fn has_time_share(b: &[u8], start: usize) -> bool {
    let mut offset = match b.read32b(start + BASES_OFS) {
        Ok(v)  => v as usize,
        Err(_) => return false,
    };
    if offset == 0 {
        offset = 0x800;
    }

    let mut times: i32 = 0;
    let mut time_share = false;

    for i in 0..31 {
        let mut position = match b.read16b(start + SONG_START_OFS + i * 2) {
            Ok(v)  => v as usize,
            Err(_) => break,
        };
        if position == 0x1ff {
            break
        }

        // bounded walk over command steps
        for _ in 0..0x10000 {
            let ofs = start + offset + position * 16;
            if b.read16b(ofs).ok() != Some(TRACK_CMD) {
                break
            }

            match b.read16b(ofs + 2).unwrap_or(0xffff) {
                1 => {  // loop a section
                    let target = b.read16b(ofs + 4).unwrap_or(0) as usize;
                    if times == 0 {
                        times = -1;
                        position += 1;
                    } else if times < 0 {
                        position = target;
                        times = b.read16b(ofs + 6).unwrap_or(0) as i32 - 1;
                    } else {
                        times -= 1;
                        position = target;
                    }
                }
                2 | 4 => {  // tempo, master volume slide
                    position += 1;
                }
                3 => {  // time share
                    time_share = true;
                    position += 1;
                }
                _ => {
                    time_share = false;
                    break
                }
            }
        }

        if time_share {
            break
        }
    }

    time_share
}

fn table_base(v: u32, default: usize) -> Result<usize, Error> {
    if v == 0 {
        Ok(default)
    } else if (v as usize) < HEADER_SIZE {
        Err(Error::Load(format!("invalid table base 0x{:x}", v)))
    } else {
        Ok(v as usize - HEADER_SIZE)
    }
}

/// Convert up to `max` absolute pointers at `base` to music data offsets,
/// stopping at the first one that doesn't look valid. The stop index is the
/// table size.
fn fix_pointers(music: &[u8], base: usize, max: usize, music_len: usize) -> Vec<u32> {
    let mut table = Vec::new();

    for x in 0..max {
        let y = match music.read32b(base + x * 4) {
            Ok(v)  => v as i64 - HEADER_SIZE as i64,
            Err(_) => break,
        };

        if y < 0 || y & 3 != 0 || y > music_len as i64 {
            break
        }

        table.push(y as u32);
    }

    table
}

pub fn load(b: &[u8], smpl: Option<&[u8]>, info: FormatInfo) -> Result<Module, Error> {
    let start = match info.single {
        Some(ref h) => h.header_size as usize,
        None        => 0,
    };

    if b.len() < start + HEADER_SIZE {
        return Err(Error::Load("truncated module header".to_owned()))
    }

    // Comment block
    let mut comment = Vec::new();
    for i in 0..6 {
        comment.push(b.read_string(start + 16 + i * 40, 40)?.trim_end().to_owned());
    }

    // Sub-song information
    let mut song_start = [0; NUM_SONGS];
    let mut song_end = [0; NUM_SONGS];
    let mut tempo = [0; NUM_SONGS];
    for i in 0..NUM_SONGS {
        song_start[i] = b.read16b(start + SONG_START_OFS + i * 2)?;
        song_end[i] = b.read16b(start + SONG_END_OFS + i * 2)?;
        tempo[i] = b.read16b(start + TEMPO_OFS + i * 2)?;
    }

    let track_start = table_base(b.read32b(start + BASES_OFS)?, TRACK_BASE)?;
    let pattern_start = table_base(b.read32b(start + BASES_OFS + 4)?, PATTERN_BASE)?;
    let macro_start = table_base(b.read32b(start + BASES_OFS + 8)?, MACRO_BASE)?;

    // Music data
    let music_ofs = start + HEADER_SIZE;
    let music_len = match info.single {
        Some(ref h) => h.mdat_size as usize,
        None        => b.len() - music_ofs,
    };

    if music_len > MAX_MUSIC_LEN {
        return Err(Error::Load(format!("music data too large ({} bytes)", music_len)))
    }

    let sentinel = (music_len + 3) / 4 * 4;
    let mut music = vec![0_u8; sentinel + 4];
    let avail = cmp::min(music_len, b.len().saturating_sub(music_ofs));
    music[..avail].copy_from_slice(&b[music_ofs..music_ofs + avail]);
    for x in &mut music[sentinel..] {
        *x = 0xff;
    }

    let quirks = Fingerprint::id(&music[..music_len]);

    // Macros first, then patterns, then track steps, since the track step
    // table ends where the pattern data begins
    let macros = fix_pointers(&music, macro_start, MAX_MACROS, music_len);

    let num_patterns = if macro_start > pattern_start {
        cmp::min((macro_start - pattern_start) >> 2, MAX_PATTERNS)
    } else {
        0
    };
    let patterns = fix_pointers(&music, pattern_start, num_patterns, music_len);

    let first = match patterns.first() {
        Some(v) => *v as usize,
        None    => return Err(Error::Load("no valid pattern pointers".to_owned())),
    };

    if first < track_start {
        return Err(Error::Load(format!("pattern data 0x{:x} before track steps 0x{:x}", first, track_start)))
    }

    let mut track_steps = Vec::new();
    for i in 0..(first - track_start) >> 4 {
        let ofs = track_start + i * 16;
        let mut step = TrackStep::default();
        for j in 0..8 {
            step.0[j] = (&music[..]).read16b(ofs + j * 2)
                .map_err(|_| Error::Load("track steps beyond music data".to_owned()))?;
        }
        track_steps.push(step);
    }

    // Sample data
    let mut samples = Sample::new();
    match info.single {
        Some(ref h) => {
            let ofs = h.header_size as usize + h.mdat_size as usize;
            let data = b.slice(ofs, h.smpl_size as usize)
                .map_err(|_| Error::Load("can't load sample data".to_owned()))?;
            samples.store(data);
        }
        None => {
            match smpl {
                Some(data) => samples.store(data),
                None       => return Err(Error::Load("missing sample file".to_owned())),
            }
        }
    }

    debug!("bases: track=0x{:x} pattern=0x{:x} macro=0x{:x}", track_start, pattern_start, macro_start);
    debug!("track steps={} patterns={} macros={} samples={}", track_steps.len(), patterns.len(), macros.len(), samples.len());
    if quirks != Quirks::default() {
        debug!("quirks: {:?}", quirks);
    }

    let data = TfmxData {
        comment,
        song_start,
        song_end,
        tempo,
        track_start,
        pattern_start,
        macro_start,
        track_steps,
        patterns,
        macros,
        music_len,
        quirks,
        samples,
        music,
    };

    let description = match info.format {
        Format::Tfmx15  => "TFMX 1.5",
        Format::TfmxPro => "TFMX Professional",
        Format::Tfmx7V  => "TFMX 7 voices",
    };

    Ok(Module {
        format     : info.format,
        description: format!("{} ({})", description, if info.single.is_some() { "single file" } else { "two files" }),
        creator    : "Chris Huelsbeck".to_owned(),
        channels   : info.format.channels(),
        data,
    })
}
