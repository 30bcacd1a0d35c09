pub mod event;
pub mod sample;

pub use self::event::Word;
pub use self::sample::Sample;

use std::fmt;
use format::Format;
use format::tfmx::TfmxData;


pub struct Module {
    pub format     : Format,
    pub description: String,
    pub creator    : String,
    pub channels   : usize,
    pub data       : TfmxData,
}

impl Module {
    pub fn title(&self) -> &str {
        self.data.comment.first().map(|s| s.trim()).unwrap_or("")
    }

    pub fn comment(&self) -> &[String] {
        &self.data.comment
    }

    pub fn sub_songs(&self) -> usize {
        self.data.sub_songs()
    }

    /// Channel count announced by the module type. Modules switching to
    /// multi mode at run time report 7 channels through the player.
    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({} channels, {} track steps, {} patterns, {} macros)", self.description,
               self.channels, self.data.num_track_steps(), self.data.num_patterns(), self.data.num_macros())
    }
}
