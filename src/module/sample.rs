/// The raw sample bank of a TFMX module: signed 8-bit PCM addressed by
/// byte offset from the start of the sample file.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    data: Vec<i8>,
}

impl Sample {
    pub fn new() -> Sample {
        Sample {
            data: Vec::new(),
        }
    }

    pub fn store(&mut self, b: &[u8]) {
        self.data.extend(b.iter().map(|x| *x as i8));
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sample byte at `ofs`; anything outside the bank plays as silence.
    pub fn get(&self, ofs: usize) -> i8 {
        match self.data.get(ofs) {
            Some(v) => *v,
            None    => 0,
        }
    }

    pub fn data(&self) -> &[i8] {
        &self.data
    }
}
