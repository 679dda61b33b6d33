use super::*;

impl<'a> ProtrackerMod<'a> {
    /// Human-readable dump of the module: title, instrument directory,
    /// sequence and full pattern listing.
    pub fn info_str(&self) -> String {
        let mut ret = format!(
            "Title: {} ({}-instrument)\n",
            self.title(),
            self.num_instruments()
        );

        ret.push_str("\nInstruments:\n");
        ret.push_str(&info_instruments(self));

        ret.push_str("\n\nSequence:\n");
        ret.push_str(&info_sequence(self));

        ret.push_str("\n\n");

        for pattern in 0..self.pattern_count() {
            ret.push_str(&format!("Pattern {:>02x}:\n", pattern));
            ret.push_str(&info_pattern(self, pattern));
            ret.push('\n');
        }

        ret
    }
}

fn info_instruments(module: &ProtrackerMod) -> String {
    let strs: Vec<_> = (0..module.num_instruments())
        .map(|idx| (idx, module.instrument(idx)))
        .filter(|(_idx, inst)| !inst.data.is_empty())
        .map(|(idx, inst)| {
            format!(
                "{:>02x} {:>22}, ft: {:>2}, len: {:>04x}, vol: {:>02x}, roff: {:>04x}, rlen: {:>04x}",
                idx + 1,
                inst.name(),
                inst.finetune,
                inst.data.len(),
                inst.default_volume,
                inst.repeat_offset,
                inst.repeat_length
            )
        })
        .collect();
    strs.join("\n")
}

fn info_sequence(module: &ProtrackerMod) -> String {
    let entries: Vec<_> = (0..module.sequence_len())
        .map(|pos| format!("{:>02x} {:>02x}", pos, module.pattern_at(pos)))
        .collect();

    let rows: Vec<_> = entries.chunks(8).map(|chunk| chunk.join("   ")).collect();
    rows.join("\n")
}

fn info_pattern(module: &ProtrackerMod, pattern: usize) -> String {
    let mut ret = String::new();
    for row in 0..ROWS_PER_PATTERN {
        ret.push_str(&format!("{:>02x}      ", row));
        let cells: Vec<_> = (0..NUM_CHANNELS)
            .map(|chan| info_note(&module.note(pattern, row, chan)))
            .collect();
        ret.push_str(&cells.join("      "));
        ret.push('\n');
    }
    ret
}

fn info_note(note: &Note) -> String {
    if note.is_empty() {
        String::from("..........")
    } else {
        let cmd: u8 = note.effect.into();
        format!(
            "{:>02x}|{:>03x}|{:1x}{:02x}",
            note.instrument, note.period, cmd, note.param
        )
    }
}
