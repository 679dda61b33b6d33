use std::env;
use std::fs;

use modplay::format::protracker::ProtrackerMod;
use modplay::player::protracker::{ProtrackerPlayer, DEFAULT_SAMPLE_RATE};
use modplay::player::{MixMode, PlayerOption};

const BUFFER_SAMPLES: usize = 1024;

fn main() {
    let mut x = env::args();
    x.next();
    let filename = x.next().unwrap();
    let filename_out = x.next().unwrap();

    let data = fs::read(filename).unwrap();
    match ProtrackerMod::parse(&data) {
        Ok(module) => {
            println!("Rendering '{}'", module.title());

            let mut player = ProtrackerPlayer::new(module);
            player.set_option(PlayerOption::Loop, 0);

            let spec = hound::WavSpec {
                channels: 2,
                sample_rate: DEFAULT_SAMPLE_RATE,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::create(filename_out, spec).unwrap();

            // Cap at 5 minutes in case the song loops despite the option.
            let max_fills = 300 * 2 * DEFAULT_SAMPLE_RATE as usize / BUFFER_SAMPLES;
            let mut buffer = [0i16; BUFFER_SAMPLES];
            for _ in 0..max_fills {
                let more = player.fill_buffer(&mut buffer, MixMode::StereoSoft);
                for s in buffer.iter() {
                    writer.write_sample(i16::from_le(*s)).unwrap();
                }
                if !more {
                    break;
                }
            }
        }
        Err(e) => {
            print!("Error: {}\n", e);
        }
    }
}
