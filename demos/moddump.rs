use std::env;
use std::fs;

use modplay::format::protracker::ProtrackerMod;

fn main() {
    let mut x = env::args();
    x.next();
    let filename = x.next().unwrap();

    let data = fs::read(filename).unwrap();
    match ProtrackerMod::parse(&data) {
        Ok(module) => {
            println!("{}", module.info_str());
        }
        Err(e) => {
            println!("Error: {}", e);
        }
    }
}
