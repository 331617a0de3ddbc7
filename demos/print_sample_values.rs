//! Decode a synthetic KAAS stream and export the sample values.

use kaas::{pcm_to_q15, Decoder};
use std::{fs, io::Write};

fn main() -> anyhow::Result<()> {
    // A slow rise followed by a slow fall.
    let encoded: Vec<u8> = [0x44u8; 64].into_iter().chain([0xCC; 64]).collect();
    println!("Encoded length in bytes: {}", encoded.len());

    let mut decoder = Decoder::new();
    let pcm = decoder.decode_buffer(&encoded);
    println!("Decoder state: {:?}", decoder.state());

    let mut file = fs::File::create("kaas_samples.txt")?;

    for (i, s) in pcm.iter().enumerate() {
        let q15 = pcm_to_q15(*s);
        println!("{i}: {s} ({q15})");
        write!(file, "{s}, ")?;
    }
    Ok(())
}
