//! Print the OBUs and the sequence header of a raw AV1 OBU stream
use avif_bitstream::{ObuIter, find_sequence_header};
use std::env;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <obu-file>", args[0]);
        std::process::exit(1);
    }

    let data = std::fs::read(&args[1]).expect("Failed to read file");
    for obu in ObuIter::new(&data) {
        match obu {
            Ok(obu) => println!("{:?} header={} payload={}", obu.obu_type, obu.header_size, obu.payload.len()),
            Err(e) => {
                println!("bad OBU: {e}");
                break;
            },
        }
    }

    match find_sequence_header(&data) {
        Ok(h) => {
            let (width, height) = h.dimensions();
            println!("{width}x{height} {}-bit {:?} profile {} level {}", h.bit_depth, h.chroma_format, h.seq_profile, h.seq_level_idx_0);
            println!(
                "cicp {}/{}/{} {:?} range, chroma position {:?}",
                h.color_primaries, h.transfer_characteristics, h.matrix_coefficients, h.color_range, h.chroma_sample_position
            );
        },
        Err(e) => {
            eprintln!("No sequence header: {e}");
            std::process::exit(1);
        },
    }
}
