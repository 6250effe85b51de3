//! Dump all boxes in an AVIF file
use avif_bitstream::{BoxReader, BoxType, FourCC};
use std::env;

fn dump_boxes(mut r: BoxReader<'_>, base: usize, depth: usize) -> avif_bitstream::Result<()> {
    while r.has_remaining() {
        let pos = base + r.offset();
        let header = if depth == 0 { r.read_top_level_box_header()? } else { r.read_box_header()? };
        let indent = "  ".repeat(depth);
        println!("{}[{}] {} size={}", indent, pos, FourCC::from(header.name), header.total_size());

        let content_start = base + r.offset();
        let mut content = BoxReader::new(r.read(usize::try_from(header.content_size)?)?);
        if header.name == BoxType::MetadataBox {
            // full box: version and flags precede the children
            content.read_full_box_version_flags()?;
            let offset = content_start + content.offset();
            dump_boxes(BoxReader::new(content.remaining_slice()), offset, depth + 1)?;
        } else if header.name.is_container() {
            dump_boxes(content, content_start, depth + 1)?;
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <avif-file>", args[0]);
        std::process::exit(1);
    }

    let path = &args[1];
    let data = std::fs::read(path).expect("Failed to read file");

    println!("Boxes in {}:", path);
    if let Err(e) = dump_boxes(BoxReader::new(&data), 0, 0) {
        eprintln!("Stopped: {e}");
        std::process::exit(1);
    }
}
