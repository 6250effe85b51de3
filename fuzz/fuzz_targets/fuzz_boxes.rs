#![no_main]
use avif_bitstream::{BoxReader, ParseOptions};
use libfuzzer_sys::fuzz_target;

fn walk(mut reader: BoxReader<'_>, depth: u32) {
    if depth > 16 {
        return;
    }
    while let Ok(Some((header, mut content))) = reader.next_box() {
        assert!(header.content_size <= content.remaining() as u64);
        if header.name.is_container() {
            walk(content, depth + 1);
        } else {
            let mut name = [0xffu8; 8];
            let _ = content.read_full_box_version_flags();
            let before = content.offset();
            match content.read_null_terminated_string(&mut name) {
                Ok(len) => {
                    assert_eq!(content.offset(), before + len + 1);
                    assert!(name.contains(&0));
                },
                Err(_) => assert_eq!(content.offset(), before),
            }
        }
    }
}

fuzz_target!(|data: &[u8]| {
    walk(BoxReader::with_options(data, ParseOptions { lenient: true }), 0);
    let _ = BoxReader::new(data).read_top_level_box_header();
});
