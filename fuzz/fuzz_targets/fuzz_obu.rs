#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = avif_bitstream::find_sequence_header(data);
    for obu in avif_bitstream::ObuIter::new(data) {
        if obu.is_err() {
            break;
        }
    }
});
