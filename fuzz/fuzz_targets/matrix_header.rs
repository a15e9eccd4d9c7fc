#![no_main]

use image_search_core::MatrixHeader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = MatrixHeader::from_bytes(data) {
        assert_eq!(MatrixHeader::from_bytes(&header.to_bytes()).ok(), Some(header));
    }
});
