#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(vector) = image_search_core::ascii_to_vector(text) {
        let encoded = image_search_core::vector_to_ascii(&vector).expect("decoded vectors re-encode");
        assert_eq!(encoded.len(), text.len());
        assert_eq!(image_search_core::ascii_to_vector(&encoded).ok(), Some(vector));
    }
});
