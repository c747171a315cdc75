#![no_main]
use libfuzzer_sys::fuzz_target;
use parcel_rs::Metadata;

fuzz_target!(|data: &[u8]| {
    if let Ok(metadata) = Metadata::from_json_bytes(data) {
        // Whatever parsed must serialize again
        let raw = metadata.to_json_bytes().expect("re-serialize parsed metadata");
        Metadata::from_json_bytes(&raw).expect("re-parse serialized metadata");
    }
});
