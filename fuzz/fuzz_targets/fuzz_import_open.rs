#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parcel_rs::Importer;

#[derive(Arbitrary, Debug)]
struct RawPart {
    name_number: u16,
    body: Vec<u8>,
}

// Arbitrary part files must never panic the importer, only fail to open or
// serve reads that end up in the corrupted list
fuzz_target!(|parts: Vec<RawPart>| {
    let dir = match tempfile::TempDir::new() {
        Ok(d) => d,
        Err(_) => return,
    };

    for part in parts.iter().take(8) {
        let name = format!("part-{:04}.parcel", part.name_number);
        if std::fs::write(dir.path().join(name), &part.body).is_err() {
            return;
        }
    }

    if let Ok(importer) = Importer::open(dir.path()) {
        let _ = importer.verify_all();
    }
});
