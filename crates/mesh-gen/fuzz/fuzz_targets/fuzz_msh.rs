#![no_main]

use libfuzzer_sys::fuzz_target;
use std::path::Path;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Decoding must never panic; a decoded mesh must survive projection.
    if let Ok(mesh) = mesh_gen::parse_msh(text, Path::new("fuzz.msh")) {
        let _ = mesh_gen::classify(&mesh);
        let _ = mesh_gen::project(&mesh);
    }
});
