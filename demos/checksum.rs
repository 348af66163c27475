//! Checksum a file of any size through the chunked reader.

use std::fs::File;

use sha2::{Digest, Sha256};

fn main() {
    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: checksum <file>");
            std::process::exit(2);
        }
    };

    let fd = File::open(&path).unwrap();

    let mut hasher = Sha256::new();
    let n = mapfile::read_chunks(&fd, |chunk| -> std::io::Result<()> {
        hasher.update(chunk);
        Ok(())
    })
    .unwrap();

    let digest: String = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect();
    println!("{digest}  {path} ({n} bytes)");
}
